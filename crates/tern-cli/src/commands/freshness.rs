//! Check source table freshness and write the sources.json artifact
//! consumed by `source_status:fresher` selection on the next run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tern_core::node::ResourceType;
use tern_core::state::{FreshnessArtifact, FreshnessResult};
use tern_run::RunMode;

use crate::cli::{GlobalArgs, RunArgs};
use crate::commands::common;

const SOURCES_FILE: &str = "sources.json";

pub async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let (ctx, outcome) = common::run_selection(
        global,
        &args.selection,
        &args.execution,
        vec![ResourceType::Source],
        RunMode::Execute,
    )
    .await?;

    let results = outcome
        .results
        .iter()
        .map(|result| {
            let max_loaded_at = result
                .adapter_response
                .as_ref()
                .and_then(|response| response.get("max_loaded_at"))
                .and_then(|value| value.as_str())
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|ts| ts.with_timezone(&Utc));
            FreshnessResult {
                unique_id: result.unique_id.clone(),
                max_loaded_at,
                error: result
                    .status
                    .is_failure()
                    .then(|| result.message.clone().unwrap_or_default()),
            }
        })
        .collect();

    let artifact = FreshnessArtifact {
        generated_at: Utc::now(),
        results,
    };
    let path = args
        .execution
        .output
        .as_ref()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| ctx.target_path.join(SOURCES_FILE));
    artifact
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    common::finish(&outcome)
}
