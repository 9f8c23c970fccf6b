//! Run models, tests, seeds, and snapshots in one dependency-ordered pass

use anyhow::Result;
use tern_core::node::ResourceType;
use tern_run::RunMode;

use crate::cli::{GlobalArgs, RunArgs};
use crate::commands::common;

pub async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let (ctx, outcome) = common::run_selection(
        global,
        &args.selection,
        &args.execution,
        vec![
            ResourceType::Model,
            ResourceType::Test,
            ResourceType::Seed,
            ResourceType::Snapshot,
            ResourceType::Operation,
        ],
        RunMode::Execute,
    )
    .await?;
    common::write_run_results(&ctx, &args.execution, &outcome)?;
    common::finish(&outcome)
}
