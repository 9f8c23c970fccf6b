//! Shared utilities for CLI commands

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tern_compile::{RelationRenderer, Renderer};
use tern_core::graph::{Graph, Linker};
use tern_core::manifest::Manifest;
use tern_core::node::ResourceType;
use tern_core::results::RunResultsArtifact;
use tern_core::selector::{parse_difference, NodeSelector, SelectionSpec, SelectorFile};
use tern_core::state::PreviousState;
use tern_db::{Adapter, MemoryAdapter};
use tern_run::{ExecutionOutcome, RunConfig, RunMode, RunObserver, RunnableTask};

use crate::cli::{ExecutionArgs, GlobalArgs, SelectionArgs};
use crate::observer::ConsoleObserver;

const MANIFEST_FILE: &str = "manifest.json";
const RESULTS_FILE: &str = "run_results.json";
const SELECTORS_FILE: &str = "selectors.yml";

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Intentionally empty: ExitCode is a control-flow mechanism, not a
        // user-facing error.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Everything a command needs from the project on disk.
pub(crate) struct ProjectContext {
    pub(crate) project_dir: PathBuf,
    pub(crate) target_path: PathBuf,
    pub(crate) manifest: Manifest,
    pub(crate) graph: Graph,
    pub(crate) previous_state: Option<PreviousState>,
}

pub(crate) fn load_context(global: &GlobalArgs) -> Result<ProjectContext> {
    let project_dir = PathBuf::from(&global.project_dir);
    let target_path = global
        .target_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| project_dir.join("target"));
    let manifest_path = global
        .manifest
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| target_path.join(MANIFEST_FILE));

    let manifest = Manifest::load(&manifest_path)
        .with_context(|| format!("failed to load manifest from {}", manifest_path.display()))?;
    let graph = Linker::new().link_graph(&manifest)?;

    let previous_state = global
        .state
        .as_ref()
        .map(|state| PreviousState::load(Path::new(state), &target_path))
        .transpose()
        .context("failed to load comparison state")?;

    Ok(ProjectContext {
        project_dir,
        target_path,
        manifest,
        graph,
        previous_state,
    })
}

/// Resolve the selection spec from `--selector`, the default selector in
/// selectors.yml, or the `--select` / `--exclude` pair.
pub(crate) fn build_spec(selection: &SelectionArgs, project_dir: &Path) -> Result<SelectionSpec> {
    let indirect = selection.indirect_selection;
    let selectors_path = project_dir.join(SELECTORS_FILE);

    if let Some(name) = &selection.selector {
        let file = SelectorFile::load(&selectors_path)
            .with_context(|| format!("failed to load {}", selectors_path.display()))?;
        let definition = file
            .get(name)
            .ok_or_else(|| anyhow!("selector '{name}' is not defined in selectors.yml"))?;
        return Ok(definition.parse(indirect)?);
    }

    if selection.select.is_none() && selection.exclude.is_none() && selectors_path.exists() {
        let file = SelectorFile::load(&selectors_path)?;
        if let Some(definition) = file.default_selector() {
            log::info!("using default selector {}", definition.name);
            return Ok(definition.parse(indirect)?);
        }
    }

    Ok(parse_difference(
        selection.select.as_deref(),
        selection.exclude.as_deref(),
        indirect,
    )?)
}

/// Select, queue, and execute: the shared body of every runnable command.
pub(crate) async fn run_selection(
    global: &GlobalArgs,
    selection: &SelectionArgs,
    execution: &ExecutionArgs,
    resource_types: Vec<ResourceType>,
    mode: RunMode,
) -> Result<(ProjectContext, ExecutionOutcome)> {
    let ctx = load_context(global)?;
    let spec = build_spec(selection, &ctx.project_dir)?;

    let selector = NodeSelector::new(&ctx.graph, &ctx.manifest, ctx.previous_state.as_ref())
        .with_resource_types(resource_types);
    let queue = selector.get_graph_queue(&spec)?;

    if global.verbose {
        for unique_id in queue.get_selected_nodes() {
            println!("selected: {unique_id}");
        }
    }

    let adapter: Arc<dyn Adapter> = Arc::new(MemoryAdapter::new());
    let renderer: Arc<dyn Renderer> = Arc::new(RelationRenderer::new());
    let observer: Arc<dyn RunObserver> = Arc::new(ConsoleObserver::new(global.quiet));
    let config = RunConfig {
        threads: execution.threads,
        fail_fast: execution.fail_fast,
        single_threaded: execution.single_threaded,
        mode,
    };

    let task = RunnableTask::new(
        ctx.manifest.clone(),
        ctx.graph.clone(),
        adapter,
        renderer,
        observer,
        config,
    );
    let outcome = task.execute_nodes(queue).await?;

    // persist the manifest with compiled nodes written back
    task.into_manifest()
        .save(&ctx.target_path.join(MANIFEST_FILE))
        .context("failed to write updated manifest")?;

    Ok((ctx, outcome))
}

pub(crate) fn write_run_results(
    ctx: &ProjectContext,
    execution: &ExecutionArgs,
    outcome: &ExecutionOutcome,
) -> Result<()> {
    let path = execution
        .output
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| ctx.target_path.join(RESULTS_FILE));
    let artifact = RunResultsArtifact::new(outcome.results.clone(), outcome.elapsed);
    artifact
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Map the outcome onto the process exit status. A cancelled run exits 2,
/// a run with any failed or skipped node exits 1.
pub(crate) fn finish(outcome: &ExecutionOutcome) -> Result<()> {
    if let Some(aborted) = &outcome.aborted {
        eprintln!("{aborted}");
        return Err(ExitCode(2).into());
    }
    if !outcome.success() {
        return Err(ExitCode(1).into());
    }
    Ok(())
}
