//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};
use tern_core::IndirectSelection;

/// Tern - a build orchestrator for SQL transformation pipelines
#[derive(Parser, Debug)]
#[command(name = "tern")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress status lines
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Path to the compiled manifest (default: <project>/target/manifest.json)
    #[arg(long, global = true)]
    pub manifest: Option<String>,

    /// Path to a prior run's target directory, for state: and result: selectors
    #[arg(long, global = true)]
    pub state: Option<String>,

    /// Override the target output directory
    #[arg(long, global = true)]
    pub target_path: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run models in dependency order
    Run(RunArgs),

    /// Run models, tests, seeds, and snapshots in dependency order
    Build(RunArgs),

    /// Compile selected nodes without executing them
    Compile(RunArgs),

    /// Run tests against built relations
    Test(RunArgs),

    /// Load seed files
    Seed(RunArgs),

    /// Rebuild snapshot tables
    Snapshot(RunArgs),

    /// Check source table freshness
    Freshness(RunArgs),

    /// List selected nodes
    Ls(LsArgs),
}

/// Node selection arguments shared by every command
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Selection criteria (space for union, comma for intersection)
    #[arg(short, long, num_args = 1..)]
    pub select: Option<Vec<String>>,

    /// Criteria to subtract from the selection
    #[arg(long, num_args = 1..)]
    pub exclude: Option<Vec<String>>,

    /// Named selector from selectors.yml
    #[arg(long, conflicts_with_all = ["select", "exclude"])]
    pub selector: Option<String>,

    /// Policy for tests whose dependencies are only partially selected
    #[arg(long, default_value = "eager")]
    pub indirect_selection: IndirectSelection,
}

/// Execution arguments shared by runnable commands
#[derive(Args, Debug, Clone)]
pub struct ExecutionArgs {
    /// Worker pool size
    #[arg(long, default_value_t = 4)]
    pub threads: usize,

    /// Run every node inline, in deterministic order
    #[arg(long)]
    pub single_threaded: bool,

    /// Abort the run on the first error or test failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Run-results artifact path (default: <target>/run_results.json)
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Arguments for runnable commands (run, build, compile, test, seed, snapshot, freshness)
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    #[command(flatten)]
    pub execution: ExecutionArgs,
}

/// Arguments for the ls command
#[derive(Args, Debug)]
pub struct LsArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Restrict the listing to these resource types
    #[arg(long, num_args = 1..)]
    pub resource_type: Option<Vec<String>>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "name")]
    pub output: LsOutput,
}

/// List output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsOutput {
    /// Node names
    Name,
    /// Original file paths
    Path,
    /// Dotted fully qualified names
    Fqn,
    /// One JSON object per node
    Json,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
