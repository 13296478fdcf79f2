use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackplan")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Plan and apply infrastructure stacks against recorded state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Stack file (.json, .yaml, .yml or .toml)
    #[arg(short, long, global = true, env = "STACKPLAN_STACK")]
    pub stack: Option<PathBuf>,

    /// State snapshot file
    #[arg(long, global = true, env = "STACKPLAN_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check the stack file: ids, references, cycles
    Validate,

    /// Show the dependency graph
    Graph(GraphArgs),

    /// Show what apply would change
    Plan(PlanArgs),

    /// Converge real resources to the stack
    Apply(ApplyArgs),

    /// Delete every resource recorded in state
    Destroy(ApplyArgs),

    /// Inspect or repair the state snapshot
    #[command(subcommand)]
    State(StateCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Graph / Plan
// ============================================================================

#[derive(Parser)]
pub struct GraphArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = GraphFormat::Text)]
    pub format: GraphFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    /// Dependency levels, one node per line
    Text,
    /// Graphviz
    Dot,
    Json,
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Print the changeset as JSON
    #[arg(long)]
    pub json: bool,

    /// Also list unchanged resources
    #[arg(short, long)]
    pub all: bool,

    /// Exit with 2 when there are changes, 0 when there are none
    #[arg(long)]
    pub detailed_exitcode: bool,
}

// ============================================================================
// Apply / Destroy
// ============================================================================

#[derive(Parser)]
pub struct ApplyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Parallel provider calls (default from config, then 1)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

// ============================================================================
// State
// ============================================================================

#[derive(Subcommand)]
pub enum StateCommand {
    /// List recorded resources
    List,

    /// Show one recorded resource
    Show {
        /// Node id
        id: String,
    },

    /// Forget a resource without deleting it
    Rm {
        /// Node id
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Release a lock left by an interrupted run
    Unlock {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
