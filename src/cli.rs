use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "maestro")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative infrastructure stacks - preview, converge, destroy", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the stack configuration (default: ./maestro.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what the next up would change, without applying
    Preview,

    /// Converge the stack to its declared state
    Up(UpArgs),

    /// Delete everything the stack created
    Destroy(DestroyArgs),

    /// List the stack's persisted state records
    State,

    /// Show the stack's exported outputs
    Outputs(OutputsArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct UpArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of parallel workers
    #[arg(short, long, default_value_t = 4)]
    pub jobs: usize,

    /// Print secret exports (credentials) in clear text
    #[arg(long)]
    pub show_secrets: bool,
}

#[derive(Parser)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of parallel workers
    #[arg(short, long, default_value_t = 4)]
    pub jobs: usize,
}

#[derive(Parser)]
pub struct OutputsArgs {
    /// Print secret exports (credentials) in clear text
    #[arg(long)]
    pub show_secrets: bool,
}
