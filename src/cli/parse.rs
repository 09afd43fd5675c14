//! CLI parse: clap types for pinrelay. No behavior; definitions only.

use crate::config::Mode;
use crate::types::TokenAmount;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// pinrelay - build/upload handoff and reuse resolution for paid publishing
#[derive(Parser)]
#[command(name = "pinrelay")]
#[command(about = "Publish CI build output once, reuse it everywhere after")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (where pinrelay.toml lives)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the build, upload or combined pipeline
    Run(RunArgs),
    /// Print the artifact identity this execution resolves to
    Identity {
        #[command(flatten)]
        event: EventArgs,
        /// Use this identity verbatim
        #[arg(long)]
        identity_override: Option<String>,
    },
    /// Inspect the stored context record
    Context {
        #[command(subcommand)]
        command: ContextCommands,
    },
    /// Dry-run the payment guard
    Guard(GuardArgs),
}

/// Trigger event inputs, normally provided by the CI environment
#[derive(Args, Debug, Clone, Default)]
pub struct EventArgs {
    /// CI event name (pull_request, push, workflow_run, ...)
    #[arg(long, env = "GITHUB_EVENT_NAME")]
    pub event_name: Option<String>,

    /// Path to the CI event payload JSON
    #[arg(long, env = "GITHUB_EVENT_PATH")]
    pub event_path: Option<PathBuf>,

    /// Run id of this execution
    #[arg(long, env = "GITHUB_RUN_ID")]
    pub run_id: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Phases to run
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// File or directory to publish
    #[arg(long)]
    pub content_path: Option<PathBuf>,

    /// Working area for context.json and the packed archive
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Root of the shared artifact channel directory
    #[arg(long)]
    pub channel_dir: Option<PathBuf>,

    /// Days of runway to keep funded
    #[arg(long)]
    pub target_runway_days: Option<u64>,

    /// Never top up beyond this balance
    #[arg(long)]
    pub max_balance: Option<TokenAmount>,

    /// Refuse any single top-up larger than this
    #[arg(long)]
    pub max_top_up: Option<TokenAmount>,

    /// Preferred storage provider
    #[arg(long)]
    pub provider: Option<String>,

    /// Request CDN delivery
    #[arg(long)]
    pub with_cdn: bool,

    /// Payment ledger gateway URL
    #[arg(long)]
    pub ledger_endpoint: Option<String>,

    /// Storage gateway URL
    #[arg(long)]
    pub storage_endpoint: Option<String>,

    /// Publish content from foreign repositories
    #[arg(long)]
    pub allow_untrusted: bool,

    /// Use this artifact identity verbatim
    #[arg(long)]
    pub identity_override: Option<String>,

    /// File receiving key=value step outputs
    #[arg(long, env = "GITHUB_OUTPUT")]
    pub outputs_file: Option<PathBuf>,

    #[command(flatten)]
    pub event: EventArgs,

    /// Report format (text or json)
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Subcommand)]
pub enum ContextCommands {
    /// Print the stored context record
    Show {
        /// Working area (defaults to the configured work_dir)
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct GuardArgs {
    /// Current ledger balance
    #[arg(long)]
    pub balance: TokenAmount,

    /// Cost per day of runway
    #[arg(long)]
    pub runway_rate: TokenAmount,

    /// Days of runway to keep funded (defaults to the configured value)
    #[arg(long)]
    pub target_runway_days: Option<u64>,

    /// Balance cap (defaults to the configured value)
    #[arg(long)]
    pub max_balance: Option<TokenAmount>,

    /// Top-up cap (defaults to the configured value)
    #[arg(long)]
    pub max_top_up: Option<TokenAmount>,

    /// Output format (text or json)
    #[arg(long, default_value = "text")]
    pub format: String,
}
