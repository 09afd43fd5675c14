//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::channel::DirectoryChannel;
use crate::cli::parse::{Commands, ContextCommands, EventArgs, GuardArgs, RunArgs};
use crate::cli::presentation::{
    format_context_json, format_context_text, format_guard_json, format_guard_text,
    format_report_json, format_report_text,
};
use crate::config::{ConfigLoader, ConfigOverrides, RunConfig};
use crate::context::ContextStore;
use crate::error::{Phase, PhaseFailure, PipelineError};
use crate::identity::resolve_identity;
use crate::ledger::HttpLedgerClient;
use crate::orchestrator::{Collaborators, PhaseOrchestrator};
use crate::pack::DirectoryPacker;
use crate::payment::{FundingRequest, PaymentGuard};
use crate::publish::HttpStorageClient;
use crate::trigger::TriggerEvent;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Event name used when the CI environment provides none.
const DEFAULT_EVENT_NAME: &str = "workflow_dispatch";
/// Run id used when the CI environment provides none.
const DEFAULT_RUN_ID: &str = "local";

fn setup(e: impl Into<PipelineError>) -> PhaseFailure {
    PhaseFailure::new(Phase::Setup, e)
}

fn json_error(e: serde_json::Error) -> PhaseFailure {
    setup(PipelineError::Config(format!("Failed to render JSON: {}", e)))
}

/// Runtime context for CLI execution: workspace root and optional config file.
pub struct RunContext {
    workspace_root: PathBuf,
    config_path: Option<PathBuf>,
}

impl RunContext {
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Self {
        Self {
            workspace_root,
            config_path,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Load configuration with `overrides` applied last and anchor relative
    /// paths at the workspace root.
    pub fn load_config(&self, overrides: &ConfigOverrides) -> Result<RunConfig, PhaseFailure> {
        let mut config = match &self.config_path {
            Some(path) => ConfigLoader::load_from_file_with(path, overrides),
            None => ConfigLoader::load_with(&self.workspace_root, overrides),
        }
        .map_err(setup)?;

        for path in [
            &mut config.content_path,
            &mut config.work_dir,
            &mut config.channel_dir,
        ] {
            if path.is_relative() {
                *path = self.workspace_root.join(&*path);
            }
        }
        Ok(config)
    }

    /// [`load_config`](Self::load_config), then reject invalid settings.
    pub fn load_run_config(&self, overrides: &ConfigOverrides) -> Result<RunConfig, PhaseFailure> {
        let config = self.load_config(overrides)?;
        config
            .validate()
            .map_err(|errors| setup(PipelineError::Config(RunConfig::validation_message(&errors))))?;
        Ok(config)
    }

    /// Execute a command and return its printable output.
    pub async fn execute(&self, command: &Commands) -> Result<String, PhaseFailure> {
        match command {
            Commands::Run(args) => self.handle_run(args).await,
            Commands::Identity {
                event,
                identity_override,
            } => {
                let mut overrides = event_overrides(event);
                overrides.set_opt("identity_override", identity_override.as_ref());
                let config = self.load_config(&overrides)?;
                let trigger = trigger_for(&config)?;
                Ok(resolve_identity(&trigger, config.identity_override.as_deref()))
            }
            Commands::Context { command } => match command {
                ContextCommands::Show { work_dir, format } => {
                    let mut overrides = ConfigOverrides::new();
                    overrides.set_opt("work_dir", work_dir.as_ref().map(|p| p.display()));
                    let config = self.load_config(&overrides)?;
                    let store = ContextStore::in_dir(&config.work_dir);
                    let record = store.load();
                    match format.as_str() {
                        "json" => format_context_json(&record).map_err(json_error),
                        _ => Ok(format_context_text(&record, store.path())),
                    }
                }
            },
            Commands::Guard(args) => self.handle_guard(args),
        }
    }

    async fn handle_run(&self, args: &RunArgs) -> Result<String, PhaseFailure> {
        let config = self.load_run_config(&run_overrides(args))?;
        let trigger = trigger_for(&config)?;
        debug!(work_dir = %config.work_dir.display(), channel = %config.channel_dir.display(), "Run configured");

        let channel = DirectoryChannel::new(config.channel_dir.clone());
        let packer = DirectoryPacker::new();
        // Build-only runs never reach the gateways, so endpoints may be absent.
        let ledger = HttpLedgerClient::new(
            config.ledger_endpoint.clone().unwrap_or_default(),
            config.gateway_token.clone(),
        )
        .map_err(setup)?;
        let publisher = HttpStorageClient::new(
            config.storage_endpoint.clone().unwrap_or_default(),
            config.gateway_token.clone(),
        )
        .map_err(setup)?;

        let orchestrator = PhaseOrchestrator::new(
            &config,
            trigger,
            Collaborators {
                channel: &channel,
                ledger: &ledger,
                publisher: &publisher,
                packer: &packer,
            },
        );
        let report = orchestrator.run().await?;

        if let Some(path) = &config.outputs_file {
            report.write_outputs_file(path).map_err(|source| {
                let phase = if config.mode.uploads() {
                    Phase::Upload
                } else {
                    Phase::Build
                };
                PhaseFailure::new(
                    phase,
                    PipelineError::Outputs {
                        path: path.clone(),
                        source,
                    },
                )
            })?;
            info!(path = %path.display(), "Step outputs written");
        }

        match args.format.as_str() {
            "json" => format_report_json(&report).map_err(json_error),
            _ => Ok(format_report_text(&report)),
        }
    }

    fn handle_guard(&self, args: &GuardArgs) -> Result<String, PhaseFailure> {
        let mut overrides = ConfigOverrides::new();
        overrides
            .set_opt("target_runway_days", args.target_runway_days)
            .set_opt("max_balance", args.max_balance)
            .set_opt("max_top_up", args.max_top_up);
        let config = self.load_config(&overrides)?;

        let request = FundingRequest {
            current_balance: args.balance,
            target_runway_days: config.target_runway_days,
            runway_rate: args.runway_rate,
            max_balance: config.max_balance,
            max_top_up: config.max_top_up,
        };
        let decision = PaymentGuard::authorize(&request).map_err(setup)?;
        match args.format.as_str() {
            "json" => format_guard_json(&request, &decision).map_err(json_error),
            _ => Ok(format_guard_text(&request, &decision)),
        }
    }
}

fn event_overrides(event: &EventArgs) -> ConfigOverrides {
    let mut overrides = ConfigOverrides::new();
    overrides
        .set_opt("event_name", event.event_name.as_ref())
        .set_opt("event_path", event.event_path.as_ref().map(|p| p.display()))
        .set_opt("run_id", event.run_id.as_ref());
    overrides
}

/// CLI flags for `run`, highest precedence.
fn run_overrides(args: &RunArgs) -> ConfigOverrides {
    let mut overrides = event_overrides(&args.event);
    overrides
        .set_opt("mode", args.mode)
        .set_opt("content_path", args.content_path.as_ref().map(|p| p.display()))
        .set_opt("work_dir", args.work_dir.as_ref().map(|p| p.display()))
        .set_opt("channel_dir", args.channel_dir.as_ref().map(|p| p.display()))
        .set_opt("target_runway_days", args.target_runway_days)
        .set_opt("max_balance", args.max_balance)
        .set_opt("max_top_up", args.max_top_up)
        .set_opt("provider", args.provider.as_ref())
        .set_opt("ledger_endpoint", args.ledger_endpoint.as_ref())
        .set_opt("storage_endpoint", args.storage_endpoint.as_ref())
        .set_opt("identity_override", args.identity_override.as_ref())
        .set_opt("outputs_file", args.outputs_file.as_ref().map(|p| p.display()));
    // Switches only ever turn a setting on.
    if args.with_cdn {
        overrides.set("with_cdn", true);
    }
    if args.allow_untrusted {
        overrides.set("allow_untrusted", true);
    }
    overrides
}

fn trigger_for(config: &RunConfig) -> Result<TriggerEvent, PhaseFailure> {
    TriggerEvent::load(
        config.event_name.as_deref().unwrap_or(DEFAULT_EVENT_NAME),
        config.event_path.as_deref(),
        config.run_id.as_deref().unwrap_or(DEFAULT_RUN_ID),
    )
    .map_err(setup)
}
