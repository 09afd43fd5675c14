//! Configuration System
//!
//! One immutable [`RunConfig`] per process, built once at start-up and passed
//! by reference into the orchestrator. Sources, lowest precedence first:
//! built-in defaults, the global file, the workspace file, `PINRELAY_*`
//! environment variables, then CLI flags.

use crate::logging::LoggingConfig;
use crate::types::TokenAmount;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

mod loader;
mod merge;
mod sources;

pub use loader::{ConfigLoader, ConfigOverrides};
pub use sources::global_file::global_config_path;

pub const DEFAULT_CONTENT_PATH: &str = "dist";
pub const DEFAULT_WORK_DIR: &str = ".pinrelay";
pub const DEFAULT_CHANNEL_DIR: &str = ".pinrelay-channel";
pub const DEFAULT_TARGET_RUNWAY_DAYS: u64 = 30;
pub const DEFAULT_BUILD_RETENTION_DAYS: u32 = 1;
pub const DEFAULT_REUSE_RETENTION_DAYS: u32 = 90;

/// Which phases this execution runs
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Build,
    Upload,
    #[default]
    Combined,
}

impl Mode {
    pub fn builds(self) -> bool {
        matches!(self, Mode::Build | Mode::Combined)
    }

    pub fn uploads(self) -> bool {
        matches!(self, Mode::Upload | Mode::Combined)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Build => write!(f, "build"),
            Mode::Upload => write!(f, "upload"),
            Mode::Combined => write!(f, "combined"),
        }
    }
}

/// Run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub mode: Mode,

    /// File or directory to publish (build phase)
    pub content_path: PathBuf,

    /// Working area holding `context.json` and the packed archive
    pub work_dir: PathBuf,

    /// Root of the directory artifact channel
    pub channel_dir: PathBuf,

    pub target_runway_days: u64,

    /// Balance cap: top-ups are clamped so the balance never exceeds it
    #[serde(default)]
    pub max_balance: Option<TokenAmount>,

    /// Per-run top-up cap: larger top-ups are refused
    #[serde(default)]
    pub max_top_up: Option<TokenAmount>,

    /// Preferred storage provider
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub with_cdn: bool,

    #[serde(default)]
    pub ledger_endpoint: Option<String>,

    #[serde(default)]
    pub storage_endpoint: Option<String>,

    /// Bearer token sent to both gateways
    #[serde(default)]
    pub gateway_token: Option<String>,

    /// Let content from foreign repositories reach the paid publish
    #[serde(default)]
    pub allow_untrusted: bool,

    /// Artifact identity used verbatim instead of the trigger-derived one
    #[serde(default)]
    pub identity_override: Option<String>,

    pub build_retention_days: u32,
    pub reuse_retention_days: u32,

    /// File receiving `key=value` step outputs
    #[serde(default)]
    pub outputs_file: Option<PathBuf>,

    /// CI event name (`pull_request`, `workflow_run`, ...)
    #[serde(default)]
    pub event_name: Option<String>,

    /// Path to the CI event payload JSON
    #[serde(default)]
    pub event_path: Option<PathBuf>,

    #[serde(default)]
    pub run_id: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            content_path: PathBuf::from(DEFAULT_CONTENT_PATH),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            channel_dir: PathBuf::from(DEFAULT_CHANNEL_DIR),
            target_runway_days: DEFAULT_TARGET_RUNWAY_DAYS,
            max_balance: None,
            max_top_up: None,
            provider: None,
            with_cdn: false,
            ledger_endpoint: None,
            storage_endpoint: None,
            gateway_token: None,
            allow_untrusted: false,
            identity_override: None,
            build_retention_days: DEFAULT_BUILD_RETENTION_DAYS,
            reuse_retention_days: DEFAULT_REUSE_RETENTION_DAYS,
            outputs_file: None,
            event_name: None,
            event_path: None,
            run_id: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Field(&'static str, String),
    Logging(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Field(name, msg) => write!(f, "{}: {}", name, msg),
            ValidationError::Logging(msg) => write!(f, "logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// `path` without `.` components, for prefix comparisons.
fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

impl RunConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut field = |name: &'static str, msg: &str| {
            errors.push(ValidationError::Field(name, msg.to_string()));
        };

        if self.mode.builds() && self.content_path.as_os_str().is_empty() {
            field("content_path", "cannot be empty when building");
        }
        if self.work_dir.as_os_str().is_empty() {
            field("work_dir", "cannot be empty");
        }
        if self.channel_dir.as_os_str().is_empty() {
            field("channel_dir", "cannot be empty");
        }
        if self.mode.builds() && !self.content_path.as_os_str().is_empty() {
            // Anything packed from these changes on every run.
            let content = lexical(&self.content_path);
            if lexical(&self.work_dir) == content {
                field("work_dir", "cannot be the content_path");
            }
            if lexical(&self.channel_dir).starts_with(&content) {
                field("channel_dir", "cannot lie inside content_path");
            }
        }
        if self.target_runway_days == 0 {
            field("target_runway_days", "must be at least 1");
        }
        if self.build_retention_days == 0 {
            field("build_retention_days", "must be at least 1");
        }
        if self.reuse_retention_days == 0 {
            field("reuse_retention_days", "must be at least 1");
        }

        if let Some(identity) = &self.identity_override {
            if identity.trim().is_empty() {
                field("identity_override", "cannot be blank");
            } else if identity.starts_with("reuse-") {
                field("identity_override", "the reuse- prefix is reserved for reuse bundles");
            }
        }

        if self.mode.uploads() {
            match self.ledger_endpoint.as_deref() {
                None => field("ledger_endpoint", "required for upload"),
                Some(url) if !is_http_url(url) => field("ledger_endpoint", "must be an http(s) URL"),
                Some(_) => {}
            }
            match self.storage_endpoint.as_deref() {
                None => field("storage_endpoint", "required for upload"),
                Some(url) if !is_http_url(url) => {
                    field("storage_endpoint", "must be an http(s) URL")
                }
                Some(_) => {}
            }
        }

        if let Some(provider) = &self.provider {
            if provider.trim().is_empty() {
                field("provider", "cannot be blank");
            }
        }

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Runtime validation summary joined for display
    pub fn validation_message(errors: &[ValidationError]) -> String {
        let lines: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
        format!("Configuration validation failed:\n{}", lines.join("\n"))
    }
}
