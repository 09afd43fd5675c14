//! Error types for the pinrelay build/upload pipeline.
//!
//! Only faults live here. Expected misses (bundle not found, bundle expired,
//! corrupted local record) are modelled as [`crate::reuse::Lookup::Miss`] or an
//! empty record and never surface as errors.

use crate::types::TokenAmount;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Context store errors
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Context I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize context record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Content hash conflict: record holds {existing}, merge carries {incoming}")]
    ContentHashConflict { existing: String, incoming: String },

    #[error("Status regression: {from} cannot move back to {to}")]
    StatusRegression { from: String, to: String },
}

/// Artifact channel errors (transient; recoverable inside reuse resolution)
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel transport error: {0}")]
    Transport(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Failed to decode bundle: {0}")]
    Decode(String),
}

/// Payment ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger request failed: {0}")]
    Request(String),

    #[error("Ledger returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("Funding arithmetic overflowed for {days} days at {rate} per day")]
    Overflow { days: u64, rate: TokenAmount },
}

/// Storage publisher errors
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Publish request failed: {0}")]
    Request(String),

    #[error("Storage provider rejected upload: {0}")]
    Rejected(String),

    #[error("Archive not readable at {path:?}: {reason}")]
    Archive { path: PathBuf, reason: String },
}

/// Archive packing errors
#[derive(Debug, Error)]
pub enum PackError {
    #[error("Content path does not exist: {0:?}")]
    MissingContent(PathBuf),

    #[error("Content path is empty: {0:?}")]
    EmptyContent(PathBuf),

    #[error("Content path {content:?} lies inside the archive output under {out:?}")]
    Overlap { content: PathBuf, out: PathBuf },

    #[error("Packing I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to walk content tree: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Pipeline errors surfaced by the phase orchestrator
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error(
        "Required top-up {required} exceeds the configured top-up cap {cap}. \
         Raise the cap deliberately if this spend is expected."
    )]
    CapExceeded {
        required: TokenAmount,
        cap: TokenAmount,
    },

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Packing failed: {0}")]
    Pack(#[from] PackError),

    #[error("Context store error: {0}")]
    Context(#[from] ContextError),

    #[error("Artifact channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("No readable build bundle named {identity}. Did the build phase run and publish it?")]
    MissingBuildBundle { identity: String },

    #[error("Failed to write step outputs to {path:?}: {source}")]
    Outputs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

/// Pipeline phase, used to say which phase failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Build,
    Upload,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Setup => write!(f, "setup"),
            Phase::Build => write!(f, "build"),
            Phase::Upload => write!(f, "upload"),
        }
    }
}

/// A fatal error tagged with the phase it happened in
#[derive(Debug, Error)]
#[error("{phase} phase failed: {error}")]
pub struct PhaseFailure {
    pub phase: Phase,
    #[source]
    pub error: PipelineError,
}

impl PhaseFailure {
    pub fn new(phase: Phase, error: impl Into<PipelineError>) -> Self {
        Self {
            phase,
            error: error.into(),
        }
    }
}
