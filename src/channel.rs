//! Artifact channel: the only link between build and upload executions.
//!
//! The channel is durable but not permanent. Artifacts may expire between a
//! `list` and a `fetch`, and callers treat "expired", "not found" and "fetch
//! failed" alike as a miss.

use crate::error::ChannelError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub mod bundle;
pub mod directory;
pub mod memory;

pub use bundle::Bundle;
pub use directory::DirectoryChannel;
pub use memory::MemoryChannel;

/// Opaque artifact identifier assigned by the channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub String);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub id: ArtifactId,
    pub name: String,
    pub expired: bool,
    pub created_at: DateTime<Utc>,
}

/// One file inside a bundle. `path` is relative and `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFile {
    pub path: String,
    pub bytes: Vec<u8>,
}

impl BundleFile {
    pub fn new(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }
}

/// How long the channel should keep an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionHint {
    pub days: u32,
}

impl RetentionHint {
    pub fn days(days: u32) -> Self {
        Self { days }
    }
}

/// Listing filter: artifacts with exactly this name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListScope {
    pub name: String,
}

impl ListScope {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// External artifact store shared by build and upload executions
#[async_trait]
pub trait ArtifactChannel: Send + Sync {
    /// Store `files` under `name`; returns the new artifact's id
    async fn publish(
        &self,
        name: &str,
        files: &[BundleFile],
        retention: RetentionHint,
    ) -> Result<ArtifactId, ChannelError>;

    /// List artifacts in `scope`, expired ones included and flagged
    async fn list(&self, scope: &ListScope) -> Result<Vec<ArtifactEntry>, ChannelError>;

    /// Download an artifact's files
    async fn fetch(&self, id: &ArtifactId) -> Result<Vec<BundleFile>, ChannelError>;
}

/// Listing attempts before a listing fault is reported.
pub const LIST_ATTEMPTS: u32 = 2;

/// List `scope`, retrying a failed listing until `attempts` are used up.
pub async fn list_with_retry(
    channel: &dyn ArtifactChannel,
    scope: &ListScope,
    attempts: u32,
) -> Result<Vec<ArtifactEntry>, ChannelError> {
    let mut attempt = 1;
    loop {
        match channel.list(scope).await {
            Ok(entries) => return Ok(entries),
            Err(e) if attempt < attempts => {
                debug!(name = %scope.name, attempt, error = %e, "Retrying channel listing");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Live entries, newest first.
pub fn live_newest_first(mut entries: Vec<ArtifactEntry>) -> Vec<ArtifactEntry> {
    entries.retain(|entry| !entry.expired);
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    entries
}
