//! In-process artifact channel.
//!
//! Backs the test suites. Its switches drive the miss and retry paths.

use crate::channel::{
    ArtifactChannel, ArtifactEntry, ArtifactId, BundleFile, ListScope, RetentionHint,
};
use crate::error::ChannelError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Clone)]
struct StoredArtifact {
    id: ArtifactId,
    name: String,
    files: Vec<BundleFile>,
    created_at: DateTime<Utc>,
    expired: bool,
}

#[derive(Debug, Default)]
struct State {
    artifacts: Vec<StoredArtifact>,
    broken_fetch: HashSet<String>,
    failing_list: bool,
    pending_list_failures: u32,
    next_id: u64,
    fetches: u64,
}

/// Artifact channel held in memory
#[derive(Debug, Default)]
pub struct MemoryChannel {
    state: Mutex<State>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every artifact named `name` as expired (listed, not fetchable).
    pub fn expire(&self, name: &str) {
        let mut state = self.state.lock();
        for artifact in state.artifacts.iter_mut().filter(|a| a.name == name) {
            artifact.expired = true;
        }
    }

    /// Listed as live, but downloads fail: the artifact expired between
    /// listing and fetching.
    pub fn break_fetch(&self, name: &str) {
        self.state.lock().broken_fetch.insert(name.to_string());
    }

    /// Make every `list` call fail with a transport error.
    pub fn fail_listing(&self, failing: bool) {
        self.state.lock().failing_list = failing;
    }

    /// Make the next `count` `list` calls fail, then recover.
    pub fn fail_next_listings(&self, count: u32) {
        self.state.lock().pending_list_failures = count;
    }

    /// Number of artifacts published under `name`.
    pub fn published_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .artifacts
            .iter()
            .filter(|a| a.name == name)
            .count()
    }

    /// Names of all published artifacts, in publish order.
    pub fn names(&self) -> Vec<String> {
        self.state
            .lock()
            .artifacts
            .iter()
            .map(|a| a.name.clone())
            .collect()
    }

    /// Number of fetch calls made so far.
    pub fn fetch_count(&self) -> u64 {
        self.state.lock().fetches
    }
}

#[async_trait]
impl ArtifactChannel for MemoryChannel {
    async fn publish(
        &self,
        name: &str,
        files: &[BundleFile],
        _retention: RetentionHint,
    ) -> Result<ArtifactId, ChannelError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = ArtifactId(format!("mem-{}", state.next_id));
        state.artifacts.push(StoredArtifact {
            id: id.clone(),
            name: name.to_string(),
            files: files.to_vec(),
            created_at: Utc::now(),
            expired: false,
        });
        Ok(id)
    }

    async fn list(&self, scope: &ListScope) -> Result<Vec<ArtifactEntry>, ChannelError> {
        let mut state = self.state.lock();
        if state.pending_list_failures > 0 {
            state.pending_list_failures -= 1;
            return Err(ChannelError::Transport("listing interrupted".to_string()));
        }
        if state.failing_list {
            return Err(ChannelError::Transport("listing unavailable".to_string()));
        }
        Ok(state
            .artifacts
            .iter()
            .filter(|a| a.name == scope.name)
            .map(|a| ArtifactEntry {
                id: a.id.clone(),
                name: a.name.clone(),
                expired: a.expired,
                created_at: a.created_at,
            })
            .collect())
    }

    async fn fetch(&self, id: &ArtifactId) -> Result<Vec<BundleFile>, ChannelError> {
        let mut state = self.state.lock();
        state.fetches += 1;
        let artifact = state
            .artifacts
            .iter()
            .find(|a| &a.id == id)
            .ok_or_else(|| ChannelError::NotFound(id.to_string()))?;
        if artifact.expired || state.broken_fetch.contains(&artifact.name) {
            return Err(ChannelError::NotFound(format!("{} (expired)", id)));
        }
        Ok(artifact.files.clone())
    }
}
