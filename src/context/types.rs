//! Combined context record shared by the build and upload phases.

use crate::types::{ContentHash, TokenAmount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Current on-disk schema version of [`CombinedContext`].
pub const CONTEXT_VERSION: u32 = 2;

/// Kind of event that triggered the producing execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    #[serde(alias = "pull_request_target")]
    PullRequest,
    Push,
    #[serde(alias = "workflow_dispatch")]
    Manual,
    #[serde(alias = "schedule")]
    Scheduled,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerKind::PullRequest => "pull_request",
            TriggerKind::Push => "push",
            TriggerKind::Manual => "manual",
            TriggerKind::Scheduled => "scheduled",
        };
        f.write_str(name)
    }
}

/// Pipeline status recorded in the context.
///
/// Statuses only move forward: `build-only` may be followed by any terminal
/// status, terminal statuses may replace each other, nothing returns to
/// `build-only`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextStatus {
    BuildOnly,
    Uploaded,
    ReusedCache,
    ReusedArtifact,
    #[serde(alias = "fork-pr-blocked")]
    Blocked,
}

impl ContextStatus {
    pub fn rank(self) -> u8 {
        match self {
            ContextStatus::BuildOnly => 1,
            ContextStatus::Uploaded
            | ContextStatus::ReusedCache
            | ContextStatus::ReusedArtifact
            | ContextStatus::Blocked => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Whether a record currently at `current` may move to `self`.
    pub fn may_follow(self, current: Option<ContextStatus>) -> bool {
        current.map_or(true, |c| self.rank() >= c.rank())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContextStatus::BuildOnly => "build-only",
            ContextStatus::Uploaded => "uploaded",
            ContextStatus::ReusedCache => "reused-cache",
            ContextStatus::ReusedArtifact => "reused-artifact",
            ContextStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for ContextStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pull request the content was built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    #[serde(default, alias = "sha")]
    pub commit_sha: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
}

/// Result of a paid publish to the storage network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    /// Content hash this result was produced for
    #[serde(default)]
    pub content_hash: ContentHash,
    #[serde(default)]
    pub piece_id: String,
    #[serde(default)]
    pub dataset_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_locator: Option<String>,
}

/// Ledger state observed during the upload phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    #[serde(default)]
    pub balance: TokenAmount,
    /// Whole days of runway at the observed rate; `None` when the rate is zero
    #[serde(default)]
    pub runway_days: Option<u64>,
    #[serde(default)]
    pub deposited_this_run: TokenAmount,
}

/// The single durable record accumulated across phases.
///
/// Every field is optional so records written by older or newer binaries stay
/// readable: unknown fields are ignored and missing ones read as empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinedContext {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<ContentHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_ref: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producing_run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_kind: Option<TriggerKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr: Option<PullRequestInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_result: Option<PublishResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ContextStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_snapshot: Option<PaymentSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for CombinedContext {
    fn default() -> Self {
        Self {
            version: CONTEXT_VERSION,
            content_hash: None,
            archive_ref: None,
            artifact_identity: None,
            producing_run_id: None,
            trigger_kind: None,
            pr: None,
            publish_result: None,
            status: None,
            payment_snapshot: None,
            block_reason: None,
            updated_at: None,
        }
    }
}

impl CombinedContext {
    pub fn is_empty(&self) -> bool {
        self.content_hash.is_none() && self.status.is_none() && self.publish_result.is_none()
    }

    /// Publish result recorded for `hash`, if this record holds one.
    pub fn publish_result_for(&self, hash: &ContentHash) -> Option<&PublishResult> {
        self.publish_result
            .as_ref()
            .filter(|result| &result.content_hash == hash)
    }
}
