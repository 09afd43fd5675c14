//! Partial context updates and the field-level merge rule.

use crate::context::types::{
    CombinedContext, ContextStatus, PaymentSnapshot, PublishResult, PullRequestInfo, TriggerKind,
};
use crate::error::ContextError;
use crate::types::ContentHash;
use std::path::PathBuf;

/// A partial [`CombinedContext`]: every `Some` field overwrites the stored one.
///
/// Applying a patch is idempotent, and two patches touching disjoint fields
/// commute. The write-once content hash and forward-only status are checked on
/// every application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextPatch {
    pub content_hash: Option<ContentHash>,
    pub archive_ref: Option<PathBuf>,
    pub artifact_identity: Option<String>,
    pub producing_run_id: Option<String>,
    pub trigger_kind: Option<TriggerKind>,
    pub pr: Option<PullRequestInfo>,
    pub publish_result: Option<PublishResult>,
    pub status: Option<ContextStatus>,
    pub payment_snapshot: Option<PaymentSnapshot>,
    pub block_reason: Option<String>,
}

impl ContextPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch carrying every populated field of `record`.
    pub fn from_record(record: &CombinedContext) -> Self {
        Self {
            content_hash: record.content_hash.clone(),
            archive_ref: record.archive_ref.clone(),
            artifact_identity: record.artifact_identity.clone(),
            producing_run_id: record.producing_run_id.clone(),
            trigger_kind: record.trigger_kind,
            pr: record.pr.clone(),
            publish_result: record.publish_result.clone(),
            status: record.status,
            payment_snapshot: record.payment_snapshot.clone(),
            block_reason: record.block_reason.clone(),
        }
    }

    pub fn content_hash(mut self, hash: ContentHash) -> Self {
        self.content_hash = Some(hash);
        self
    }

    pub fn archive_ref(mut self, archive_ref: impl Into<PathBuf>) -> Self {
        self.archive_ref = Some(archive_ref.into());
        self
    }

    pub fn artifact_identity(mut self, identity: impl Into<String>) -> Self {
        self.artifact_identity = Some(identity.into());
        self
    }

    pub fn producing_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.producing_run_id = Some(run_id.into());
        self
    }

    pub fn trigger_kind(mut self, kind: TriggerKind) -> Self {
        self.trigger_kind = Some(kind);
        self
    }

    pub fn pr(mut self, pr: Option<PullRequestInfo>) -> Self {
        self.pr = pr;
        self
    }

    pub fn publish_result(mut self, result: PublishResult) -> Self {
        self.publish_result = Some(result);
        self
    }

    pub fn status(mut self, status: ContextStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn payment_snapshot(mut self, snapshot: PaymentSnapshot) -> Self {
        self.payment_snapshot = Some(snapshot);
        self
    }

    pub fn block_reason(mut self, reason: impl Into<String>) -> Self {
        self.block_reason = Some(reason.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite every field of `base` that this patch carries.
    pub fn apply(&self, base: &CombinedContext) -> Result<CombinedContext, ContextError> {
        if let (Some(existing), Some(incoming)) = (&base.content_hash, &self.content_hash) {
            if existing != incoming {
                return Err(ContextError::ContentHashConflict {
                    existing: existing.to_string(),
                    incoming: incoming.to_string(),
                });
            }
        }
        if let Some(status) = self.status {
            if !status.may_follow(base.status) {
                return Err(ContextError::StatusRegression {
                    from: base.status.map(|s| s.to_string()).unwrap_or_default(),
                    to: status.to_string(),
                });
            }
        }

        let mut next = base.clone();
        overwrite(&mut next.content_hash, &self.content_hash);
        overwrite(&mut next.archive_ref, &self.archive_ref);
        overwrite(&mut next.artifact_identity, &self.artifact_identity);
        overwrite(&mut next.producing_run_id, &self.producing_run_id);
        overwrite(&mut next.trigger_kind, &self.trigger_kind);
        overwrite(&mut next.pr, &self.pr);
        overwrite(&mut next.publish_result, &self.publish_result);
        overwrite(&mut next.status, &self.status);
        overwrite(&mut next.payment_snapshot, &self.payment_snapshot);
        overwrite(&mut next.block_reason, &self.block_reason);
        Ok(next)
    }
}

fn overwrite<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if let Some(value) = incoming {
        *slot = Some(value.clone());
    }
}
