//! Run report and CI step outputs.

use crate::config::Mode;
use crate::context::{CombinedContext, ContextStatus, PublishResult};
use crate::reuse::ReuseSource;
use crate::types::{ContentHash, TokenAmount};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// What one execution did, for printing and for downstream steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub mode: Mode,
    pub artifact_identity: Option<String>,
    pub content_hash: Option<ContentHash>,
    pub status: Option<ContextStatus>,
    pub reuse_source: Option<ReuseSource>,
    pub publish_result: Option<PublishResult>,
    pub deposited: TokenAmount,
    pub balance: Option<TokenAmount>,
    pub runway_days: Option<u64>,
    pub block_reason: Option<String>,
}

impl RunReport {
    /// Report reflecting the final state of `record`.
    pub fn from_record(mode: Mode, record: &CombinedContext) -> Self {
        let snapshot = record.payment_snapshot.as_ref();
        Self {
            mode,
            artifact_identity: record.artifact_identity.clone(),
            content_hash: record.content_hash.clone(),
            status: record.status,
            reuse_source: None,
            publish_result: record.publish_result.clone(),
            deposited: snapshot
                .map(|s| s.deposited_this_run)
                .unwrap_or(TokenAmount::ZERO),
            balance: snapshot.map(|s| s.balance),
            runway_days: snapshot.and_then(|s| s.runway_days),
            block_reason: record.block_reason.clone(),
        }
    }

    pub fn with_reuse_source(mut self, source: ReuseSource) -> Self {
        self.reuse_source = Some(source);
        self
    }

    /// Step outputs as `(key, value)` pairs; absent values are empty strings.
    pub fn outputs(&self) -> Vec<(&'static str, String)> {
        let result = self.publish_result.as_ref();
        let text = |value: Option<&str>| value.unwrap_or_default().to_string();
        vec![
            ("mode", self.mode.to_string()),
            ("artifact_identity", text(self.artifact_identity.as_deref())),
            (
                "content_hash",
                self.content_hash
                    .as_ref()
                    .map(|h| h.to_string())
                    .unwrap_or_default(),
            ),
            (
                "status",
                self.status.map(|s| s.to_string()).unwrap_or_default(),
            ),
            (
                "reuse_source",
                self.reuse_source.map(|s| s.to_string()).unwrap_or_default(),
            ),
            ("piece_id", text(result.map(|r| r.piece_id.as_str()))),
            ("dataset_id", text(result.map(|r| r.dataset_id.as_str()))),
            ("provider", text(result.map(|r| r.provider.as_str()))),
            (
                "preview_locator",
                text(result.and_then(|r| r.preview_locator.as_deref())),
            ),
            ("deposited", self.deposited.to_string()),
            ("block_reason", text(self.block_reason.as_deref())),
        ]
    }

    /// Append `key=value` lines to a CI outputs file.
    pub fn write_outputs_file(&self, path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for (key, value) in self.outputs() {
            // One line per output; embedded newlines would start a new key.
            let value = value.replace(['\r', '\n'], " ");
            writeln!(file, "{}={}", key, value)?;
        }
        Ok(())
    }
}
