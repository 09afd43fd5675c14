//! Phase orchestrator: the single entry point for build, upload and combined
//! executions.
//!
//! Every phase reads and writes the same [`ContextStore`]. Merges are never
//! rolled back; re-running a phase after a failure is safe because merges are
//! idempotent.

use crate::channel::{
    list_with_retry, live_newest_first, ArtifactChannel, ArtifactId, Bundle, BundleFile,
    ListScope, RetentionHint, LIST_ATTEMPTS,
};
use crate::config::{Mode, RunConfig};
use crate::context::{
    CombinedContext, ContextPatch, ContextStatus, ContextStore, PaymentSnapshot,
};
use crate::error::{ChannelError, Phase, PhaseFailure, PipelineError, PublishError};
use crate::identity::{resolve_identity, reuse_identity};
use crate::ledger::PaymentLedger;
use crate::pack::{ArchivePacker, ARCHIVE_DIR_NAME};
use crate::payment::{runway_days, FundingRejection, FundingRequest, PaymentGuard};
use crate::publish::{PublishRequest, StoragePublisher};
use crate::report::RunReport;
use crate::reuse::{ReuseDecision, ReuseResolver, ReuseSource};
use crate::trigger::TriggerEvent;
use crate::types::{ContentHash, TokenAmount};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// External collaborators, borrowed for the duration of a run
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub channel: &'a dyn ArtifactChannel,
    pub ledger: &'a dyn PaymentLedger,
    pub publisher: &'a dyn StoragePublisher,
    pub packer: &'a dyn ArchivePacker,
}

/// Attempts for publishing the build bundle before the build phase fails.
const BUILD_PUBLISH_ATTEMPTS: u32 = 2;

/// Threads identity, context, reuse and payment together for one execution
pub struct PhaseOrchestrator<'a> {
    config: &'a RunConfig,
    trigger: TriggerEvent,
    store: ContextStore,
    collaborators: Collaborators<'a>,
}

/// What the build phase produced
#[derive(Debug, Clone)]
struct BuildOutput {
    identity: String,
    content_hash: ContentHash,
}

impl<'a> PhaseOrchestrator<'a> {
    pub fn new(
        config: &'a RunConfig,
        trigger: TriggerEvent,
        collaborators: Collaborators<'a>,
    ) -> Self {
        Self {
            config,
            trigger,
            store: ContextStore::in_dir(&config.work_dir),
            collaborators,
        }
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Run the configured mode.
    ///
    /// On any fatal error the ledger and publisher sessions are released
    /// before the failure is returned.
    pub async fn run(&self) -> Result<RunReport, PhaseFailure> {
        info!(
            mode = %self.config.mode,
            event = %self.trigger.event_name,
            run_id = %self.trigger.run_id,
            "Starting run"
        );

        let result = match self.config.mode {
            Mode::Build => self.build_phase(true).await.map(|_| self.report(None)),
            Mode::Upload => self.upload_phase(None).await,
            Mode::Combined => match self.build_phase(false).await {
                Ok(built) => self.upload_phase(Some(built)).await,
                Err(failure) => Err(failure),
            },
        };

        match result {
            Ok(report) => {
                info!(status = ?report.status, "Run finished");
                Ok(report)
            }
            Err(failure) => {
                error!(error = %failure, "Run failed; releasing sessions");
                self.release_sessions().await;
                Err(failure)
            }
        }
    }

    async fn release_sessions(&self) {
        self.collaborators.ledger.release().await;
        self.collaborators.publisher.release().await;
    }

    fn report(&self, source: Option<ReuseSource>) -> RunReport {
        let report = RunReport::from_record(self.config.mode, &self.store.load());
        match source {
            Some(source) => report.with_reuse_source(source),
            None => report,
        }
    }

    fn identity(&self) -> String {
        resolve_identity(&self.trigger, self.config.identity_override.as_deref())
    }

    // Build

    async fn build_phase(&self, publish_bundle: bool) -> Result<BuildOutput, PhaseFailure> {
        let fail = |e: PipelineError| PhaseFailure::new(Phase::Build, e);

        let packed = self
            .collaborators
            .packer
            .pack(&self.config.content_path, &self.config.work_dir)
            .map_err(|e| fail(e.into()))?;
        let identity = self.identity();
        info!(identity = %identity, content_hash = %packed.content_hash, "Content packed");

        let current = self.start_lineage(&packed.content_hash).map_err(fail)?;
        let mut patch = ContextPatch::new()
            .content_hash(packed.content_hash.clone())
            .archive_ref(packed.archive_ref.clone())
            .artifact_identity(identity.clone())
            .producing_run_id(self.trigger.run_id.clone())
            .trigger_kind(self.trigger.kind)
            .pr(self.trigger.pr.clone());
        if ContextStatus::BuildOnly.may_follow(current.status) {
            patch = patch.status(ContextStatus::BuildOnly);
        }
        let record = self
            .store
            .merge(patch)
            .map_err(|e| fail(e.into()))?;

        if publish_bundle {
            let bundle = Bundle::with_archive_dir(record, &packed.archive_ref)
                .map_err(|e| fail(e.into()))?;
            let files = bundle.to_files().map_err(|e| fail(e.into()))?;
            let retention = RetentionHint::days(self.config.build_retention_days);
            let id = self
                .publish_with_retry(&identity, &files, retention)
                .await
                .map_err(|e| fail(e.into()))?;
            info!(identity = %identity, id = %id, files = files.len(), "Build bundle published");
        }

        Ok(BuildOutput {
            identity,
            content_hash: packed.content_hash,
        })
    }

    /// Load the stored record, starting a fresh lineage when it belongs to
    /// other content.
    fn start_lineage(&self, content_hash: &ContentHash) -> Result<CombinedContext, PipelineError> {
        let current = self.store.load();
        let previous = match &current.content_hash {
            Some(existing) if existing != content_hash => existing.clone(),
            _ => return Ok(current),
        };
        info!(
            previous = %previous,
            current = %content_hash,
            "Content changed; starting a fresh context record"
        );
        self.store.reset()?;
        Ok(CombinedContext::default())
    }

    async fn publish_with_retry(
        &self,
        name: &str,
        files: &[BundleFile],
        retention: RetentionHint,
    ) -> Result<ArtifactId, ChannelError> {
        let mut attempt = 1;
        loop {
            match self.collaborators.channel.publish(name, files, retention).await {
                Ok(id) => return Ok(id),
                Err(e) if attempt < BUILD_PUBLISH_ATTEMPTS => {
                    warn!(artifact = %name, attempt, error = %e, "Bundle publish failed; retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // Upload

    async fn upload_phase(&self, built: Option<BuildOutput>) -> Result<RunReport, PhaseFailure> {
        let fail = |e: PipelineError| PhaseFailure::new(Phase::Upload, e);

        if self.trigger.is_foreign_content() && !self.config.allow_untrusted {
            return self.block().map_err(fail);
        }

        let (identity, content_hash) = match built {
            Some(built) => (built.identity, built.content_hash),
            None => {
                let identity = self.identity();
                let content_hash = self.receive_build_bundle(&identity).await.map_err(fail)?;
                (identity, content_hash)
            }
        };
        debug!(identity = %identity, content_hash = %content_hash, "Resolving reuse");

        let decision = ReuseResolver::new(self.collaborators.channel)
            .resolve(&content_hash, &self.store)
            .await;

        if decision.is_reused() {
            self.record_reuse(&decision).await.map_err(fail)?;
        } else {
            self.paid_publish(&content_hash).await.map_err(fail)?;
        }

        self.publish_reuse_bundle(&content_hash).await;
        Ok(self.report(Some(decision.source)))
    }

    fn block(&self) -> Result<RunReport, PipelineError> {
        let reason = format!(
            "content from {} is not trusted by {}; set allow_untrusted to publish it",
            self.trigger.head_repository.as_deref().unwrap_or("unknown"),
            self.trigger.base_repository.as_deref().unwrap_or("unknown"),
        );
        warn!(reason = %reason, "Upload blocked");
        self.store.merge(
            ContextPatch::new()
                .artifact_identity(self.identity())
                .status(ContextStatus::Blocked)
                .block_reason(reason),
        )?;
        Ok(self.report(None))
    }

    /// Fetch the newest readable build bundle named `identity`, import its
    /// context and materialize its archive locally.
    async fn receive_build_bundle(&self, identity: &str) -> Result<ContentHash, PipelineError> {
        let channel = self.collaborators.channel;
        let entries =
            list_with_retry(channel, &ListScope::named(identity), LIST_ATTEMPTS).await?;

        let mut bundle = None;
        for entry in live_newest_first(entries) {
            match channel.fetch(&entry.id).await.and_then(Bundle::from_files) {
                Ok(candidate) if candidate.context.content_hash.is_some() => {
                    bundle = Some(candidate);
                    break;
                }
                Ok(_) => warn!(id = %entry.id, "Build bundle has no content hash; skipping"),
                Err(e) => warn!(id = %entry.id, error = %e, "Build bundle unreadable; skipping"),
            }
        }
        let bundle = bundle.ok_or_else(|| PipelineError::MissingBuildBundle {
            identity: identity.to_string(),
        })?;
        let content_hash = bundle
            .context
            .content_hash
            .clone()
            .ok_or_else(|| PipelineError::MissingBuildBundle {
                identity: identity.to_string(),
            })?;

        self.start_lineage(&content_hash)?;
        self.store.import(&bundle.context)?;

        let archive_dir = self.config.work_dir.join(ARCHIVE_DIR_NAME);
        if archive_dir.exists() {
            fs::remove_dir_all(&archive_dir).map_err(ChannelError::Io)?;
        }
        let archive_ref = bundle.materialize_archive(&archive_dir)?;
        self.store
            .merge(ContextPatch::new().archive_ref(archive_ref))?;

        info!(identity = %identity, content_hash = %content_hash, "Build bundle received");
        Ok(content_hash)
    }

    async fn record_reuse(&self, decision: &ReuseDecision) -> Result<(), PipelineError> {
        // Balance revalidation only; a reused outcome never deposits.
        let snapshot = match self.collaborators.ledger.current_status().await {
            Ok(status) => Some(PaymentSnapshot {
                balance: status.balance,
                runway_days: runway_days(status.balance, status.runway_rate),
                deposited_this_run: TokenAmount::ZERO,
            }),
            Err(e) => {
                warn!(error = %e, "Could not revalidate balance; omitting payment snapshot");
                None
            }
        };

        let mut patch = ContextPatch::new();
        patch.publish_result = decision.publish_result.clone();
        patch.status = decision.reused_status();
        patch.payment_snapshot = snapshot;
        self.store.merge(patch)?;
        info!(source = %decision.source, "Publish reused; no payment made");
        Ok(())
    }

    async fn paid_publish(&self, content_hash: &ContentHash) -> Result<(), PipelineError> {
        let ledger = self.collaborators.ledger;
        let status = ledger.current_status().await?;

        let request = FundingRequest {
            current_balance: status.balance,
            target_runway_days: self.config.target_runway_days,
            runway_rate: status.runway_rate,
            max_balance: self.config.max_balance,
            max_top_up: self.config.max_top_up,
        };
        let decision = PaymentGuard::authorize(&request)?;
        if let Some(FundingRejection::ExceedsCap { required, cap }) = decision.reason {
            return Err(PipelineError::CapExceeded { required, cap });
        }

        if decision.needs_deposit() {
            ledger.deposit(decision.top_up).await?;
        }

        let archive_ref = self.store.load().archive_ref.ok_or_else(|| PublishError::Archive {
            path: PathBuf::new(),
            reason: "no archive recorded for this content".to_string(),
        })?;
        let result = self
            .collaborators
            .publisher
            .publish(&PublishRequest {
                content_hash: content_hash.clone(),
                archive_ref,
                provider: self.config.provider.clone(),
                with_cdn: self.config.with_cdn,
            })
            .await?;

        let balance = status
            .balance
            .checked_add(decision.top_up)
            .unwrap_or(TokenAmount::from_base_units(u128::MAX));
        self.store.merge(
            ContextPatch::new()
                .publish_result(result)
                .status(ContextStatus::Uploaded)
                .payment_snapshot(PaymentSnapshot {
                    balance,
                    runway_days: runway_days(balance, status.runway_rate),
                    deposited_this_run: decision.top_up,
                }),
        )?;
        Ok(())
    }

    /// Publish the context under `reuse-{hash}` for later executions. Failure
    /// only costs a future paid publish, so it is logged.
    async fn publish_reuse_bundle(&self, content_hash: &ContentHash) {
        let name = reuse_identity(content_hash);
        let files = match Bundle::context_only(self.store.load()).to_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(bundle = %name, error = %e, "Could not encode reuse bundle");
                return;
            }
        };
        let retention = RetentionHint::days(self.config.reuse_retention_days);
        match self.collaborators.channel.publish(&name, &files, retention).await {
            Ok(id) => info!(bundle = %name, id = %id, "Reuse bundle published"),
            Err(e) => warn!(bundle = %name, error = %e, "Reuse bundle publish failed"),
        }
    }
}
