//! Reuse resolution: decide whether a paid publish is needed.
//!
//! Tiers, in order, each tried only when the previous one misses:
//! 1. local record: the working area's context already holds a publish result
//!    for this content hash
//! 2. cross-run bundle: a live `reuse-{hash}` bundle on the artifact channel
//!    carries a publish result for this hash
//! 3. fresh: nothing reusable; the caller performs a paid publish
//!
//! Nothing in tiers 1 and 2 is fatal. Channel faults, undecodable bundles and
//! store write failures all degrade to a miss.

use crate::channel::{
    list_with_retry, live_newest_first, ArtifactChannel, ArtifactEntry, Bundle, ListScope,
    LIST_ATTEMPTS,
};
use crate::context::{CombinedContext, ContextPatch, ContextStatus, ContextStore, PublishResult};
use crate::error::ChannelError;
use crate::identity::reuse_identity;
use crate::types::ContentHash;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Outcome of a lookup that is expected to miss sometimes.
///
/// A miss is a normal result, not an error; only faults outside the reuse
/// tiers travel through `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Hit(T),
    Miss(MissReason),
}

impl<T> Lookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

/// Why a tier missed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// The local record has no publish result at all
    NoLocalResult,
    /// The local publish result belongs to different content
    LocalHashMismatch,
    /// No bundle with the reuse name was listed
    NotListed,
    /// Bundles were listed but all of them are expired
    AllExpired,
    /// Listing the channel failed
    ListingFailed(String),
    /// A listed bundle could not be downloaded
    FetchFailed(String),
    /// A downloaded bundle could not be decoded or lacks a usable result
    Unusable(String),
    /// The reused result could not be recorded locally
    RecordFailed(String),
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::NoLocalResult => write!(f, "no publish result in local record"),
            MissReason::LocalHashMismatch => {
                write!(f, "local publish result is for different content")
            }
            MissReason::NotListed => write!(f, "no reuse bundle listed"),
            MissReason::AllExpired => write!(f, "all reuse bundles expired"),
            MissReason::ListingFailed(e) => write!(f, "listing failed: {}", e),
            MissReason::FetchFailed(e) => write!(f, "download failed: {}", e),
            MissReason::Unusable(e) => write!(f, "bundle unusable: {}", e),
            MissReason::RecordFailed(e) => write!(f, "could not record reused result: {}", e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReuseOutcome {
    Fresh,
    Reused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReuseSource {
    None,
    LocalRecord,
    CrossRunBundle,
}

/// Decision returned by [`ReuseResolver::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReuseDecision {
    pub outcome: ReuseOutcome,
    pub source: ReuseSource,
    /// Reused publish result; `None` for a fresh outcome
    pub publish_result: Option<PublishResult>,
    /// Misses collected on the way, for reporting
    pub misses: Vec<MissReason>,
}

impl fmt::Display for ReuseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReuseSource::None => write!(f, "none"),
            ReuseSource::LocalRecord => write!(f, "local-record"),
            ReuseSource::CrossRunBundle => write!(f, "cross-run-bundle"),
        }
    }
}

impl ReuseDecision {
    fn fresh(misses: Vec<MissReason>) -> Self {
        Self {
            outcome: ReuseOutcome::Fresh,
            source: ReuseSource::None,
            publish_result: None,
            misses,
        }
    }

    fn reused(source: ReuseSource, result: PublishResult, misses: Vec<MissReason>) -> Self {
        Self {
            outcome: ReuseOutcome::Reused,
            source,
            publish_result: Some(result),
            misses,
        }
    }

    pub fn is_reused(&self) -> bool {
        self.outcome == ReuseOutcome::Reused
    }

    /// Status the context should record for this decision, if reused.
    pub fn reused_status(&self) -> Option<ContextStatus> {
        match self.source {
            ReuseSource::LocalRecord => Some(ContextStatus::ReusedCache),
            ReuseSource::CrossRunBundle => Some(ContextStatus::ReusedArtifact),
            ReuseSource::None => None,
        }
    }
}

/// What a cross-run bundle contributes on a hit
#[derive(Debug, Clone, PartialEq, Eq)]
struct BundleHit {
    publish_result: PublishResult,
    archive_ref: Option<PathBuf>,
}

/// Three-tier reuse resolver over an artifact channel
pub struct ReuseResolver<'a> {
    channel: &'a dyn ArtifactChannel,
    list_attempts: u32,
}

impl<'a> ReuseResolver<'a> {
    pub fn new(channel: &'a dyn ArtifactChannel) -> Self {
        Self {
            channel,
            list_attempts: LIST_ATTEMPTS,
        }
    }

    /// Number of listing attempts before a listing fault counts as a miss.
    pub fn with_list_attempts(mut self, attempts: u32) -> Self {
        self.list_attempts = attempts.max(1);
        self
    }

    /// Resolve reuse for `content_hash` against the record in `store`.
    ///
    /// On a cross-run hit the bundle's publish result and archive locator are
    /// merged into the store before returning.
    pub async fn resolve(&self, content_hash: &ContentHash, store: &ContextStore) -> ReuseDecision {
        let mut misses = Vec::new();

        match check_local_record(content_hash, &store.load()) {
            Lookup::Hit(result) => {
                info!(content_hash = %content_hash, "Reusing publish result from local record");
                return ReuseDecision::reused(ReuseSource::LocalRecord, result, misses);
            }
            Lookup::Miss(reason) => {
                debug!(content_hash = %content_hash, reason = %reason, "Local record miss");
                misses.push(reason);
            }
        }

        match self.check_cross_run_bundle(content_hash).await {
            Lookup::Hit(hit) => {
                let mut patch = ContextPatch::new().publish_result(hit.publish_result.clone());
                patch.archive_ref = hit.archive_ref;
                match store.merge(patch) {
                    Ok(_) => {
                        info!(content_hash = %content_hash, "Reusing publish result from cross-run bundle");
                        return ReuseDecision::reused(
                            ReuseSource::CrossRunBundle,
                            hit.publish_result,
                            misses,
                        );
                    }
                    Err(e) => {
                        warn!(error = %e, "Could not record reused publish result; treating as a miss");
                        misses.push(MissReason::RecordFailed(e.to_string()));
                    }
                }
            }
            Lookup::Miss(reason) => {
                info!(content_hash = %content_hash, reason = %reason, "No reusable bundle; a fresh publish is needed");
                misses.push(reason);
            }
        }

        ReuseDecision::fresh(misses)
    }

    async fn check_cross_run_bundle(&self, content_hash: &ContentHash) -> Lookup<BundleHit> {
        let name = reuse_identity(content_hash);
        let scope = ListScope::named(&name);
        let entries = match list_with_retry(self.channel, &scope, self.list_attempts).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(bundle = %name, error = %e, "Listing reuse bundles failed");
                return Lookup::Miss(MissReason::ListingFailed(e.to_string()));
            }
        };

        if entries.is_empty() {
            return Lookup::Miss(MissReason::NotListed);
        }
        let live = live_newest_first(entries);
        if live.is_empty() {
            return Lookup::Miss(MissReason::AllExpired);
        }

        let mut last_miss = MissReason::AllExpired;
        for entry in live {
            match self.try_entry(content_hash, &entry).await {
                Lookup::Hit(hit) => return Lookup::Hit(hit),
                Lookup::Miss(reason) => {
                    debug!(bundle = %name, id = %entry.id, reason = %reason, "Reuse bundle skipped");
                    last_miss = reason;
                }
            }
        }
        Lookup::Miss(last_miss)
    }

    async fn try_entry(&self, content_hash: &ContentHash, entry: &ArtifactEntry) -> Lookup<BundleHit> {
        let files = match self.channel.fetch(&entry.id).await {
            Ok(files) => files,
            Err(ChannelError::NotFound(what)) => {
                return Lookup::Miss(MissReason::FetchFailed(format!("{} not found", what)))
            }
            Err(e) => {
                warn!(id = %entry.id, error = %e, "Reuse bundle download failed");
                return Lookup::Miss(MissReason::FetchFailed(e.to_string()));
            }
        };

        let bundle = match Bundle::from_files(files) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(id = %entry.id, error = %e, "Reuse bundle undecodable");
                return Lookup::Miss(MissReason::Unusable(e.to_string()));
            }
        };

        bundle_hit(content_hash, bundle.context)
    }
}

/// Tier 1: the stored record already published this exact content.
pub fn check_local_record(content_hash: &ContentHash, record: &CombinedContext) -> Lookup<PublishResult> {
    match &record.publish_result {
        None => Lookup::Miss(MissReason::NoLocalResult),
        Some(_) => match record.publish_result_for(content_hash) {
            Some(result) => Lookup::Hit(result.clone()),
            None => Lookup::Miss(MissReason::LocalHashMismatch),
        },
    }
}

fn bundle_hit(content_hash: &ContentHash, context: CombinedContext) -> Lookup<BundleHit> {
    if let Some(bundle_hash) = &context.content_hash {
        if bundle_hash != content_hash {
            return Lookup::Miss(MissReason::Unusable(format!(
                "bundle is for content {}",
                bundle_hash
            )));
        }
    }
    match context.publish_result_for(content_hash) {
        Some(result) if !result.piece_id.is_empty() => Lookup::Hit(BundleHit {
            publish_result: result.clone(),
            archive_ref: context.archive_ref.clone(),
        }),
        Some(_) => Lookup::Miss(MissReason::Unusable("publish result has no piece id".to_string())),
        None => Lookup::Miss(MissReason::Unusable("no publish result for this content".to_string())),
    }
}
