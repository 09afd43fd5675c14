//! End-to-end phase runs against in-memory collaborators

use crate::integration::test_utils::{amount, FakeLedger, FakePublisher, Workspace};
use pinrelay::channel::{ArtifactChannel, DirectoryChannel, ListScope, MemoryChannel};
use pinrelay::config::{Mode, RunConfig};
use pinrelay::context::{ContextStatus, ContextStore, PullRequestInfo, TriggerKind};
use pinrelay::error::{Phase, PipelineError};
use pinrelay::identity::reuse_identity;
use pinrelay::orchestrator::{Collaborators, PhaseOrchestrator};
use pinrelay::pack::DirectoryPacker;
use pinrelay::report::RunReport;
use pinrelay::reuse::ReuseSource;
use pinrelay::trigger::TriggerEvent;
use pinrelay::types::ContentHash;
use serde_json::json;

fn pr_trigger(number: u64, run_id: &str) -> TriggerEvent {
    let mut trigger = TriggerEvent::bare(TriggerKind::PullRequest, run_id);
    trigger.pr = Some(PullRequestInfo {
        number,
        commit_sha: "abc123".to_string(),
        title: "Update landing page".to_string(),
        author: "octo".to_string(),
    });
    trigger.head_repository = Some("acme/site".to_string());
    trigger.base_repository = Some("acme/site".to_string());
    trigger
}

async fn run_with(
    config: &RunConfig,
    trigger: TriggerEvent,
    channel: &dyn ArtifactChannel,
    ledger: &FakeLedger,
    publisher: &FakePublisher,
) -> Result<RunReport, pinrelay::error::PhaseFailure> {
    let packer = DirectoryPacker::new();
    PhaseOrchestrator::new(
        config,
        trigger,
        Collaborators {
            channel,
            ledger,
            publisher,
            packer: &packer,
        },
    )
    .run()
    .await
}

#[tokio::test]
async fn test_fresh_content_is_published_and_paid() {
    let workspace = Workspace::new();
    let config = workspace.config(Mode::Combined, "work");
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("0", "0.01");
    let publisher = FakePublisher::new();

    let report = run_with(&config, pr_trigger(7, "100"), &channel, &ledger, &publisher)
        .await
        .unwrap();

    assert_eq!(report.status, Some(ContextStatus::Uploaded));
    assert_eq!(report.reuse_source, Some(ReuseSource::None));
    assert_eq!(report.artifact_identity.as_deref(), Some("build-7"));
    assert_eq!(report.deposited, amount("0.3"));
    assert_eq!(report.balance, Some(amount("0.3")));
    assert_eq!(report.runway_days, Some(30));
    assert_eq!(ledger.deposits(), vec![amount("0.3")]);
    assert_eq!(ledger.balance(), amount("0.3"));
    assert_eq!(publisher.publish_count(), 1);

    // Combined runs hand off in-process; only the reuse bundle is published.
    let hash = report.content_hash.clone().unwrap();
    assert_eq!(channel.names(), vec![reuse_identity(&hash)]);

    let record = ContextStore::in_dir(&config.work_dir).load();
    assert_eq!(record.pr.map(|pr| pr.number), Some(7));
    assert_eq!(record.producing_run_id.as_deref(), Some("100"));
    assert_eq!(record.publish_result.map(|r| r.content_hash), Some(hash));
}

#[tokio::test]
async fn test_rerun_reuses_local_record_without_payment() {
    let workspace = Workspace::new();
    let config = workspace.config(Mode::Combined, "work");
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("0", "0.01");
    let publisher = FakePublisher::new();

    let first = run_with(&config, pr_trigger(7, "100"), &channel, &ledger, &publisher)
        .await
        .unwrap();
    let second = run_with(&config, pr_trigger(7, "101"), &channel, &ledger, &publisher)
        .await
        .unwrap();

    assert_eq!(second.status, Some(ContextStatus::ReusedCache));
    assert_eq!(second.reuse_source, Some(ReuseSource::LocalRecord));
    assert_eq!(second.publish_result, first.publish_result);
    assert_eq!(second.deposited, amount("0"));
    // Balance was revalidated, nothing more.
    assert_eq!(second.balance, Some(amount("0.3")));
    assert_eq!(ledger.status_calls(), 2);
    assert_eq!(ledger.deposits().len(), 1);
    assert_eq!(publisher.publish_count(), 1);

    // The reuse bundle is republished to refresh its retention.
    let hash = second.content_hash.unwrap();
    assert_eq!(channel.published_count(&reuse_identity(&hash)), 2);
}

#[tokio::test]
async fn test_reuse_from_cross_run_bundle() {
    let workspace = Workspace::new();
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("1", "0.01");
    let publisher = FakePublisher::new();

    let first = run_with(
        &workspace.config(Mode::Combined, "work-a"),
        pr_trigger(7, "100"),
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap();
    // A different execution: nothing stored locally.
    let second = run_with(
        &workspace.config(Mode::Combined, "work-b"),
        pr_trigger(8, "200"),
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap();

    assert_eq!(second.status, Some(ContextStatus::ReusedArtifact));
    assert_eq!(second.reuse_source, Some(ReuseSource::CrossRunBundle));
    assert_eq!(second.publish_result, first.publish_result);
    assert_eq!(second.artifact_identity.as_deref(), Some("build-8"));
    assert_eq!(publisher.publish_count(), 1);
    assert!(ledger.deposits().is_empty());
}

#[tokio::test]
async fn test_expired_cross_run_bundle_falls_back_to_paid_publish() {
    let workspace = Workspace::new();
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("1", "0.01");
    let publisher = FakePublisher::new();

    let first = run_with(
        &workspace.config(Mode::Combined, "work-a"),
        pr_trigger(7, "100"),
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap();
    let hash = first.content_hash.unwrap();
    channel.break_fetch(&reuse_identity(&hash));

    let second = run_with(
        &workspace.config(Mode::Combined, "work-b"),
        pr_trigger(7, "101"),
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap();

    assert_eq!(second.status, Some(ContextStatus::Uploaded));
    assert_eq!(second.reuse_source, Some(ReuseSource::None));
    assert_eq!(publisher.publish_count(), 2);
}

#[tokio::test]
async fn test_top_up_above_cap_is_fatal_and_nothing_is_paid() {
    let workspace = Workspace::new();
    let mut config = workspace.config(Mode::Combined, "work");
    config.max_top_up = Some(amount("0.1"));
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("0", "0.01");
    let publisher = FakePublisher::new();

    let failure = run_with(&config, pr_trigger(7, "100"), &channel, &ledger, &publisher)
        .await
        .unwrap_err();

    assert_eq!(failure.phase, Phase::Upload);
    match failure.error {
        PipelineError::CapExceeded { required, cap } => {
            assert_eq!(required, amount("0.3"));
            assert_eq!(cap, amount("0.1"));
        }
        other => panic!("expected CapExceeded, got {}", other),
    }
    assert!(ledger.deposits().is_empty());
    assert_eq!(publisher.publish_count(), 0);
    assert_eq!(ledger.releases(), 1);
    assert_eq!(publisher.releases(), 1);
    assert!(channel.names().is_empty());
}

#[tokio::test]
async fn test_balance_cap_clamps_top_up_to_zero() {
    let workspace = Workspace::new();
    let mut config = workspace.config(Mode::Combined, "work");
    config.max_balance = Some(amount("5"));
    let channel = MemoryChannel::new();
    // Five at a rate that would demand far more for thirty days.
    let ledger = FakeLedger::new("5", "1");
    let publisher = FakePublisher::new();

    let report = run_with(&config, pr_trigger(7, "100"), &channel, &ledger, &publisher)
        .await
        .unwrap();

    assert_eq!(report.status, Some(ContextStatus::Uploaded));
    assert_eq!(report.deposited, amount("0"));
    assert_eq!(report.runway_days, Some(5));
    assert!(ledger.deposits().is_empty());
    assert_eq!(publisher.publish_count(), 1);
}

#[tokio::test]
async fn test_fork_content_is_blocked_before_payment() {
    let workspace = Workspace::new();
    let config = workspace.config(Mode::Combined, "work");
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("0", "0.01");
    let publisher = FakePublisher::new();

    let mut trigger = pr_trigger(9, "100");
    trigger.head_repository = Some("mallory/site".to_string());

    let report = run_with(&config, trigger, &channel, &ledger, &publisher)
        .await
        .unwrap();

    assert_eq!(report.status, Some(ContextStatus::Blocked));
    assert!(report.block_reason.unwrap().contains("mallory/site"));
    assert_eq!(ledger.status_calls(), 0);
    assert_eq!(publisher.publish_count(), 0);
    assert!(channel.names().is_empty());
}

#[tokio::test]
async fn test_fork_upload_is_blocked_before_fetching_bundle() {
    let workspace = Workspace::new();
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("1", "0.01");
    let publisher = FakePublisher::new();

    let payload = json!({
        "repository": {"full_name": "acme/site"},
        "workflow_run": {
            "event": "pull_request",
            "head_repository": {"full_name": "mallory/site"},
            "pull_requests": [{"number": 9}]
        }
    });
    let trigger = TriggerEvent::from_payload("workflow_run", &payload, "600").unwrap();
    let report = run_with(
        &workspace.config(Mode::Upload, "upload-work"),
        trigger,
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap();

    assert_eq!(report.status, Some(ContextStatus::Blocked));
    assert_eq!(report.artifact_identity.as_deref(), Some("build-9"));
    assert_eq!(ledger.status_calls(), 0);
    assert_eq!(channel.fetch_count(), 0);
}

#[tokio::test]
async fn test_allow_untrusted_publishes_fork_content() {
    let workspace = Workspace::new();
    let mut config = workspace.config(Mode::Combined, "work");
    config.allow_untrusted = true;
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("1", "0.01");
    let publisher = FakePublisher::new();

    let mut trigger = pr_trigger(9, "100");
    trigger.head_repository = Some("mallory/site".to_string());

    let report = run_with(&config, trigger, &channel, &ledger, &publisher)
        .await
        .unwrap();
    assert_eq!(report.status, Some(ContextStatus::Uploaded));
}

#[tokio::test]
async fn test_publish_rejection_releases_sessions() {
    let workspace = Workspace::new();
    let config = workspace.config(Mode::Combined, "work");
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("1", "0.01");
    let publisher = FakePublisher::rejecting();

    let failure = run_with(&config, pr_trigger(7, "100"), &channel, &ledger, &publisher)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, PipelineError::Publish(_)));
    assert_eq!(ledger.releases(), 1);
    assert_eq!(publisher.releases(), 1);
}

#[tokio::test]
async fn test_reuse_survives_unreachable_ledger() {
    let workspace = Workspace::new();
    let config = workspace.config(Mode::Combined, "work");
    let channel = MemoryChannel::new();
    let publisher = FakePublisher::new();

    run_with(
        &config,
        pr_trigger(7, "100"),
        &channel,
        &FakeLedger::new("1", "0.01"),
        &publisher,
    )
    .await
    .unwrap();

    let down = FakeLedger::unreachable();
    let report = run_with(&config, pr_trigger(7, "101"), &channel, &down, &publisher)
        .await
        .unwrap();
    assert_eq!(report.status, Some(ContextStatus::ReusedCache));
    // The snapshot from the paid run is kept when revalidation fails.
    assert_eq!(report.balance, Some(amount("1")));
    assert_eq!(report.deposited, amount("0"));
    assert_eq!(down.status_calls(), 1);
}

#[tokio::test]
async fn test_changed_content_starts_a_new_lineage() {
    let workspace = Workspace::new();
    let config = workspace.config(Mode::Combined, "work");
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("1", "0.01");
    let publisher = FakePublisher::new();

    let first = run_with(&config, pr_trigger(7, "100"), &channel, &ledger, &publisher)
        .await
        .unwrap();
    workspace.write_site("<h1>changed</h1>");
    let second = run_with(&config, pr_trigger(7, "101"), &channel, &ledger, &publisher)
        .await
        .unwrap();

    assert_ne!(first.content_hash, second.content_hash);
    assert_eq!(second.status, Some(ContextStatus::Uploaded));
    assert_eq!(publisher.publish_count(), 2);
    assert_eq!(
        second.publish_result.unwrap().content_hash,
        second.content_hash.unwrap()
    );
}

#[tokio::test]
async fn test_build_then_upload_through_directory_channel() {
    let workspace = Workspace::new();
    let channel = DirectoryChannel::new(workspace.path("channel"));
    let ledger = FakeLedger::new("0", "0.01");
    let publisher = FakePublisher::new();

    let built = run_with(
        &workspace.config(Mode::Build, "build-work"),
        pr_trigger(12, "300"),
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap();
    assert_eq!(built.status, Some(ContextStatus::BuildOnly));
    assert_eq!(ledger.status_calls(), 0);

    let listed = channel.list(&ListScope::named("build-12")).await.unwrap();
    assert_eq!(listed.len(), 1);

    // The upload job runs elsewhere: its own work dir, no content checkout.
    let mut upload = workspace.config(Mode::Upload, "upload-work");
    upload.content_path = workspace.path("missing");
    let uploaded = run_with(&upload, pr_trigger(12, "301"), &channel, &ledger, &publisher)
        .await
        .unwrap();

    assert_eq!(uploaded.status, Some(ContextStatus::Uploaded));
    assert_eq!(uploaded.content_hash, built.content_hash);
    assert_eq!(uploaded.artifact_identity.as_deref(), Some("build-12"));

    let request = &publisher.requests()[0];
    assert!(request.archive_ref.starts_with(workspace.path("upload-work")));
    assert!(request.archive_ref.join("css/main.css").is_file());
}

#[tokio::test]
async fn test_workflow_run_upload_finds_pull_request_build() {
    let workspace = Workspace::new();
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("1", "0.01");
    let publisher = FakePublisher::new();

    run_with(
        &workspace.config(Mode::Build, "build-work"),
        pr_trigger(21, "400"),
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap();

    let payload = json!({
        "repository": {"full_name": "acme/site"},
        "workflow_run": {
            "event": "pull_request",
            "head_sha": "abc123",
            "head_repository": {"full_name": "acme/site"},
            "pull_requests": [{"number": 21}]
        }
    });
    let trigger = TriggerEvent::from_payload("workflow_run", &payload, "401").unwrap();
    let report = run_with(
        &workspace.config(Mode::Upload, "upload-work"),
        trigger,
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap();

    assert_eq!(report.artifact_identity.as_deref(), Some("build-21"));
    assert_eq!(report.status, Some(ContextStatus::Uploaded));
}

#[tokio::test]
async fn test_upload_without_build_bundle_fails() {
    let workspace = Workspace::new();
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("1", "0.01");
    let publisher = FakePublisher::new();

    let failure = run_with(
        &workspace.config(Mode::Upload, "upload-work"),
        pr_trigger(5, "500"),
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap_err();

    assert_eq!(failure.phase, Phase::Upload);
    assert!(matches!(
        failure.error,
        PipelineError::MissingBuildBundle { ref identity } if identity == "build-5"
    ));
    assert_eq!(ledger.status_calls(), 0);
}

#[tokio::test]
async fn test_upload_skips_expired_build_bundle() {
    let workspace = Workspace::new();
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("1", "0.01");
    let publisher = FakePublisher::new();

    run_with(
        &workspace.config(Mode::Build, "build-work"),
        pr_trigger(5, "500"),
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap();
    channel.expire("build-5");

    let failure = run_with(
        &workspace.config(Mode::Upload, "upload-work"),
        pr_trigger(5, "501"),
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        failure.error,
        PipelineError::MissingBuildBundle { .. }
    ));
}

#[tokio::test]
async fn test_missing_content_fails_build_phase() {
    let workspace = Workspace::new();
    let mut config = workspace.config(Mode::Build, "work");
    config.content_path = workspace.path("nope");

    let failure = run_with(
        &config,
        pr_trigger(5, "500"),
        &MemoryChannel::new(),
        &FakeLedger::new("1", "0.01"),
        &FakePublisher::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(failure.phase, Phase::Build);
    assert!(matches!(failure.error, PipelineError::Pack(_)));
}

#[tokio::test]
async fn test_identity_override_names_build_bundle() {
    let workspace = Workspace::new();
    let mut config = workspace.config(Mode::Build, "work");
    config.identity_override = Some("release-candidate".to_string());
    let channel = MemoryChannel::new();

    let report = run_with(
        &config,
        pr_trigger(5, "500"),
        &channel,
        &FakeLedger::new("1", "0.01"),
        &FakePublisher::new(),
    )
    .await
    .unwrap();
    assert_eq!(report.artifact_identity.as_deref(), Some("release-candidate"));
    assert_eq!(channel.names(), vec!["release-candidate".to_string()]);
}

#[test]
fn test_reuse_bundle_name_is_trigger_independent() {
    let hash = ContentHash::new("f00d");
    assert_eq!(reuse_identity(&hash), "reuse-f00d");
}

/// Build in one execution, then upload from a `workflow_run` payload in another.
async fn build_then_upload(
    build_trigger: TriggerEvent,
    upload_payload: serde_json::Value,
) -> (RunReport, Result<RunReport, pinrelay::error::PhaseFailure>) {
    let workspace = Workspace::new();
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("1", "0.01");
    let publisher = FakePublisher::new();

    let built = run_with(
        &workspace.config(Mode::Build, "build-work"),
        build_trigger,
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap();
    let trigger = TriggerEvent::from_payload("workflow_run", &upload_payload, "9999").unwrap();
    let uploaded = run_with(
        &workspace.config(Mode::Upload, "upload-work"),
        trigger,
        &channel,
        &ledger,
        &publisher,
    )
    .await;
    (built, uploaded)
}

#[tokio::test]
async fn test_push_build_is_found_by_workflow_run_upload() {
    let push = json!({
        "repository": {"full_name": "acme/site"},
        "head_commit": {"message": "Tweak footer"}
    });
    let (built, uploaded) = build_then_upload(
        TriggerEvent::from_payload("push", &push, "700").unwrap(),
        json!({
            "repository": {"full_name": "acme/site"},
            "workflow_run": {
                "id": 700,
                "event": "push",
                "head_repository": {"full_name": "acme/site"},
                "head_commit": {"message": "Tweak footer"}
            }
        }),
    )
    .await;

    assert_eq!(built.artifact_identity.as_deref(), Some("build-700"));
    let uploaded = uploaded.unwrap();
    assert_eq!(uploaded.artifact_identity.as_deref(), Some("build-700"));
    assert_eq!(uploaded.status, Some(ContextStatus::Uploaded));
}

#[tokio::test]
async fn test_push_with_open_pull_request_keeps_run_identity() {
    let push = json!({
        "repository": {"full_name": "acme/site"},
        "head_commit": {"message": "Fix typo"}
    });
    let (built, uploaded) = build_then_upload(
        TriggerEvent::from_payload("push", &push, "800").unwrap(),
        json!({
            "repository": {"full_name": "acme/site"},
            "workflow_run": {
                "id": 800,
                "event": "push",
                "head_repository": {"full_name": "acme/site"},
                "head_commit": {"message": "Fix typo"},
                "pull_requests": [{"number": 33}]
            }
        }),
    )
    .await;

    assert_eq!(built.artifact_identity.as_deref(), Some("build-800"));
    assert_eq!(
        uploaded.unwrap().artifact_identity.as_deref(),
        Some("build-800")
    );
}

#[tokio::test]
async fn test_upload_retries_interrupted_bundle_listing() {
    let workspace = Workspace::new();
    let channel = MemoryChannel::new();
    let ledger = FakeLedger::new("1", "0.01");
    let publisher = FakePublisher::new();

    run_with(
        &workspace.config(Mode::Build, "build-work"),
        pr_trigger(14, "900"),
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap();
    channel.fail_next_listings(1);

    let report = run_with(
        &workspace.config(Mode::Upload, "upload-work"),
        pr_trigger(14, "901"),
        &channel,
        &ledger,
        &publisher,
    )
    .await
    .unwrap();
    assert_eq!(report.status, Some(ContextStatus::Uploaded));
    assert_eq!(publisher.publish_count(), 1);
}
