//! CI trigger events.
//!
//! Normalizes the event payload an execution was started with into the few
//! fields identity resolution and the trust check need. The build execution
//! usually sees the original event (`pull_request`, `push`); the upload
//! execution sees a `workflow_run` wrapper around it. Both normalize to the
//! same [`TriggerEvent`] shape.

use crate::context::{PullRequestInfo, TriggerKind};
use crate::error::PipelineError;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Normalized trigger of the current execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub kind: TriggerKind,
    /// Raw CI event name (`pull_request`, `workflow_run`, ...)
    pub event_name: String,
    /// Run that produced the content; for `workflow_run` the wrapped run
    pub run_id: String,
    pub pr: Option<PullRequestInfo>,
    pub commit_message: Option<String>,
    /// `owner/name` the content was built from
    pub head_repository: Option<String>,
    /// `owner/name` the pipeline (and its secrets) belongs to
    pub base_repository: Option<String>,
}

impl TriggerEvent {
    /// Trigger with no payload details, e.g. a manual or local run.
    pub fn bare(kind: TriggerKind, run_id: impl Into<String>) -> Self {
        let event_name = match kind {
            TriggerKind::PullRequest => "pull_request",
            TriggerKind::Push => "push",
            TriggerKind::Manual => "workflow_dispatch",
            TriggerKind::Scheduled => "schedule",
        };
        Self {
            kind,
            event_name: event_name.to_string(),
            run_id: run_id.into(),
            pr: None,
            commit_message: None,
            head_repository: None,
            base_repository: None,
        }
    }

    pub fn pr_number(&self) -> Option<u64> {
        self.pr.as_ref().map(|pr| pr.number)
    }

    /// Whether the content came from a repository other than the one running
    /// the pipeline. Unknown repositories are not treated as foreign.
    pub fn is_foreign_content(&self) -> bool {
        match (&self.head_repository, &self.base_repository) {
            (Some(head), Some(base)) => !head.eq_ignore_ascii_case(base),
            _ => false,
        }
    }

    /// Read and normalize the payload file the CI platform provides.
    pub fn load(
        event_name: &str,
        event_path: Option<&Path>,
        run_id: &str,
    ) -> Result<Self, PipelineError> {
        let payload = match event_path {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|e| {
                    PipelineError::Config(format!(
                        "Failed to read event payload {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                serde_json::from_slice(&bytes).map_err(|e| {
                    PipelineError::Config(format!(
                        "Failed to parse event payload {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
            None => Value::Null,
        };
        Self::from_payload(event_name, &payload, run_id)
    }

    /// Normalize an already-parsed payload.
    pub fn from_payload(
        event_name: &str,
        payload: &Value,
        run_id: &str,
    ) -> Result<Self, PipelineError> {
        let base_repository = str_at(payload, "/repository/full_name");
        let mut event = match event_name {
            "pull_request" | "pull_request_target" => {
                let mut event = Self::bare(TriggerKind::PullRequest, run_id);
                event.pr = pull_request_info(payload.get("pull_request"));
                event.head_repository = str_at(payload, "/pull_request/head/repo/full_name");
                event
            }
            "push" => {
                let mut event = Self::bare(TriggerKind::Push, run_id);
                event.commit_message = str_at(payload, "/head_commit/message");
                event.head_repository = base_repository.clone();
                event
            }
            "workflow_dispatch" => Self::bare(TriggerKind::Manual, run_id),
            "schedule" => Self::bare(TriggerKind::Scheduled, run_id),
            "workflow_run" => wrapped_event(payload, run_id)?,
            other => {
                return Err(PipelineError::Config(format!(
                    "Unsupported trigger event '{}'",
                    other
                )))
            }
        };
        event.event_name = event_name.to_string();
        event.base_repository = base_repository;
        debug!(
            event = %event.event_name,
            kind = %event.kind,
            pr = ?event.pr_number(),
            "Trigger normalized"
        );
        Ok(event)
    }
}

fn wrapped_event(payload: &Value, run_id: &str) -> Result<TriggerEvent, PipelineError> {
    let run = payload.get("workflow_run").ok_or_else(|| {
        PipelineError::Config("workflow_run event payload has no workflow_run object".to_string())
    })?;

    let inner = run.get("event").and_then(Value::as_str).unwrap_or_default();
    let kind = match inner {
        "pull_request" | "pull_request_target" => TriggerKind::PullRequest,
        "push" => TriggerKind::Push,
        "schedule" => TriggerKind::Scheduled,
        _ => TriggerKind::Manual,
    };

    // The wrapped run's id names the build bundle, not the id of this run.
    let build_run_id = match run.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        _ => run_id.to_string(),
    };

    let mut event = TriggerEvent::bare(kind, build_run_id);
    event.head_repository = str_at(run, "/head_repository/full_name");
    event.commit_message = str_at(run, "/head_commit/message");
    // `pull_requests` is also filled for pushes to a branch with an open PR;
    // the build of such a push saw no PR, so only PR runs may use it.
    if kind == TriggerKind::PullRequest {
        event.pr = run
            .get("pull_requests")
            .and_then(Value::as_array)
            .and_then(|prs| prs.first())
            .and_then(|pr| {
                let number = pr.get("number").and_then(Value::as_u64)?;
                Some(PullRequestInfo {
                    number,
                    commit_sha: str_at(pr, "/head/sha")
                        .or_else(|| str_at(run, "/head_sha"))
                        .unwrap_or_default(),
                    title: str_at(run, "/display_title").unwrap_or_default(),
                    author: str_at(run, "/actor/login").unwrap_or_default(),
                })
            });
    }
    Ok(event)
}

fn pull_request_info(pr: Option<&Value>) -> Option<PullRequestInfo> {
    let pr = pr?;
    Some(PullRequestInfo {
        number: pr.get("number").and_then(Value::as_u64)?,
        commit_sha: str_at(pr, "/head/sha").unwrap_or_default(),
        title: str_at(pr, "/title").unwrap_or_default(),
        author: str_at(pr, "/user/login").unwrap_or_default(),
    })
}

fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}
