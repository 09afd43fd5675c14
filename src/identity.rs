//! Artifact identity resolution.
//!
//! Build and upload executions never talk to each other, yet must name the
//! build bundle identically. Both call [`resolve_identity`] on their own
//! trigger; the fixed precedence below makes the answers agree.
//!
//! Precedence, highest first:
//! 1. a non-empty manual override, verbatim
//! 2. a PR number carried by the trigger -> `build-{N}`
//! 3. a push whose commit message references a merged PR -> `build-{N}`
//! 4. `build-{RUN_ID}`

use crate::trigger::TriggerEvent;
use crate::types::ContentHash;
use regex::Regex;
use std::sync::OnceLock;

const BUILD_PREFIX: &str = "build-";
const REUSE_PREFIX: &str = "reuse-";

fn merge_commit_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // "Merge pull request #123 from owner/branch"
            Regex::new(r"Merge pull request #(\d+)").expect("static pattern"),
            // Squash merges: "Subject line (#123)"
            Regex::new(r"(?m)\A[^\n]*\(#(\d+)\)\s*$").expect("static pattern"),
        ]
    })
}

/// PR number referenced by a merge or squash-merge commit message.
pub fn merged_pr_number(commit_message: &str) -> Option<u64> {
    merge_commit_patterns().iter().find_map(|pattern| {
        pattern
            .captures(commit_message)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

/// Name of the build bundle for this execution.
pub fn resolve_identity(trigger: &TriggerEvent, manual_override: Option<&str>) -> String {
    if let Some(name) = manual_override.map(str::trim).filter(|s| !s.is_empty()) {
        return name.to_string();
    }
    if let Some(number) = trigger.pr_number() {
        return build_identity(number);
    }
    if let Some(number) = trigger.commit_message.as_deref().and_then(merged_pr_number) {
        return build_identity(number);
    }
    format!("{}{}", BUILD_PREFIX, trigger.run_id)
}

fn build_identity(pr_number: u64) -> String {
    format!("{}{}", BUILD_PREFIX, pr_number)
}

/// Name of the long-lived reuse bundle for `hash`. Independent of trigger.
pub fn reuse_identity(hash: &ContentHash) -> String {
    format!("{}{}", REUSE_PREFIX, hash)
}
