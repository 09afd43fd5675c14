//! Context record presentation: text and json formatters.

use crate::cli::presentation::report::styled_status;
use crate::context::CombinedContext;
use std::path::Path;

pub fn format_context_text(record: &CombinedContext, path: &Path) -> String {
    if record.is_empty() {
        return format!("No context record at {}", path.display());
    }

    let mut output = format!("Record: {}\n", path.display());
    let mut line = |label: &str, value: Option<String>| {
        if let Some(value) = value {
            output.push_str(&format!("{:<16}{}\n", format!("{}:", label), value));
        }
    };
    line("Identity", record.artifact_identity.clone());
    line("Content hash", record.content_hash.as_ref().map(|h| h.to_string()));
    line("Status", Some(styled_status(record.status)));
    line("Run", record.producing_run_id.clone());
    line("Trigger", record.trigger_kind.map(|k| k.to_string()));
    line(
        "Pull request",
        record.pr.as_ref().map(|pr| format!("#{} {}", pr.number, pr.title)),
    );
    line("Archive", record.archive_ref.as_ref().map(|p| p.display().to_string()));
    if let Some(result) = &record.publish_result {
        line("Piece", Some(result.piece_id.clone()));
        line("Dataset", Some(result.dataset_id.clone()));
        line("Provider", Some(result.provider.clone()));
        line("Preview", result.preview_locator.clone());
    }
    if let Some(snapshot) = &record.payment_snapshot {
        line("Balance", Some(snapshot.balance.to_string()));
        line("Deposited", Some(snapshot.deposited_this_run.to_string()));
    }
    line("Blocked", record.block_reason.clone());
    line("Updated", record.updated_at.map(|t| t.to_rfc3339()));
    output.trim_end().to_string()
}

pub fn format_context_json(record: &CombinedContext) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(record)
}
