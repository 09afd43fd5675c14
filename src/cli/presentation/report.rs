//! Run report presentation.

use crate::context::ContextStatus;
use crate::report::RunReport;
use comfy_table::{presets::UTF8_BORDERS_ONLY, Table};
use owo_colors::OwoColorize;

/// Status text colored by outcome.
pub fn styled_status(status: Option<ContextStatus>) -> String {
    match status {
        Some(ContextStatus::Uploaded) => "uploaded".green().bold().to_string(),
        Some(s @ (ContextStatus::ReusedCache | ContextStatus::ReusedArtifact)) => {
            s.as_str().cyan().bold().to_string()
        }
        Some(ContextStatus::BuildOnly) => "build-only".yellow().to_string(),
        Some(ContextStatus::Blocked) => "blocked".red().bold().to_string(),
        None => "-".dimmed().to_string(),
    }
}

pub fn format_report_text(report: &RunReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Field", "Value"]);

    let dash = || "-".to_string();
    table.add_row(vec!["Mode".to_string(), report.mode.to_string()]);
    table.add_row(vec![
        "Identity".to_string(),
        report.artifact_identity.clone().unwrap_or_else(dash),
    ]);
    table.add_row(vec![
        "Content hash".to_string(),
        report
            .content_hash
            .as_ref()
            .map(|h| h.to_string())
            .unwrap_or_else(dash),
    ]);
    table.add_row(vec!["Status".to_string(), styled_status(report.status)]);
    if let Some(source) = report.reuse_source {
        table.add_row(vec!["Reuse source".to_string(), source.to_string()]);
    }
    if let Some(result) = &report.publish_result {
        table.add_row(vec!["Piece".to_string(), result.piece_id.clone()]);
        table.add_row(vec!["Dataset".to_string(), result.dataset_id.clone()]);
        table.add_row(vec!["Provider".to_string(), result.provider.clone()]);
        if let Some(preview) = &result.preview_locator {
            table.add_row(vec!["Preview".to_string(), preview.clone()]);
        }
    }
    if let Some(balance) = report.balance {
        table.add_row(vec!["Deposited".to_string(), report.deposited.to_string()]);
        table.add_row(vec!["Balance".to_string(), balance.to_string()]);
        table.add_row(vec![
            "Runway".to_string(),
            report
                .runway_days
                .map(|d| format!("{} days", d))
                .unwrap_or_else(|| "unbounded".to_string()),
        ]);
    }
    if let Some(reason) = &report.block_reason {
        table.add_row(vec!["Blocked".to_string(), reason.clone()]);
    }
    table.to_string()
}

pub fn format_report_json(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
