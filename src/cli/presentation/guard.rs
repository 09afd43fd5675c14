//! Payment guard dry-run presentation.

use crate::payment::{FundingDecision, FundingRequest};
use owo_colors::OwoColorize;
use crate::types::TokenAmount;
use serde_json::json;

fn or_none(value: Option<TokenAmount>) -> String {
    value.map_or_else(|| "none".to_string(), |v| v.to_string())
}

pub fn format_guard_text(request: &FundingRequest, decision: &FundingDecision) -> String {
    let verdict = if decision.rejected {
        "rejected".red().bold().to_string()
    } else if decision.needs_deposit() {
        "deposit".yellow().bold().to_string()
    } else {
        "funded".green().bold().to_string()
    };

    let mut output = format!("Decision: {}\n", verdict);
    output.push_str(&format!("Balance: {}\n", request.current_balance));
    output.push_str(&format!(
        "Target: {} days at {} per day\n",
        request.target_runway_days, request.runway_rate
    ));
    output.push_str(&format!(
        "Caps: balance {}, top-up {}\n",
        or_none(request.max_balance),
        or_none(request.max_top_up),
    ));
    output.push_str(&format!("Top-up: {}", decision.top_up));
    if let Some(reason) = &decision.reason {
        output.push_str(&format!("\nReason: {}", reason));
    }
    output
}

pub fn format_guard_json(
    request: &FundingRequest,
    decision: &FundingDecision,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&json!({
        "current_balance": request.current_balance,
        "target_runway_days": request.target_runway_days,
        "runway_rate": request.runway_rate,
        "max_balance": request.max_balance,
        "max_top_up": request.max_top_up,
        "decision": decision,
    }))
}
