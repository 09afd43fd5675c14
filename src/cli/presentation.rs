//! CLI presentation: text and json formatters per command family.

mod context;
mod guard;
mod report;

pub use context::{format_context_json, format_context_text};
pub use guard::{format_guard_json, format_guard_text};
pub use report::{format_report_json, format_report_text, styled_status};
