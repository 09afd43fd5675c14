//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; single route table dispatches to domain services.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, ContextCommands, EventArgs, GuardArgs, RunArgs};
pub use presentation::{
    format_context_json, format_context_text, format_guard_json, format_guard_text,
    format_report_json, format_report_text,
};
pub use route::RunContext;
