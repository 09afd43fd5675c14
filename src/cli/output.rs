//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{PhaseFailure, PipelineError};

/// Map a phase failure to the message printed on stderr.
pub fn map_error(e: &PhaseFailure) -> String {
    match &e.error {
        PipelineError::CapExceeded { .. } => format!("{}\nNo payment was made.", e),
        PipelineError::MissingBuildBundle { .. } => {
            format!("{}\nNothing to upload for this trigger.", e)
        }
        _ => e.to_string(),
    }
}
