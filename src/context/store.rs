//! File-backed context store.
//!
//! One JSON record per working area. `merge` is the only mutation path:
//! load, apply the patch, persist atomically, return the new record.

use crate::context::legacy::decode_record;
use crate::context::patch::ContextPatch;
use crate::context::types::CombinedContext;
use crate::error::ContextError;
use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// File name of the context record inside a working area or bundle.
pub const CONTEXT_FILE_NAME: &str = "context.json";

/// Durable store for the [`CombinedContext`] of one working area
#[derive(Debug, Clone)]
pub struct ContextStore {
    path: PathBuf,
}

impl ContextStore {
    /// Store backed by an explicit file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<work_dir>/context.json`
    pub fn in_dir(work_dir: &Path) -> Self {
        Self::new(work_dir.join(CONTEXT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored record.
    ///
    /// Never fails: a missing file is an empty record, and so is an unreadable
    /// or unparsable one (logged loudly, since prior state is lost).
    pub fn load(&self) -> CombinedContext {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No context record yet; starting empty");
                return CombinedContext::default();
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Context record unreadable; continuing with an empty record"
                );
                return CombinedContext::default();
            }
        };

        match decode_record(&bytes) {
            Ok(record) => record,
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Context record corrupted; prior state is discarded and an empty record is used"
                );
                CombinedContext::default()
            }
        }
    }

    /// Apply `patch` to the stored record and persist the result.
    pub fn merge(&self, patch: ContextPatch) -> Result<CombinedContext, ContextError> {
        let current = self.load();
        let mut next = patch.apply(&current)?;
        next.updated_at = Some(Utc::now());
        self.save(&next)?;
        debug!(path = %self.path.display(), status = ?next.status, "Context merged");
        Ok(next)
    }

    /// Merge a full record received from another execution.
    ///
    /// A status that would move the stored record backwards is dropped rather
    /// than rejected: the stored record already went further.
    pub fn import(&self, record: &CombinedContext) -> Result<CombinedContext, ContextError> {
        let current = self.load();
        let mut patch = ContextPatch::from_record(record);
        if let Some(status) = patch.status {
            if !status.may_follow(current.status) {
                debug!(
                    stored = ?current.status,
                    incoming = %status,
                    "Ignoring older status from imported record"
                );
                patch.status = None;
            }
        }
        self.merge(patch)
    }

    /// Start a fresh record lineage.
    pub fn reset(&self) -> Result<(), ContextError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ContextError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Serialize the record to the bytes stored on disk and in bundles.
    pub fn encode(record: &CombinedContext) -> Result<Vec<u8>, ContextError> {
        Ok(serde_json::to_vec_pretty(record)?)
    }

    /// Write atomically: temporary file then rename.
    fn save(&self, record: &CombinedContext) -> Result<(), ContextError> {
        let io_err = |source| ContextError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let bytes = Self::encode(record)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &bytes).map_err(io_err)?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            io_err(e)
        })
    }
}
