//! Bundle layout: `context.json` plus optional `archive/...` files.

use crate::channel::BundleFile;
use crate::context::{decode_record, CombinedContext, ContextStore, CONTEXT_FILE_NAME};
use crate::error::{ChannelError, ContextError};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const ARCHIVE_PREFIX: &str = "archive/";

/// Context record plus the archive files travelling with it
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub context: CombinedContext,
    pub archive: Vec<BundleFile>,
}

impl Bundle {
    /// Bundle carrying only the context record (reuse bundles).
    pub fn context_only(context: CombinedContext) -> Self {
        Self {
            context,
            archive: Vec::new(),
        }
    }

    /// Bundle carrying the context and every file under `archive_dir`.
    pub fn with_archive_dir(
        context: CombinedContext,
        archive_dir: &Path,
    ) -> Result<Self, ChannelError> {
        let mut archive = Vec::new();
        for entry in WalkDir::new(archive_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| ChannelError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(archive_dir)
                .map_err(|e| ChannelError::Decode(e.to_string()))?;
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            archive.push(BundleFile::new(path, fs::read(entry.path())?));
        }
        Ok(Self { context, archive })
    }

    /// Flatten into channel files.
    pub fn to_files(&self) -> Result<Vec<BundleFile>, ContextError> {
        let mut files = Vec::with_capacity(self.archive.len() + 1);
        files.push(BundleFile::new(
            CONTEXT_FILE_NAME,
            ContextStore::encode(&self.context)?,
        ));
        for file in &self.archive {
            files.push(BundleFile::new(
                format!("{}{}", ARCHIVE_PREFIX, file.path),
                file.bytes.clone(),
            ));
        }
        Ok(files)
    }

    /// Rebuild from channel files. A bundle without a readable context is
    /// undecodable.
    pub fn from_files(files: Vec<BundleFile>) -> Result<Self, ChannelError> {
        let mut context = None;
        let mut archive = Vec::new();
        for file in files {
            if file.path == CONTEXT_FILE_NAME {
                let record = decode_record(&file.bytes)
                    .map_err(|e| ChannelError::Decode(format!("{}: {}", CONTEXT_FILE_NAME, e)))?;
                context = Some(record);
            } else if let Some(path) = file.path.strip_prefix(ARCHIVE_PREFIX) {
                archive.push(BundleFile::new(path, file.bytes));
            }
        }
        let context = context.ok_or_else(|| {
            ChannelError::Decode(format!("bundle has no {}", CONTEXT_FILE_NAME))
        })?;
        Ok(Self { context, archive })
    }

    /// Write the archive files under `dest`, returning `dest`.
    pub fn materialize_archive(&self, dest: &Path) -> Result<PathBuf, ChannelError> {
        fs::create_dir_all(dest)?;
        for file in &self.archive {
            let target = safe_join(dest, &file.path)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &file.bytes)?;
        }
        Ok(dest.to_path_buf())
    }
}

/// Join a bundle-relative path onto `root`, refusing anything that escapes it.
pub(crate) fn safe_join(root: &Path, relative: &str) -> Result<PathBuf, ChannelError> {
    let relative = Path::new(relative);
    let escapes = relative.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes || relative.as_os_str().is_empty() {
        return Err(ChannelError::Decode(format!(
            "refusing bundle path {:?}",
            relative
        )));
    }
    Ok(root.join(relative))
}
