//! Archive packing collaborator.
//!
//! [`DirectoryPacker`] copies the content tree into `<out_dir>/archive` and
//! derives the content hash from a sorted walk with BLAKE3:
//!
//! ```text
//! entry = hash("file" || path_len || path || content_hash)
//! root  = hash("archive" || entry_count || entry...)
//! ```
//!
//! Paths are relative and `/`-separated, so the hash depends on content and
//! layout only, never on where the checkout lives.

use crate::error::PackError;
use crate::types::ContentHash;
use blake3::Hasher;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Directory name of the packed archive inside the output directory.
pub const ARCHIVE_DIR_NAME: &str = "archive";

/// Result of packing content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedArchive {
    pub content_hash: ContentHash,
    pub archive_ref: PathBuf,
}

/// Turns a content path into an archive with a content-derived hash
pub trait ArchivePacker: Send + Sync {
    fn pack(&self, content_path: &Path, out_dir: &Path) -> Result<PackedArchive, PackError>;
}

/// Packs a file or directory tree by copying it and hashing it in sorted order
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryPacker;

impl DirectoryPacker {
    pub fn new() -> Self {
        Self
    }
}

fn hash_entry(relative_path: &str, content: &[u8]) -> [u8; 32] {
    let content_hash = blake3::hash(content);
    let path_bytes = relative_path.as_bytes();

    let mut hasher = Hasher::new();
    hasher.update(b"file");
    hasher.update(&(path_bytes.len() as u64).to_be_bytes());
    hasher.update(path_bytes);
    hasher.update(content_hash.as_bytes());
    *hasher.finalize().as_bytes()
}

fn hash_archive(entries: &[[u8; 32]]) -> ContentHash {
    let mut hasher = Hasher::new();
    hasher.update(b"archive");
    hasher.update(&(entries.len() as u64).to_be_bytes());
    for entry in entries {
        hasher.update(entry);
    }
    ContentHash::from_digest(hasher.finalize().as_bytes())
}

fn relative_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl ArchivePacker for DirectoryPacker {
    fn pack(&self, content_path: &Path, out_dir: &Path) -> Result<PackedArchive, PackError> {
        if !content_path.exists() {
            return Err(PackError::MissingContent(content_path.to_path_buf()));
        }
        let content_root = dunce::canonicalize(content_path)?;

        fs::create_dir_all(out_dir)?;
        let out_root = dunce::canonicalize(out_dir)?;
        let archive_dir = out_root.join(ARCHIVE_DIR_NAME);
        if content_root.starts_with(&archive_dir) {
            return Err(PackError::Overlap {
                content: content_root,
                out: out_root,
            });
        }
        if archive_dir.exists() {
            fs::remove_dir_all(&archive_dir)?;
        }
        fs::create_dir_all(&archive_dir)?;

        // A work dir nested in the content tree is never part of the archive.
        let skip_root = if out_root != content_root && out_root.starts_with(&content_root) {
            out_root.clone()
        } else {
            archive_dir.clone()
        };

        // A single file packs as an archive holding that one file.
        let single_name = if content_root.is_file() {
            let name = content_root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| PackError::MissingContent(content_path.to_path_buf()))?;
            Some(name)
        } else {
            None
        };

        let mut entries = Vec::new();
        let walker = WalkDir::new(&content_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.path().starts_with(&skip_root));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = match &single_name {
                Some(name) => name.clone(),
                None => relative_string(entry.path().strip_prefix(&content_root).map_err(|e| {
                    PackError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
                })?),
            };

            let bytes = fs::read(entry.path())?;
            entries.push(hash_entry(&relative, &bytes));

            let target = archive_dir.join(&relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &bytes)?;
        }

        if entries.is_empty() {
            return Err(PackError::EmptyContent(content_path.to_path_buf()));
        }

        let content_hash = hash_archive(&entries);
        debug!(files = entries.len(), "Content tree hashed");
        info!(content_hash = %content_hash, archive = %archive_dir.display(), "Content packed");
        Ok(PackedArchive {
            content_hash,
            archive_ref: archive_dir,
        })
    }
}
