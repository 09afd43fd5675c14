//! Directory-backed artifact channel.
//!
//! Layout: `<root>/<artifact_id>/meta.json` and `<root>/<artifact_id>/files/...`.
//! The directory is meant to be shared between executions by the CI
//! platform's own artifact upload/download steps or a mounted volume.

use crate::channel::bundle::safe_join;
use crate::channel::{
    ArtifactChannel, ArtifactEntry, ArtifactId, BundleFile, ListScope, RetentionHint,
};
use crate::error::ChannelError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const META_FILE: &str = "meta.json";
const FILES_DIR: &str = "files";

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactMeta {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Artifact channel stored in a local directory
#[derive(Debug, Clone)]
pub struct DirectoryChannel {
    root: PathBuf,
}

impl DirectoryChannel {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_meta(&self, artifact_dir: &Path) -> Option<ArtifactMeta> {
        let bytes = fs::read(artifact_dir.join(META_FILE)).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(dir = %artifact_dir.display(), error = %e, "Skipping artifact with unreadable metadata");
                None
            }
        }
    }

    /// Claim a fresh artifact directory; `create_dir` fails if it exists.
    fn claim_dir(&self, name: &str, created_at: DateTime<Utc>) -> Result<(String, PathBuf), ChannelError> {
        let name_hash = hex::encode(blake3::hash(name.as_bytes()).as_bytes());
        let name_tag = &name_hash[..8];
        for attempt in 0u32..64 {
            let id = format!(
                "{}-{}-{}",
                created_at.timestamp_millis(),
                name_tag,
                attempt
            );
            let dir = self.root.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ChannelError::Transport(format!(
            "could not allocate an artifact id for {}",
            name
        )))
    }
}

#[async_trait]
impl ArtifactChannel for DirectoryChannel {
    async fn publish(
        &self,
        name: &str,
        files: &[BundleFile],
        retention: RetentionHint,
    ) -> Result<ArtifactId, ChannelError> {
        fs::create_dir_all(&self.root)?;
        let created_at = Utc::now();
        let (id, dir) = self.claim_dir(name, created_at)?;

        let files_dir = dir.join(FILES_DIR);
        for file in files {
            let target = safe_join(&files_dir, &file.path)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &file.bytes)?;
        }

        // Metadata last: an artifact without meta.json is invisible to list.
        let meta = ArtifactMeta {
            id: id.clone(),
            name: name.to_string(),
            created_at,
            expires_at: created_at + Duration::days(i64::from(retention.days)),
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta)
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        fs::write(dir.join(META_FILE), meta_bytes)?;

        debug!(artifact = %name, id = %id, files = files.len(), "Artifact published");
        Ok(ArtifactId(id))
    }

    async fn list(&self, scope: &ListScope) -> Result<Vec<ArtifactEntry>, ChannelError> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let Some(meta) = self.read_meta(&dir_entry.path()) else {
                continue;
            };
            if meta.name != scope.name {
                continue;
            }
            entries.push(ArtifactEntry {
                id: ArtifactId(meta.id),
                name: meta.name,
                expired: now >= meta.expires_at,
                created_at: meta.created_at,
            });
        }
        Ok(entries)
    }

    async fn fetch(&self, id: &ArtifactId) -> Result<Vec<BundleFile>, ChannelError> {
        let dir = safe_join(&self.root, &id.0)?;
        let meta = self
            .read_meta(&dir)
            .ok_or_else(|| ChannelError::NotFound(id.to_string()))?;
        if Utc::now() >= meta.expires_at {
            return Err(ChannelError::NotFound(format!("{} (expired)", id)));
        }

        let files_dir = dir.join(FILES_DIR);
        let mut files = Vec::new();
        for entry in WalkDir::new(&files_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| ChannelError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&files_dir)
                .map_err(|e| ChannelError::Decode(e.to_string()))?;
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push(BundleFile::new(path, fs::read(entry.path())?));
        }
        Ok(files)
    }
}
