//! Storage publisher collaborator: the paid publish.
//!
//! [`HttpStorageClient`] posts the archive manifest to a storage gateway at
//! `POST {endpoint}/uploads` and expects
//! `{"piece_id": .., "dataset_id": .., "provider": .., "preview_locator": ..}`.

use crate::context::PublishResult;
use crate::error::PublishError;
use crate::ledger::build_http_client;
use crate::types::ContentHash;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// One paid publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub content_hash: ContentHash,
    pub archive_ref: PathBuf,
    /// Preferred storage provider; `None` lets the network choose
    pub provider: Option<String>,
    pub with_cdn: bool,
}

/// Storage network operations used by the upload phase
#[async_trait]
pub trait StoragePublisher: Send + Sync {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishResult, PublishError>;

    /// Release any held session. Best effort; never fails.
    async fn release(&self);
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct ManifestEntry {
    path: String,
    size: u64,
}

#[derive(Debug, Serialize)]
struct UploadRequest<'a> {
    content_hash: &'a ContentHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<&'a str>,
    with_cdn: bool,
    files: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    piece_id: String,
    dataset_id: String,
    provider: String,
    #[serde(default)]
    preview_locator: Option<String>,
}

/// Sorted `(relative path, size)` listing of an archive directory.
fn archive_manifest(archive: &Path) -> Result<Vec<ManifestEntry>, PublishError> {
    let archive_err = |reason: String| PublishError::Archive {
        path: archive.to_path_buf(),
        reason,
    };
    if !archive.is_dir() {
        return Err(archive_err("not a directory".to_string()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(archive).sort_by_file_name() {
        let entry = entry.map_err(|e| archive_err(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(archive)
            .map_err(|e| archive_err(e.to_string()))?;
        let size = entry.metadata().map_err(|e| archive_err(e.to_string()))?.len();
        files.push(ManifestEntry {
            path: relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            size,
        });
    }
    Ok(files)
}

/// Storage gateway reached over HTTP
pub struct HttpStorageClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpStorageClient {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self, PublishError> {
        let client = build_http_client().map_err(PublishError::Request)?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl StoragePublisher for HttpStorageClient {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishResult, PublishError> {
        let body = UploadRequest {
            content_hash: &request.content_hash,
            provider: request.provider.as_deref(),
            with_cdn: request.with_cdn,
            files: archive_manifest(&request.archive_ref)?,
        };
        debug!(content_hash = %request.content_hash, files = body.files.len(), "Publishing archive");

        let url = format!("{}/uploads", self.endpoint);
        let mut http_request = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            http_request = http_request.header("Authorization", format!("Bearer {}", token));
        }
        let response = http_request
            .send()
            .await
            .map_err(|e| PublishError::Request(format!("HTTP error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(if status.is_client_error() {
                PublishError::Rejected(format!("{} - {}", status, error_text))
            } else {
                PublishError::Request(format!("Upload failed: {} - {}", status, error_text))
            });
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Request(format!("Failed to parse upload response: {}", e)))?;

        info!(piece_id = %upload.piece_id, provider = %upload.provider, "Archive published");
        Ok(PublishResult {
            content_hash: request.content_hash.clone(),
            piece_id: upload.piece_id,
            dataset_id: upload.dataset_id,
            provider: upload.provider,
            preview_locator: upload.preview_locator,
        })
    }

    async fn release(&self) {
        debug!(endpoint = %self.endpoint, "Storage session released");
    }
}
