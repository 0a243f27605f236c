use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ArchivalError, PDF_CONTENT_TYPE};
use crate::config::ArchiveConfig;
use crate::store::LazyCloudSession;

const STORAGE_BASE_URL: &str = "https://storage.googleapis.com";

/// Write-only object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), ArchivalError>;
}

/// Google Cloud Storage via the JSON API media upload. Shares credentials
/// with the document store.
pub struct GcsObjectStore {
    session: Arc<LazyCloudSession>,
    bucket: Option<String>,
    base_url: String,
}

impl GcsObjectStore {
    pub fn new(session: Arc<LazyCloudSession>, bucket: Option<String>) -> Self {
        Self {
            session,
            bucket,
            base_url: STORAGE_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), ArchivalError> {
        let session = self.session.get().await?;
        // Firebase projects default to `<project>.appspot.com`.
        let bucket = self
            .bucket
            .clone()
            .unwrap_or_else(|| format!("{}.appspot.com", session.project_id));
        let token = session.tokens.bearer().await?;

        let url = format!("{}/upload/storage/v1/b/{bucket}/o", self.base_url);
        let response = session
            .http
            .post(&url)
            .query(&[("uploadType", "media"), ("name", path)])
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| ArchivalError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArchivalError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(%bucket, path, bytes = bytes.len(), "Document archived");
        Ok(())
    }
}

/// Chooses the object path and uploads rendered documents.
pub struct Archiver {
    store: Arc<dyn ObjectStore>,
    fixed_path: Option<String>,
}

impl Archiver {
    pub fn new(store: Arc<dyn ObjectStore>, fixed_path: Option<String>) -> Self {
        Self { store, fixed_path }
    }

    pub fn from_config(config: &ArchiveConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self::new(store, config.fixed_path.clone())
    }

    /// Configured path, else `summaries/<epoch millis>.pdf`.
    pub fn archive_path(&self, now: DateTime<Utc>) -> String {
        self.fixed_path
            .clone()
            .unwrap_or_else(|| format!("summaries/{}.pdf", now.timestamp_millis()))
    }

    /// Upload `bytes`, returning the path written.
    pub async fn archive(&self, bytes: &[u8], now: DateTime<Utc>) -> Result<String, ArchivalError> {
        let path = self.archive_path(now);
        self.store.put(&path, bytes, PDF_CONTENT_TYPE).await?;
        Ok(path)
    }
}

#[cfg(test)]
pub use mock::MockObjectStore;
