//! PDF artifact storage collaborator
//!
//! Generated invoices are persisted to an object-storage bucket so they can
//! be re-downloaded later. Storage is best-effort from the job handler's
//! point of view: on failure the caller falls back to the in-memory PDF.

use async_trait::async_trait;

use crate::config::DeliveryConfig;
use crate::error::{SettlementError, SettlementResult};

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist PDF bytes under `key`; returns the public URL.
    async fn put_pdf(&self, key: &str, bytes: &[u8]) -> SettlementResult<String>;
}

/// Object-storage bucket client.
#[derive(Clone)]
pub struct BucketStore {
    http: reqwest::Client,
    base_url: String,
    token: String,
    bucket: String,
}

impl BucketStore {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.storage_url.clone(),
            token: config.storage_token.clone(),
            bucket: config.storage_bucket.clone(),
        }
    }
}

#[async_trait]
impl ArtifactStore for BucketStore {
    async fn put_pdf(&self, key: &str, bytes: &[u8]) -> SettlementResult<String> {
        let url = format!("{}/object/{}/{key}", self.base_url, self.bucket);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(bytes.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SettlementError::Collaborator(format!(
                "storage returned HTTP {} for '{key}'",
                response.status()
            )));
        }

        Ok(format!(
            "{}/object/public/{}/{key}",
            self.base_url, self.bucket
        ))
    }
}
