// src/fetcher.rs
// Content fetching via the object storage HTTP API: signed-URL issuance
// followed by a plain GET of the returned URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Validity of an issued signed URL, in seconds.
pub const SIGNED_URL_TTL_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Signed URL request failed: {0}")]
    SignUrl(String),
    #[error("Download failed: {0}")]
    Download(String),
}

/// Object storage client. Both operations are fatal for the whole document
/// on failure; there is no retry.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Requests a time-limited signed URL for `path` inside `bucket`.
    async fn sign_url(&self, bucket: &str, path: &str) -> Result<String, StorageError>;

    /// Downloads the object behind a (signed) URL as raw bytes.
    async fn download(&self, url: &str) -> Result<Vec<u8>, StorageError>;
}

/// Signs then downloads in one step.
pub async fn fetch_object(
    storage: &dyn StorageClient,
    bucket: &str,
    path: &str,
) -> Result<Vec<u8>, StorageError> {
    let url = storage.sign_url(bucket, path).await?;
    debug!(bucket, path, "Downloading via signed URL");
    storage.download(&url).await
}

#[derive(Serialize)]
struct SignRequest {
    #[serde(rename = "expiresIn")]
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// Storage client over the REST object API.
pub struct HttpStorageClient {
    base_url: String,
    service_key: String,
    client: reqwest::Client,
}

impl HttpStorageClient {
    pub fn new(base_url: String, service_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn sign_url(&self, bucket: &str, path: &str) -> Result<String, StorageError> {
        let url = format!("{}/object/sign/{}/{}", self.base_url, bucket, path);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .json(&SignRequest {
                expires_in: SIGNED_URL_TTL_SECS,
            })
            .send()
            .await
            .map_err(|e| StorageError::SignUrl(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StorageError::SignUrl(format!(
                "storage returned {} for {}/{}",
                resp.status(),
                bucket,
                path
            )));
        }

        let body: SignResponse = resp
            .json()
            .await
            .map_err(|e| StorageError::SignUrl(e.to_string()))?;

        // The API returns a path relative to the storage base.
        if body.signed_url.starts_with("http") {
            Ok(body.signed_url)
        } else {
            Ok(format!("{}{}", self.base_url, body.signed_url))
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StorageError::Download(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StorageError::Download(format!(
                "download returned {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StorageError::Download(e.to_string()))?;
        debug!(bytes = bytes.len(), "Object downloaded");
        Ok(bytes.to_vec())
    }
}
