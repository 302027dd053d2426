use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::{ClientConfig, is_http_url},
    error::ErrorKind,
    property::AssetRef,
};

pub mod in_memory_store;
pub mod pinning;

/// A file picked by the user, ready to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Blob {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("store responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed store response: {0}")]
    MalformedResponse(String),
}

/// Content-addressed blob storage.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload(&self, blob: &Blob) -> Result<AssetRef, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Upload of `{file_name}` failed: {cause}")]
pub struct UploadError {
    /// Position of the failing blob in the batch.
    pub index: usize,
    pub file_name: String,
    #[source]
    pub cause: StoreError,
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::UploadFailed
    }
}

pub struct AssetUploader {
    store: Arc<dyn AssetStore>,
    gateway_base_url: String,
}

impl AssetUploader {
    pub fn new(store: Arc<dyn AssetStore>, gateway_base_url: impl Into<String>) -> Self {
        Self {
            store,
            gateway_base_url: gateway_base_url.into(),
        }
    }

    pub fn from_config(store: Arc<dyn AssetStore>, config: &ClientConfig) -> Self {
        Self::new(store, config.asset_gateway_url.clone())
    }

    /// Single store call, never retried.
    pub async fn upload(&self, blob: &Blob) -> Result<AssetRef, UploadError> {
        self.upload_at(0, blob).await
    }

    /// Uploads every blob concurrently and returns identifiers in input order.
    ///
    /// The first failure fails the whole batch and drops the uploads still
    /// running; no partial list is ever returned.
    pub async fn upload_many(&self, blobs: &[Blob]) -> Result<Vec<AssetRef>, UploadError> {
        try_join_all(
            blobs
                .iter()
                .enumerate()
                .map(|(index, blob)| self.upload_at(index, blob)),
        )
        .await
    }

    async fn upload_at(&self, index: usize, blob: &Blob) -> Result<AssetRef, UploadError> {
        match self.store.upload(blob).await {
            Ok(asset) => {
                debug!(file = %blob.file_name, %asset, "asset uploaded");
                Ok(asset)
            }
            Err(cause) => {
                warn!(file = %blob.file_name, %cause, "asset upload failed");
                Err(UploadError {
                    index,
                    file_name: blob.file_name.clone(),
                    cause,
                })
            }
        }
    }

    /// Fetchable URL for an identifier.
    ///
    /// Older records stored full gateway URLs instead of identifiers; those
    /// are returned untouched.
    pub fn resolve(&self, asset: &AssetRef) -> String {
        let value = asset.as_str();
        if is_http_url(value) {
            return value.to_string();
        }
        let identifier = value.strip_prefix("ipfs://").unwrap_or(value);
        format!(
            "{}/{}",
            self.gateway_base_url.trim_end_matches('/'),
            identifier.trim_start_matches('/')
        )
    }
}
