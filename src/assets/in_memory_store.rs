use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::property::AssetRef;

use super::{AssetStore, Blob, StoreError};

/// Keeps uploaded blobs in memory, addressed by the SHA-256 of their bytes.
#[derive(Default)]
pub struct InMemoryAssetStore {
    blobs: Mutex<HashMap<AssetRef, Vec<u8>>>,
    failing_files: Mutex<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryAssetStore {
    /// Uploads of a file with this name fail.
    pub fn fail_file(&self, file_name: impl Into<String>) {
        self.failing_files.lock().insert(file_name.into());
    }

    /// Every upload sleeps for `latency` before completing.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn get(&self, asset: &AssetRef) -> Option<Vec<u8>> {
        self.blobs.lock().get(asset).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn upload(&self, blob: &Blob) -> Result<AssetRef, StoreError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing_files.lock().contains(&blob.file_name) {
            return Err(StoreError::Status {
                status: 503,
                body: "pinning service unavailable".to_string(),
            });
        }
        let digest = Sha256::digest(&blob.bytes);
        let asset = AssetRef::new(format!("sha256-{}", hex::encode(digest)));
        self.blobs.lock().insert(asset.clone(), blob.bytes.clone());
        Ok(asset)
    }
}
