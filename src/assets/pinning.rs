use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{config::ClientConfig, property::AssetRef};

use super::{AssetStore, Blob, StoreError};

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

fn parse_pin_response(body: &str) -> Result<AssetRef, StoreError> {
    let reply: PinResponse =
        serde_json::from_str(body).map_err(|err| StoreError::MalformedResponse(err.to_string()))?;
    if reply.ipfs_hash.trim().is_empty() {
        return Err(StoreError::MalformedResponse("empty IpfsHash".to_string()));
    }
    Ok(AssetRef::new(reply.ipfs_hash))
}

/// Pins files through a Pinata-compatible HTTP API.
pub struct PinningStore {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    secret_api_key: String,
}

impl PinningStore {
    pub fn new(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            http,
            endpoint: config.pinning_endpoint.clone(),
            api_key: config.pinning_api_key.clone(),
            secret_api_key: config.pinning_secret_api_key.clone(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(reqwest::Client::new(), config)
    }
}

#[async_trait]
impl AssetStore for PinningStore {
    #[instrument(skip_all, fields(file = %blob.file_name, size = blob.bytes.len()))]
    async fn upload(&self, blob: &Blob) -> Result<AssetRef, StoreError> {
        let part = Part::bytes(blob.bytes.clone())
            .file_name(blob.file_name.clone())
            .mime_str(&blob.content_type)
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(&self.endpoint)
            .header("pinata_api_key", &self.api_key)
            .header("pinata_secret_api_key", &self.secret_api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let asset = parse_pin_response(&body)?;
        debug!(%asset, "file pinned");
        Ok(asset)
    }
}
