//! Product image hosting.
//!
//! Images are not stored locally; they are forwarded to a Cloudinary-compatible
//! host with a signed upload request and referenced by URL + public id.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::MediaConfig;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Image hosting is not configured")]
    NotConfigured,

    #[error("Image host request failed: {0}")]
    Request(String),

    #[error("Image host rejected the upload ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected response from image host: {0}")]
    InvalidResponse(String),
}

/// A file received from a client, ready to forward
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub filename: String,
    pub content_type: Option<String>,
}

/// What the host reports back about a stored image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub secure_url: String,
    pub public_id: String,
    pub bytes: u64,
    pub format: String,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, image: ImageUpload) -> Result<UploadedImage, MediaError>;
}

pub fn from_config(config: &MediaConfig) -> Arc<dyn ImageHost> {
    match CloudinaryHost::from_config(config) {
        Some(host) => Arc::new(host),
        None => {
            tracing::warn!("Image host not configured, uploads are disabled");
            Arc::new(DisabledImageHost)
        }
    }
}

pub struct DisabledImageHost;

#[async_trait]
impl ImageHost for DisabledImageHost {
    async fn upload(&self, _image: ImageUpload) -> Result<UploadedImage, MediaError> {
        Err(MediaError::NotConfigured)
    }
}

pub struct CloudinaryHost {
    client: reqwest::Client,
    base_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

#[derive(Deserialize)]
struct HostErrorBody {
    error: HostErrorMessage,
}

#[derive(Deserialize)]
struct HostErrorMessage {
    message: String,
}

impl CloudinaryHost {
    pub fn from_config(config: &MediaConfig) -> Option<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("lustre/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Some(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cloud_name: config.cloud_name.clone()?,
            api_key: config.api_key.clone()?,
            api_secret: config.api_secret.clone()?,
            folder: config.folder.clone(),
        })
    }

    fn upload_url(&self) -> String {
        format!("{}/{}/image/upload", self.base_url, self.cloud_name)
    }

    /// Parameters covered by the request signature
    fn signed_params(&self, timestamp: i64) -> Vec<(&'static str, String)> {
        vec![
            ("folder", self.folder.clone()),
            ("overwrite", "false".to_string()),
            ("timestamp", timestamp.to_string()),
            ("unique_filename", "true".to_string()),
            ("use_filename", "true".to_string()),
        ]
    }
}

/// SHA-256 request signature: parameters sorted by name, joined as `k=v&k=v`,
/// with the API secret appended, hex encoded.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, image: ImageUpload) -> Result<UploadedImage, MediaError> {
        let timestamp = chrono::Utc::now().timestamp();
        let params = self.signed_params(timestamp);
        let signature = sign_params(&params, &self.api_secret);

        let mut part = Part::bytes(image.data).file_name(image.filename.clone());
        if let Some(content_type) = image.content_type.as_deref() {
            part = part
                .mime_str(content_type)
                .map_err(|e| MediaError::Request(e.to_string()))?;
        }

        let mut form = Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in params {
            form = form.text(key, value);
        }

        let response = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| MediaError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<HostErrorBody>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(MediaError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let uploaded: UploadedImage = response
            .json()
            .await
            .map_err(|e| MediaError::InvalidResponse(e.to_string()))?;

        tracing::info!(
            public_id = %uploaded.public_id,
            bytes = uploaded.bytes,
            filename = %image.filename,
            "Image uploaded"
        );
        Ok(uploaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> MediaConfig {
        MediaConfig {
            cloud_name: Some("demo".to_string()),
            api_key: Some("key".to_string()),
            api_secret: Some("secret".to_string()),
            ..MediaConfig::default()
        }
    }

    #[test]
    fn test_signature_is_order_independent() {
        let a = sign_params(
            &[("timestamp", "1700000000".to_string()), ("folder", "x".to_string())],
            "secret",
        );
        let b = sign_params(
            &[("folder", "x".to_string()), ("timestamp", "1700000000".to_string())],
            "secret",
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut hasher = Sha256::new();
        hasher.update(b"folder=x&timestamp=1700000000secret");
        assert_eq!(a, hex::encode(hasher.finalize()));
    }

    #[test]
    fn test_signature_depends_on_secret() {
        let params = [("folder", "x".to_string())];
        assert_ne!(sign_params(&params, "one"), sign_params(&params, "two"));
    }

    #[test]
    fn test_host_requires_credentials() {
        assert!(CloudinaryHost::from_config(&MediaConfig::default()).is_none());

        let host = CloudinaryHost::from_config(&configured()).unwrap();
        assert_eq!(
            host.upload_url(),
            "https://api.cloudinary.com/v1_1/demo/image/upload"
        );
        let params = host.signed_params(1);
        assert!(params.contains(&("overwrite", "false".to_string())));
        assert!(params.contains(&("folder", "lustre-jewels".to_string())));
    }

    #[tokio::test]
    async fn test_disabled_host() {
        let host = from_config(&MediaConfig::default());
        let err = host
            .upload(ImageUpload {
                data: vec![1, 2, 3],
                filename: "ring.jpg".to_string(),
                content_type: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NotConfigured));
    }
}
