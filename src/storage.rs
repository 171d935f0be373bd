use crate::config::CloudinaryConfig;
use crate::error::{Result, ScraperError};
use crate::traits::AssetStore;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::time::Duration;
use tracing::{debug, info};

/// Cloudinary Admin API (existence lookups) and Upload API (signed
/// uploads) for `image` resources.
pub struct CloudinaryStore {
    client: Client,
    config: CloudinaryConfig,
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl CloudinaryStore {
    pub fn new(config: &CloudinaryConfig) -> Result<Self> {
        if config.cloud_name.is_empty() || config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(ScraperError::invalid_config(
                "cloudinary credentials missing (CLOUDINARY_NAME, CLOUDINARY_API_KEY, CLOUDINARY_SECRET_KEY)",
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/v1_1/{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.cloud_name,
            path
        )
    }

    /// SHA-1 over the `k=v` pairs sorted by key and joined with `&`,
    /// followed by the API secret. Empty values are left out.
    pub fn sign(params: &[(&str, String)], api_secret: &str) -> String {
        let mut pairs: Vec<&(&str, String)> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        let to_sign = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha1::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(api_secret.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait::async_trait]
impl AssetStore for CloudinaryStore {
    async fn exists(&self, prefix: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.api_url("resources/image/upload"))
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .query(&[("prefix", prefix), ("max_results", "1")])
            .send()
            .await?
            .error_for_status()?;

        let list: ResourceList = response.json().await?;
        if let Some(first) = list.resources.first() {
            debug!("[CLOUDINARY] Prefix {} matched {}", prefix, first.public_id);
        }
        Ok(!list.resources.is_empty())
    }

    async fn upload(&self, bytes: Vec<u8>, folder: &str, public_id: &str) -> Result<String> {
        let params: Vec<(&'static str, String)> = vec![
            ("folder", folder.to_string()),
            ("public_id", public_id.to_string()),
            ("timestamp", Utc::now().timestamp().to_string()),
            ("unique_filename", "false".to_string()),
            ("use_filename", "true".to_string()),
        ];
        let signature = Self::sign(&params, &self.config.api_secret);

        let mut form = Form::new();
        for (key, value) in params {
            form = form.text(key, value);
        }
        let form = form
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .part("file", Part::bytes(bytes).file_name(public_id.to_string()));

        let response = self
            .client
            .post(self.api_url("image/upload"))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(ScraperError::publish(format!(
                "upload of {}/{} rejected: {}",
                folder, public_id, message
            )));
        }

        let uploaded: UploadResponse = response.json().await?;
        info!("[CLOUDINARY] Uploaded {}/{}", folder, public_id);
        Ok(uploaded.secure_url)
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}/image/upload/{}",
            self.config.delivery_base_url.trim_end_matches('/'),
            self.config.cloud_name,
            path
        )
    }
}
