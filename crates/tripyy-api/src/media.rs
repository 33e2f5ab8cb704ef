//! Cloudinary image gateway: signed uploads, best-effort deletion.

use std::time::Duration;

use chrono::Utc;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{debug, warn};

/// 10 MiB per image; in-memory buffering is fine within that.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("image hosting is not configured")]
    NotConfigured,

    #[error("image upload failed: {0}")]
    UploadFailed(String),
}

#[derive(Debug, Clone)]
struct CloudinaryConfig {
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

pub struct MediaGateway {
    client: reqwest::Client,
    config: Option<CloudinaryConfig>,
}

pub struct UploadedImage {
    pub url: String,
    pub public_id: String,
}

impl MediaGateway {
    pub fn new(
        cloud_name: Option<String>,
        api_key: Option<String>,
        api_secret: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        let config = match (cloud_name, api_key, api_secret) {
            (Some(cloud_name), Some(api_key), Some(api_secret))
                if !cloud_name.is_empty() && !api_key.is_empty() && !api_secret.is_empty() =>
            {
                Some(CloudinaryConfig {
                    cloud_name,
                    api_key,
                    api_secret,
                })
            }
            _ => None,
        };
        Self { client, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Upload image bytes into `folder`, returning the delivery URL and
    /// public id.
    pub async fn upload(&self, bytes: Vec<u8>, folder: &str) -> Result<UploadedImage, MediaError> {
        let config = self.config.as_ref().ok_or(MediaError::NotConfigured)?;

        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign(
            &format!("folder={folder}&timestamp={timestamp}"),
            &config.api_secret,
        );

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name("upload"))
            .text("folder", folder.to_string())
            .text("timestamp", timestamp)
            .text("api_key", config.api_key.clone())
            .text("signature", signature);

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            config.cloud_name
        );
        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| MediaError::UploadFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(MediaError::UploadFailed(format!("{status}: {detail}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MediaError::UploadFailed(e.to_string()))?;

        let url = body["secure_url"]
            .as_str()
            .ok_or_else(|| MediaError::UploadFailed("no secure_url in response".into()))?
            .to_string();
        let public_id = body["public_id"].as_str().unwrap_or_default().to_string();

        Ok(UploadedImage { url, public_id })
    }

    /// Best-effort deletion; never fails the caller.
    pub async fn destroy(&self, public_id: &str) {
        let Some(config) = &self.config else { return };

        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign(
            &format!("public_id={public_id}&timestamp={timestamp}"),
            &config.api_secret,
        );

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/destroy",
            config.cloud_name
        );
        let result = self
            .client
            .post(&url)
            .form(&[
                ("public_id", public_id),
                ("timestamp", &timestamp),
                ("api_key", &config.api_key),
                ("signature", &signature),
            ])
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(public_id, "deleted old image");
            }
            Ok(resp) => warn!(public_id, status = %resp.status(), "image deletion rejected"),
            Err(e) => warn!(public_id, "image deletion failed: {}", e),
        }
    }
}

fn sign(params: &str, api_secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(params.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Pull the public id out of a Cloudinary delivery URL, e.g.
/// `https://res.cloudinary.com/demo/image/upload/v123/tripyy/abc.jpg`
/// → `tripyy/abc`. Best-effort: URLs that don't match the expected
/// pattern return `None` (the blob leaks, but that is observable in the
/// caller's warn log).
pub fn extract_public_id(url: &str) -> Option<String> {
    let (_, after) = url.split_once("/upload/")?;
    let mut segments: Vec<&str> = after.split('/').collect();
    // Drop the version segment (v<digits>) when present
    if segments
        .first()
        .is_some_and(|s| s.starts_with('v') && s[1..].chars().all(|c| c.is_ascii_digit()) && s.len() > 1)
    {
        segments.remove(0);
    }
    if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    let joined = segments.join("/");
    let public_id = joined
        .rsplit_once('.')
        .map(|(stem, _ext)| stem.to_string())
        .unwrap_or(joined);
    if public_id.is_empty() {
        None
    } else {
        Some(public_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_gateway_refuses_upload() {
        let gateway = MediaGateway::new(None, None, None);
        assert!(!gateway.is_configured());
    }

    #[test]
    fn blank_credentials_count_as_unconfigured() {
        let gateway = MediaGateway::new(
            Some("demo".into()),
            Some(String::new()),
            Some("secret".into()),
        );
        assert!(!gateway.is_configured());
    }

    #[test]
    fn public_id_extraction() {
        assert_eq!(
            extract_public_id("https://res.cloudinary.com/demo/image/upload/v1712/tripyy/abc.jpg"),
            Some("tripyy/abc".to_string())
        );
        assert_eq!(
            extract_public_id("https://res.cloudinary.com/demo/image/upload/tripyy/abc.png"),
            Some("tripyy/abc".to_string())
        );
        // No extension
        assert_eq!(
            extract_public_id("https://res.cloudinary.com/demo/image/upload/v1/tripyy/abc"),
            Some("tripyy/abc".to_string())
        );
        // Not a cloudinary delivery URL
        assert_eq!(extract_public_id("https://example.com/image.jpg"), None);
        assert_eq!(extract_public_id(""), None);
    }

    #[test]
    fn signature_is_hex_sha1() {
        let sig = sign("folder=tripyy&timestamp=1712000000", "secret");
        assert_eq!(sig.len(), 40);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
