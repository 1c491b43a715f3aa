use crate::{
    config::StorageConfig,
    error::{PipelineError, Result},
    models::{MetadataToken, StoredObject},
    storage::traits::ObjectStorage,
};
use async_trait::async_trait;
use reqwest::{header, Client, Url};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// Refresh metadata tokens this long before they expire.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

enum TokenSource {
    Static(String),
    Metadata {
        url: String,
        cache: Mutex<Option<CachedToken>>,
    },
}

/// Google Cloud Storage through the JSON API.
pub struct GcsStorage {
    client: Client,
    bucket: String,
    endpoint: Url,
    token: TokenSource,
}

impl GcsStorage {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let bucket = config
            .bucket
            .clone()
            .filter(|bucket| !bucket.is_empty())
            .ok_or_else(|| PipelineError::ConfigError("BUCKET is required".into()))?;

        let endpoint = Url::parse(&config.gcs_endpoint).map_err(|e| {
            PipelineError::ConfigError(format!("invalid GCS endpoint {}: {}", config.gcs_endpoint, e))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(PipelineError::ConfigError(format!(
                "invalid GCS endpoint {}",
                config.gcs_endpoint
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::ConfigError(format!("HTTP client: {}", e)))?;

        let token = match &config.access_token {
            Some(token) if !token.is_empty() => TokenSource::Static(token.clone()),
            _ => TokenSource::Metadata {
                url: config.metadata_token_url.clone(),
                cache: Mutex::new(None),
            },
        };

        Ok(Self {
            client,
            bucket,
            endpoint,
            token,
        })
    }

    /// Object names may contain `/`, but `.` and `..` segments would be
    /// collapsed in the public URL and address a different object.
    fn check_key(key: &str) -> Result<()> {
        let bad = key.is_empty()
            || key.starts_with('/')
            || key.split('/').any(|segment| segment == "." || segment == "..");
        if bad {
            return Err(PipelineError::StorageError(format!(
                "invalid object name: {:?}",
                key
            )));
        }
        Ok(())
    }

    pub fn upload_url(&self, key: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["upload", "storage", "v1", "b", self.bucket.as_str(), "o"]);
        }
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        url
    }

    async fn access_token(&self) -> Result<String> {
        let (url, cache) = match &self.token {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Metadata { url, cache } => (url, cache),
        };

        let mut cached = cache.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        log::debug!("Fetching access token from metadata server");
        let token: MetadataToken = self
            .client
            .get(url.as_str())
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| PipelineError::StorageError(format!("metadata token: {}", e)))?
            .json()
            .await
            .map_err(|e| PipelineError::StorageError(format!("metadata token: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_SLACK);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

#[async_trait]
impl ObjectStorage for GcsStorage {
    async fn upload(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<StoredObject> {
        Self::check_key(key)?;
        let token = self.access_token().await?;
        let size = body.len();

        let response = self
            .client
            .post(self.upload_url(key))
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| PipelineError::StorageError(format!("upload request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::StorageError(format!(
                "upload of {} to {} failed with {}: {}",
                key, self.bucket, status, error_text
            )));
        }

        log::info!("Uploaded {} bytes to gs://{}/{}", size, self.bucket, key);
        Ok(StoredObject {
            key: key.to_string(),
            public_url: self.public_url(key),
        })
    }

    fn public_url(&self, key: &str) -> String {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&self.bucket)
                .extend(key.split('/'));
        }
        url.to_string()
    }

    fn name(&self) -> &'static str {
        "gcs"
    }
}
