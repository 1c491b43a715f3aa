use crate::models::MissingPromptPolicy;
use crate::pipeline::{PipelineConfig, Preset};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_STABILITY_HOST: &str = "https://api.stability.ai";
pub const DEFAULT_STABILITY_ENGINE: &str = "stable-diffusion-v1-6";
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Debug, Clone)]
pub struct StabilityConfig {
    pub api_key: Option<String>,
    pub host: String,
    pub engine: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendKind {
    Gcs,
    Local,
    Memory,
}

impl FromStr for StorageBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcs" | "google" => Ok(StorageBackendKind::Gcs),
            "local" | "fs" => Ok(StorageBackendKind::Local),
            "memory" => Ok(StorageBackendKind::Memory),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

impl StorageBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackendKind::Gcs => "gcs",
            StorageBackendKind::Local => "local",
            StorageBackendKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub bucket: Option<String>,
    pub gcs_endpoint: String,
    pub access_token: Option<String>,
    pub metadata_token_url: String,
    pub local_dir: PathBuf,
    pub local_public_base_url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: Option<u16>,
    pub preset: Preset,
    pub pipeline: PipelineConfig,
    pub stability: StabilityConfig,
    pub storage: StorageConfig,
    pub temp_dir: Option<PathBuf>,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        StabilityConfig {
            api_key: None,
            host: DEFAULT_STABILITY_HOST.to_string(),
            engine: DEFAULT_STABILITY_ENGINE.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl StabilityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackendKind::Gcs,
            bucket: None,
            gcs_endpoint: DEFAULT_GCS_ENDPOINT.to_string(),
            access_token: None,
            metadata_token_url: DEFAULT_METADATA_TOKEN_URL.to_string(),
            local_dir: PathBuf::from("./bucket"),
            local_public_base_url: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl StorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_backend(mut self, backend: StorageBackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_gcs_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.gcs_endpoint = endpoint.into();
        self
    }

    pub fn with_metadata_token_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_token_url = url.into();
        self
    }

    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backend = StorageBackendKind::Local;
        self.local_dir = dir.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        let preset = Preset::ConceptArt;
        Config {
            port: None,
            preset,
            pipeline: preset.pipeline_config(),
            stability: StabilityConfig::default(),
            storage: StorageConfig::default(),
            temp_dir: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT").and_then(|port| port.parse().ok());
        let preset = lookup("PIPELINE_PRESET")
            .and_then(|val| val.parse().ok())
            .unwrap_or(Preset::ConceptArt);

        let mut pipeline = preset.pipeline_config();
        if let Some(policy) = lookup("MISSING_PROMPT").and_then(|val| val.parse().ok()) {
            pipeline.missing_prompt = policy;
        }

        let api_key = preset
            .api_key_vars()
            .iter()
            .find_map(|name| lookup(*name).filter(|val| !val.is_empty()));

        let mut stability = StabilityConfig {
            api_key,
            ..StabilityConfig::default()
        };
        if let Some(host) = lookup("STABILITY_HOST") {
            stability.host = host;
        }
        if let Some(engine) = lookup("STABILITY_ENGINE") {
            stability.engine = engine;
        }
        if let Some(secs) = lookup("GENERATION_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            stability.timeout = Duration::from_secs(secs);
        }

        let mut storage = StorageConfig {
            bucket: lookup("BUCKET"),
            access_token: lookup("GCS_ACCESS_TOKEN"),
            local_public_base_url: lookup("LOCAL_PUBLIC_BASE_URL"),
            ..StorageConfig::default()
        };
        if let Some(backend) = lookup("STORAGE_BACKEND").and_then(|val| val.parse().ok()) {
            storage.backend = backend;
        }
        if let Some(endpoint) = lookup("GCS_ENDPOINT") {
            storage.gcs_endpoint = endpoint;
        }
        if let Some(url) = lookup("GCS_METADATA_TOKEN_URL") {
            storage.metadata_token_url = url;
        }
        if let Some(dir) = lookup("LOCAL_STORAGE_DIR") {
            storage.local_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("STORAGE_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            storage.timeout = Duration::from_secs(secs);
        }

        Config {
            port,
            preset,
            pipeline,
            stability,
            storage,
            temp_dir: lookup("TEMP_DIR").map(PathBuf::from),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = preset;
        self.pipeline = preset.pipeline_config();
        self
    }

    pub fn with_missing_prompt(mut self, policy: MissingPromptPolicy) -> Self {
        self.pipeline.missing_prompt = policy;
        self
    }

    pub fn with_stability(mut self, config: StabilityConfig) -> Self {
        self.stability = config;
        self
    }

    pub fn with_storage(mut self, config: StorageConfig) -> Self {
        self.storage = config;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InputSource;
    use crate::pipeline::KeyStrategy;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(lookup_from(&[]));
        assert_eq!(config.port, None);
        assert_eq!(config.preset, Preset::ConceptArt);
        assert_eq!(config.stability.host, DEFAULT_STABILITY_HOST);
        assert_eq!(config.storage.backend, StorageBackendKind::Gcs);
        assert!(config.storage.bucket.is_none());
        assert!(config.stability.api_key.is_none());
    }

    #[test]
    fn test_daily_preset_reads_its_key_first() {
        let config = Config::from_lookup(lookup_from(&[
            ("PIPELINE_PRESET", "daily"),
            ("STABILITY_API", "legacy-key"),
            ("STABILITY_API_KEY", "daily-key"),
            ("BUCKET", "images"),
            ("PORT", "9090"),
        ]));

        assert_eq!(config.preset, Preset::Daily);
        assert_eq!(config.stability.api_key.as_deref(), Some("daily-key"));
        assert_eq!(config.storage.bucket.as_deref(), Some("images"));
        assert_eq!(config.port, Some(9090));
        assert_eq!(config.pipeline.input_source, InputSource::Query);
        assert_eq!(config.pipeline.key_strategy, KeyStrategy::Date);
    }

    #[test]
    fn test_concept_art_falls_back_to_other_key_var() {
        let config = Config::from_lookup(lookup_from(&[("STABILITY_API_KEY", "only-key")]));
        assert_eq!(config.stability.api_key.as_deref(), Some("only-key"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("MISSING_PROMPT", "reject"),
            ("STORAGE_BACKEND", "memory"),
            ("GENERATION_TIMEOUT_SECS", "5"),
            ("STABILITY_ENGINE", "stable-diffusion-xl-1024-v1-0"),
            ("TEMP_DIR", "/var/tmp"),
            ("GCS_METADATA_TOKEN_URL", "http://127.0.0.1:8999/token"),
        ]));

        assert_eq!(config.pipeline.missing_prompt, MissingPromptPolicy::Reject);
        assert_eq!(config.storage.backend, StorageBackendKind::Memory);
        assert_eq!(config.stability.timeout, Duration::from_secs(5));
        assert_eq!(config.stability.engine, "stable-diffusion-xl-1024-v1-0");
        assert_eq!(config.temp_dir, Some(PathBuf::from("/var/tmp")));
        assert_eq!(config.storage.metadata_token_url, "http://127.0.0.1:8999/token");
    }

    #[test]
    fn test_unparseable_values_keep_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "not-a-port"),
            ("PIPELINE_PRESET", "mystery"),
            ("STORAGE_BACKEND", "tape"),
        ]));
        assert_eq!(config.port, None);
        assert_eq!(config.preset, Preset::ConceptArt);
        assert_eq!(config.storage.backend, StorageBackendKind::Gcs);
    }

    #[test]
    fn test_builders() {
        let config = Config::new()
            .with_port(3000)
            .with_preset(Preset::Daily)
            .with_missing_prompt(MissingPromptPolicy::Ignore)
            .with_stability(StabilityConfig::new().with_api_key("k"))
            .with_storage(StorageConfig::new().with_bucket("b"));

        assert_eq!(config.port, Some(3000));
        assert_eq!(config.pipeline.missing_prompt, MissingPromptPolicy::Ignore);
        assert_eq!(config.pipeline.key_strategy, KeyStrategy::Date);
        assert_eq!(config.stability.api_key.as_deref(), Some("k"));
        assert_eq!(config.storage.bucket.as_deref(), Some("b"));
    }
}
