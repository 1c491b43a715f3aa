pub mod gcs;
pub mod local;
pub mod memory;
pub mod publisher;
pub mod traits;

use crate::{
    config::{StorageBackendKind, StorageConfig},
    error::Result,
};
use std::sync::Arc;

pub use gcs::GcsStorage;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use publisher::{KeyStrategy, Publisher};
pub use traits::ObjectStorage;

pub struct StorageManager {
    backend: Arc<dyn ObjectStorage>,
}

impl StorageManager {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let backend: Arc<dyn ObjectStorage> = match config.backend {
            StorageBackendKind::Gcs => Arc::new(GcsStorage::new(config)?),
            StorageBackendKind::Local => Arc::new(LocalStorage::new(
                &config.local_dir,
                config.local_public_base_url.clone(),
            )?),
            StorageBackendKind::Memory => Arc::new(MemoryStorage::new(
                config.bucket.clone().unwrap_or_else(|| "local".to_string()),
            )),
        };

        log::info!("Storage backend: {}", backend.name());
        Ok(Self { backend })
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.backend
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.backend.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[test]
    fn test_selects_backend_from_config() {
        let memory = StorageManager::new(
            &StorageConfig::new().with_backend(StorageBackendKind::Memory),
        )
        .unwrap();
        assert_eq!(memory.storage().name(), "memory");

        let gcs = StorageManager::new(
            &StorageConfig::new()
                .with_bucket("b")
                .with_access_token("t"),
        )
        .unwrap();
        assert_eq!(gcs.storage().name(), "gcs");

        let dir = tempfile::tempdir().unwrap();
        let local = StorageManager::new(&StorageConfig::new().with_local_dir(dir.path())).unwrap();
        assert_eq!(local.storage().name(), "local");
    }

    #[test]
    fn test_gcs_without_bucket_fails() {
        assert!(matches!(
            StorageManager::new(&StorageConfig::new()),
            Err(PipelineError::ConfigError(_))
        ));
    }
}
