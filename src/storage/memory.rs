use crate::{error::Result, models::StoredObject, storage::traits::ObjectStorage};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Keeps objects in process memory. Used for dry runs and tests.
pub struct MemoryStorage {
    bucket: String,
    objects: RwLock<HashMap<String, MemoryObject>>,
}

impl MemoryStorage {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<MemoryObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<StoredObject> {
        let replaced = self
            .objects
            .write()
            .await
            .insert(
                key.to_string(),
                MemoryObject {
                    body,
                    content_type: content_type.to_string(),
                },
            )
            .is_some();

        if replaced {
            log::debug!("Overwrote memory object {}", key);
        }

        Ok(StoredObject {
            key: key.to_string(),
            public_url: self.public_url(key),
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{}/{}", self.bucket, key)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
