use crate::{error::Result, models::StoredObject};
use async_trait::async_trait;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Writes `body` under `key`, replacing any existing object.
    async fn upload(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<StoredObject>;

    fn public_url(&self, key: &str) -> String;

    fn name(&self) -> &'static str;
}
