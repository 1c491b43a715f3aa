use serde::{Deserialize, Serialize};

/// An object written to the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub public_url: String,
}

#[derive(Debug, Deserialize)]
pub struct MetadataToken {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}
