pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod pipeline;
#[cfg(feature = "server")]
pub mod server;
pub mod stability;
pub mod storage;

pub use config::{Config, StabilityConfig, StorageBackendKind, StorageConfig};
pub use error::{PipelineError, Result};
pub use models::{
    GenerationParameters, GenerationRequest, InputSource, MissingPromptPolicy, StoredObject,
};
pub use pipeline::{Pipeline, PipelineConfig, Preset};
pub use stability::{DecodedImage, Extraction, GenerationService, StabilityClient};
pub use storage::{KeyStrategy, ObjectStorage, Publisher, StorageManager};
