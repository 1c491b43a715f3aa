use crate::models::InputSource;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Missing a 'prompt' {0}")]
    MissingPrompt(InputSource),

    #[error("Your request activated the API's safety filters and could not be processed. Please modify the prompt and try again.")]
    ContentFiltered,

    #[error("Generation finished without producing an image")]
    NoImageProduced,

    #[error("Generation service error: {0}")]
    GenerationError(String),

    #[error("Storage service error: {0}")]
    StorageError(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable machine-readable name used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ConfigError(_) => "config_error",
            PipelineError::MissingPrompt(_) => "missing_prompt",
            PipelineError::ContentFiltered => "content_filtered",
            PipelineError::NoImageProduced => "no_image_produced",
            PipelineError::GenerationError(_) => "generation_failed",
            PipelineError::StorageError(_) => "storage_failed",
            PipelineError::ImageError(_) => "invalid_image",
            PipelineError::IoError(_) => "io_error",
        }
    }

    /// True when the failure came from one of the external services.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            PipelineError::NoImageProduced
                | PipelineError::GenerationError(_)
                | PipelineError::StorageError(_)
                | PipelineError::ImageError(_)
        )
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::ImageError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::IoError(std::io::Error::new(std::io::ErrorKind::Other, err))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(PipelineError::ContentFiltered.kind(), "content_filtered");
        assert_eq!(PipelineError::NoImageProduced.kind(), "no_image_produced");
        assert_eq!(
            PipelineError::MissingPrompt(InputSource::Query).kind(),
            "missing_prompt"
        );
        assert_eq!(
            PipelineError::StorageError("boom".into()).kind(),
            "storage_failed"
        );
    }

    #[test]
    fn test_error_display() {
        let err = PipelineError::MissingPrompt(InputSource::Query);
        assert_eq!(err.to_string(), "Missing a 'prompt' query param");

        let err = PipelineError::MissingPrompt(InputSource::Body);
        assert_eq!(err.to_string(), "Missing a 'prompt' body field");

        let err = PipelineError::GenerationError("503 Service Unavailable".into());
        assert_eq!(
            err.to_string(),
            "Generation service error: 503 Service Unavailable"
        );
    }

    #[test]
    fn test_upstream_classification() {
        assert!(PipelineError::NoImageProduced.is_upstream());
        assert!(PipelineError::StorageError("x".into()).is_upstream());
        assert!(!PipelineError::ContentFiltered.is_upstream());
        assert!(!PipelineError::ConfigError("x".into()).is_upstream());
    }
}
