use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
}

/// Sampling parameters sent with every generation call of a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub steps: u32,
    pub width: u32,
    pub height: u32,
    pub cfg_scale: f32,
    pub samples: u32,
    pub safety: bool,
    pub seed: u32,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        GenerationParameters {
            steps: 30,
            width: 512,
            height: 512,
            cfg_scale: 7.0,
            samples: 1,
            safety: true,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Success,
    Filtered,
    Error,
}

impl FinishReason {
    pub fn from_api(value: &str) -> Self {
        match value {
            "SUCCESS" => FinishReason::Success,
            "CONTENT_FILTERED" => FinishReason::Filtered,
            _ => FinishReason::Error,
        }
    }
}

/// One unit of output returned by the generation service.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub finish_reason: FinishReason,
    pub binary: Vec<u8>,
    pub seed: Option<u32>,
}

impl Artifact {
    pub fn image(binary: Vec<u8>) -> Self {
        Self {
            kind: ArtifactKind::Image,
            finish_reason: FinishReason::Success,
            binary,
            seed: None,
        }
    }

    pub fn filtered() -> Self {
        Self {
            kind: ArtifactKind::Image,
            finish_reason: FinishReason::Filtered,
            binary: Vec::new(),
            seed: None,
        }
    }
}

/// One response in the sequence produced by a generation call.
#[derive(Debug, Clone, Default)]
pub struct Answer {
    pub artifacts: Vec<Artifact>,
}

impl Answer {
    pub fn new(artifacts: Vec<Artifact>) -> Self {
        Self { artifacts }
    }
}

// Stability REST v1 wire types

#[derive(Debug, Serialize)]
pub struct TextToImageBody<'a> {
    pub text_prompts: Vec<TextPrompt<'a>>,
    pub cfg_scale: f32,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub steps: u32,
    pub seed: u32,
}

#[derive(Debug, Serialize)]
pub struct TextPrompt<'a> {
    pub text: &'a str,
    pub weight: f32,
}

#[derive(Debug, Deserialize)]
pub struct StabilityImageResponse {
    #[serde(default)]
    pub artifacts: Vec<StabilityArtifact>,
}

#[derive(Debug, Deserialize)]
pub struct StabilityArtifact {
    pub base64: Option<String>,
    pub seed: Option<u32>,
    #[serde(rename = "finishReason")]
    pub finish_reason: String,
}

#[derive(Debug, Deserialize)]
pub struct StabilityErrorResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
