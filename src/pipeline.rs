use crate::{
    config::Config,
    error::{PipelineError, Result},
    logger,
    models::{
        GenerationParameters, GenerationRequest, InputSource, MissingPromptPolicy, StoredObject,
    },
    stability::{extract_image, DecodedImage, GenerationService, StabilityClient},
    storage::{Publisher, StorageManager},
};
use chrono::{Local, NaiveDate};
use std::str::FromStr;
use std::sync::Arc;

pub use crate::storage::KeyStrategy;

pub const CONCEPT_ART_SUFFIX: &str = " + , realistic, highly detailed, digital painting, concept art, smooth, sharp focus, illustration, cinematic lighting, ArtStation, art by greg rutkowski.";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub prompt_suffix: String,
    pub params: GenerationParameters,
    pub key_strategy: KeyStrategy,
    pub input_source: InputSource,
    pub missing_prompt: MissingPromptPolicy,
}

/// Named configurations matching the two deployed functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    ConceptArt,
    Daily,
}

impl Preset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::ConceptArt => "concept-art",
            Preset::Daily => "daily",
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        match self {
            Preset::ConceptArt => PipelineConfig {
                prompt_suffix: CONCEPT_ART_SUFFIX.to_string(),
                params: GenerationParameters {
                    steps: 15,
                    width: 512,
                    height: 512,
                    cfg_scale: 8.0,
                    samples: 1,
                    safety: true,
                    seed: 123,
                },
                key_strategy: KeyStrategy::TempPath,
                input_source: InputSource::Body,
                missing_prompt: MissingPromptPolicy::Ignore,
            },
            Preset::Daily => PipelineConfig {
                prompt_suffix: String::new(),
                params: GenerationParameters {
                    steps: 29,
                    width: 512,
                    height: 512,
                    cfg_scale: 15.0,
                    samples: 1,
                    safety: true,
                    seed: 513912915,
                },
                key_strategy: KeyStrategy::Date,
                input_source: InputSource::Query,
                missing_prompt: MissingPromptPolicy::Reject,
            },
        }
    }

    /// Environment variables holding the API key, in lookup order.
    pub fn api_key_vars(&self) -> &'static [&'static str] {
        match self {
            Preset::ConceptArt => &["STABILITY_API", "STABILITY_API_KEY"],
            Preset::Daily => &["STABILITY_API_KEY", "STABILITY_API"],
        }
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concept-art" | "concept_art" | "a" => Ok(Preset::ConceptArt),
            "daily" | "b" => Ok(Preset::Daily),
            other => Err(format!("unknown preset: {}", other)),
        }
    }
}

/// Prompt in, public URL out.
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    generator: Arc<dyn GenerationService>,
    publisher: Publisher,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        generator: Arc<dyn GenerationService>,
        publisher: Publisher,
    ) -> Self {
        Self {
            config,
            generator,
            publisher,
        }
    }

    /// Builds the production clients described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let generator = Arc::new(StabilityClient::new(&config.stability)?);
        let mut publisher = StorageManager::new(&config.storage)?.publisher();
        if let Some(dir) = &config.temp_dir {
            publisher = publisher.with_temp_dir(dir.clone());
        }
        Ok(Self::new(config.pipeline.clone(), generator, publisher))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn final_prompt(&self, prompt: &str) -> String {
        format!("{}{}", prompt, self.config.prompt_suffix)
    }

    pub async fn generate(&self, prompt: &str) -> Result<DecodedImage> {
        let full_prompt = self.final_prompt(prompt);
        log::debug!("Full prompt: {}", full_prompt);

        let _timer = logger::timer(&format!("generation via {}", self.generator.name()));
        let answers = self
            .generator
            .generate(&full_prompt, &self.config.params)
            .await?;
        extract_image(answers).await?.into_image()
    }

    pub async fn run(&self, request_id: &str, request: &GenerationRequest) -> Result<StoredObject> {
        self.run_on(request_id, request, Local::now().date_naive()).await
    }

    /// Same as [`Pipeline::run`] with an explicit date for date-keyed uploads.
    /// Everything logged along the way carries `request_id`.
    pub async fn run_on(
        &self,
        request_id: &str,
        request: &GenerationRequest,
        today: NaiveDate,
    ) -> Result<StoredObject> {
        logger::with_request_id(request_id, self.generate_and_publish(request, today)).await
    }

    async fn generate_and_publish(
        &self,
        request: &GenerationRequest,
        today: NaiveDate,
    ) -> Result<StoredObject> {
        if request.prompt.is_empty() {
            return Err(PipelineError::MissingPrompt(self.config.input_source));
        }

        let image = self.generate(&request.prompt).await?;

        let _timer = logger::timer("upload");
        let stored = self
            .publisher
            .publish(image, &self.config.key_strategy, today)
            .await?;
        log::info!("Stored {} at {}", stored.key, stored.public_url);
        Ok(stored)
    }
}
