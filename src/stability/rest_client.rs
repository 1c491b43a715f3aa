use crate::{
    config::StabilityConfig,
    error::{PipelineError, Result},
    models::{
        Answer, Artifact, ArtifactKind, FinishReason, GenerationParameters,
        StabilityErrorResponse, StabilityImageResponse, TextPrompt, TextToImageBody,
    },
    stability::{AnswerStream, GenerationService},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, StreamExt};
use reqwest::{header, Client, StatusCode};

#[derive(Clone)]
pub struct StabilityClient {
    client: Client,
    api_key: String,
    host: String,
    engine: String,
}

impl StabilityClient {
    pub fn new(config: &StabilityConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| PipelineError::ConfigError("Stability API key is required".into()))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            host: config.host.trim_end_matches('/').to_string(),
            engine: config.engine.clone(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1/generation/{}/text-to-image",
            self.host, self.engine
        )
    }

    pub fn build_body<'a>(prompt: &'a str, params: &GenerationParameters) -> TextToImageBody<'a> {
        TextToImageBody {
            text_prompts: vec![TextPrompt {
                text: prompt,
                weight: 1.0,
            }],
            cfg_scale: params.cfg_scale,
            width: params.width,
            height: params.height,
            samples: params.samples,
            steps: params.steps,
            seed: params.seed,
        }
    }

    pub fn answer_from_response(response: StabilityImageResponse) -> Result<Answer> {
        let artifacts = response
            .artifacts
            .into_iter()
            .map(|artifact| -> Result<Artifact> {
                let binary = match artifact.base64 {
                    Some(data) => STANDARD.decode(data.as_bytes()).map_err(|e| {
                        PipelineError::GenerationError(format!("invalid base64 artifact: {}", e))
                    })?,
                    None => Vec::new(),
                };
                Ok(Artifact {
                    kind: ArtifactKind::Image,
                    finish_reason: FinishReason::from_api(&artifact.finish_reason),
                    binary,
                    seed: artifact.seed,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Answer::new(artifacts))
    }

    /// Moderation rejections come back as `400 invalid_prompts`; they are
    /// reported as a filtered artifact so the adapter handles every filter
    /// outcome the same way.
    pub fn answer_from_error(status: StatusCode, body: &str) -> Result<Answer> {
        let parsed: Option<StabilityErrorResponse> = serde_json::from_str(body).ok();
        let name = parsed.as_ref().and_then(|e| e.name.clone()).unwrap_or_default();
        let message = parsed
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| body.to_string());

        if status == StatusCode::BAD_REQUEST && name == "invalid_prompts" {
            return Ok(Answer::new(vec![Artifact::filtered()]));
        }

        let id = parsed.and_then(|e| e.id).unwrap_or_default();
        Err(PipelineError::GenerationError(format!(
            "{} {} [{}]: {}",
            status.as_u16(),
            name,
            id,
            message
        )))
    }
}

#[async_trait]
impl GenerationService for StabilityClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParameters,
    ) -> Result<AnswerStream> {
        if !params.safety {
            log::warn!("Safety filtering cannot be disabled on the REST API; requesting anyway");
        }

        let body = Self::build_body(prompt, params);
        log::info!(
            "Generating image with engine: {} ({}x{}, {} steps, cfg {}, seed {})",
            self.engine,
            params.width,
            params.height,
            params.steps,
            params.cfg_scale,
            params.seed
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::GenerationError(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PipelineError::GenerationError(format!("reading response: {}", e)))?;

        let answer = if status.is_success() {
            let parsed: StabilityImageResponse = serde_json::from_str(&text)
                .map_err(|e| PipelineError::GenerationError(format!("bad response: {}", e)))?;
            Self::answer_from_response(parsed)?
        } else {
            Self::answer_from_error(status, &text)?
        };

        log::debug!("Generation returned {} artifact(s)", answer.artifacts.len());
        Ok(stream::iter(vec![Ok(answer)]).boxed())
    }

    fn name(&self) -> &str {
        "stability"
    }
}
