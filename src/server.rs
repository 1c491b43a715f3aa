use crate::{
    config::Config,
    error::PipelineError,
    models::{
        ErrorBody, ErrorDetail, GenerateResponse, GenerationRequest, InputSource,
        MissingPromptPolicy,
    },
    logger,
    pipeline::Pipeline,
};
use actix_web::{
    http::StatusCode, web, App, HttpRequest, HttpResponse, HttpServer, ResponseError,
};
use uuid::Uuid;

impl ResponseError for PipelineError {
    fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::MissingPrompt(_) => StatusCode::BAD_REQUEST,
            PipelineError::ContentFiltered => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::NoImageProduced
            | PipelineError::GenerationError(_)
            | PipelineError::StorageError(_)
            | PipelineError::ImageError(_) => StatusCode::BAD_GATEWAY,
            PipelineError::ConfigError(_) | PipelineError::IoError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: ErrorDetail {
                kind: self.kind().to_string(),
                message: self.to_string(),
            },
        })
    }
}

/// Reads the prompt from wherever `source` says it lives. Bodies that are not
/// JSON, or carry a non-string `prompt`, count as missing. A repeated query
/// parameter yields its first value.
pub fn extract_prompt(source: InputSource, req: &HttpRequest, body: &[u8]) -> Option<String> {
    match source {
        InputSource::Body => serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|json| json.get("prompt")?.as_str().map(String::from)),
        InputSource::Query => web::Query::<Vec<(String, String)>>::from_query(req.query_string())
            .ok()?
            .into_inner()
            .into_iter()
            .find_map(|(name, value)| (name == "prompt").then_some(value)),
    }
}

async fn generate_image(
    pipeline: web::Data<Pipeline>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, PipelineError> {
    let request_id = Uuid::new_v4().to_string();
    let handled = handle(&pipeline, &request_id, &req, &body);
    logger::with_request_id(request_id.clone(), handled).await
}

async fn handle(
    pipeline: &Pipeline,
    request_id: &str,
    req: &HttpRequest,
    body: &[u8],
) -> Result<HttpResponse, PipelineError> {
    let config = pipeline.config();
    log::info!("{} {}", req.method(), req.path());

    let prompt = extract_prompt(config.input_source, req, body).filter(|p| !p.is_empty());

    let prompt = match (prompt, config.missing_prompt) {
        (Some(prompt), _) => prompt,
        (None, MissingPromptPolicy::Ignore) => {
            log::info!("No prompt given, nothing to do");
            return Ok(HttpResponse::Ok().finish());
        }
        (None, MissingPromptPolicy::Reject) => {
            log::warn!("Rejected: missing prompt");
            return Err(PipelineError::MissingPrompt(config.input_source));
        }
    };

    match pipeline.run(request_id, &GenerationRequest { prompt }).await {
        Ok(stored) => Ok(HttpResponse::Ok().json(GenerateResponse {
            url: stored.public_url,
        })),
        Err(e) if e.is_upstream() => {
            log::error!("❌ Upstream failure: {}", e);
            Err(e)
        }
        Err(e) => {
            log::warn!("Request failed: {}", e);
            Err(e)
        }
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/healthz", web::get().to(health))
        .route("/", web::to(generate_image));
}

pub async fn run(config: &Config, pipeline: Pipeline) -> std::io::Result<()> {
    let port = config.port.unwrap_or(8080);
    let data = web::Data::new(pipeline);

    logger::log_startup_info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), port);

    HttpServer::new(move || App::new().app_data(data.clone()).configure(routes))
        .bind(("0.0.0.0", port))?
        .run()
        .await
}
