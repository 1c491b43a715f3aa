use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where the handler looks for the `prompt` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    /// `{"prompt": "..."}` in a JSON request body.
    Body,
    /// `?prompt=...` in the query string.
    Query,
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Body => write!(f, "body field"),
            InputSource::Query => write!(f, "query param"),
        }
    }
}

impl FromStr for InputSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "body" | "json" => Ok(InputSource::Body),
            "query" => Ok(InputSource::Query),
            other => Err(format!("unknown input source: {}", other)),
        }
    }
}

/// What to do when a request carries no usable prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPromptPolicy {
    /// Answer `200` with an empty body and make no external call.
    Ignore,
    /// Fail the request with `PipelineError::MissingPrompt`.
    Reject,
}

impl FromStr for MissingPromptPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" | "empty" => Ok(MissingPromptPolicy::Ignore),
            "reject" | "error" => Ok(MissingPromptPolicy::Reject),
            other => Err(format!("unknown missing-prompt policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}
