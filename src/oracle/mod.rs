// src/oracle/mod.rs
//! Boundary to the external scoring oracle: the transport trait, the
//! Anthropic-style HTTP implementation, the retrying client wrapper and the
//! resilient response decoder.

pub mod client;
pub mod decode;
pub mod rerank;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::{batch_by_token_budget, estimate_tokens, OracleClient};

/// Failures at the oracle boundary. Rate limiting is distinguished because
/// the retry wrapper backs off longer for it.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("rate limited by oracle")]
    RateLimited,
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle api error: {0}")]
    Api(String),
    #[error("oracle transport error: {0}")]
    Http(#[from] reqwest::Error),
}

/// One oracle invocation: prompt plus generation parameters. The literal
/// prompt text is supplied by the caller.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub prompt: String,
    pub system: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl OracleRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            system: String::new(),
            max_tokens,
            temperature: 0.2,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }
}

/// Transport contract for the scoring oracle. One call, one free-text
/// response; retries and decoding live in the wrappers.
#[async_trait::async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError>;

    fn name(&self) -> &str;
}

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const API_VERSION: &str = "2023-06-01";

/// Messages-API oracle. Requires `ANTHROPIC_API_KEY` (or an explicit key).
pub struct AnthropicOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicOracle {
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_default();
        Self::with_key(api_key, model_override)
    }

    pub fn with_key(api_key: impl Into<String>, model_override: Option<&str>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("daybrief/0.1")
            .connect_timeout(Duration::from_secs(4))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key: api_key.into(),
            model: model_override.unwrap_or(DEFAULT_MODEL).to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct WireResponse {
    content: Vec<WireContent>,
}

#[derive(Deserialize)]
struct WireContent {
    #[serde(default)]
    text: String,
}

#[async_trait::async_trait]
impl Oracle for AnthropicOracle {
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        if self.api_key.is_empty() {
            return Err(OracleError::Api("missing api key".into()));
        }
        let body = WireRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages: vec![WireMessage {
                role: "user",
                content: &request.prompt,
            }],
        };
        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(OracleError::RateLimited);
        }
        if !status.is_success() {
            let preview = resp.text().await.unwrap_or_default();
            let preview: String = preview.chars().take(200).collect();
            return Err(OracleError::Api(format!("status {status}: {preview}")));
        }
        let parsed: WireResponse = resp.json().await?;
        Ok(parsed
            .content
            .first()
            .map(|c| c.text.clone())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
