//! LLM completion client

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use playsmith_common::config::LlmConfig;

use crate::cancel::with_cancel;
use crate::error::{EngineError, EngineResult};

/// Sampling settings sent with every prompt
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: 2048,
        }
    }
}

/// Text completion backend
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Complete `prompt`. Returns the trimmed reply, possibly empty.
    async fn complete(&self, prompt: &str, cancel: &CancellationToken) -> EngineResult<String>;

    /// Model name recorded in draft metadata
    fn model(&self) -> &str;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(flatten)]
    sampling: Sampling,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    output: Option<String>,
}

/// Client for an Ollama-style `/api/generate` endpoint
pub struct OllamaClient {
    base_url: String,
    model: String,
    sampling: Sampling,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            sampling: Sampling {
                temperature: config.temperature,
                top_p: config.top_p,
                max_tokens: config.max_tokens,
            },
            client,
        })
    }

    async fn generate(&self, prompt: &str) -> EngineResult<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            sampling: self.sampling,
        };

        debug!("LLM request: {} chars to {}", prompt.len(), self.model);
        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(EngineError::HttpStatus {
                url,
                status: resp.status().as_u16(),
            });
        }

        let data: GenerateResponse = resp.json().await?;
        let text = data
            .response
            .filter(|s| !s.trim().is_empty())
            .or(data.output)
            .unwrap_or_default();
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(&self, prompt: &str, cancel: &CancellationToken) -> EngineResult<String> {
        with_cancel(cancel, self.generate(prompt))
            .await
            .map_err(|e| match e {
                EngineError::Cancelled => e,
                EngineError::Http(err) if err.is_timeout() => EngineError::Llm(format!("request timed out: {}", err)),
                other => EngineError::Llm(other.to_string()),
            })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
