//! Error types for the engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Timeout waiting for {what} after {seconds}s")]
    Timeout { what: String, seconds: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error("Knowledge graph error: {0}")]
    Knowledge(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] playsmith_common::Error),
}

impl EngineError {
    /// True when the error came from the caller cancelling
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
