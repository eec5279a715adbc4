//! API error responses

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::warn;

use playsmith_engine::EngineError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::Timeout { .. } | EngineError::Cancelled) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Engine(EngineError::Common(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(EngineError::Llm("down".into())).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::from(EngineError::Cancelled).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ApiError::from(EngineError::HttpStatus {
                url: "http://executor/execute".into(),
                status: 500
            })
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
