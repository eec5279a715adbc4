//! HTTP server
//!
//! Thin axum surface over [`Engine`]. Handlers validate input, run one
//! engine call each and map engine errors to JSON `{error}` bodies.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};
use uuid::Uuid;

use playsmith_common::{AutomationDraft, ExecutionReport, TestCase};
use playsmith_engine::{CancellationToken, DraftRequest, Engine, ToolCall, TranscriptEntry};

use crate::error::{ApiError, ApiResult};

/// Web server
pub struct WebServer {
    state: Arc<AppState>,
}

struct AppState {
    engine: Engine,
}

impl WebServer {
    pub fn new(engine: Engine) -> Self {
        Self {
            state: Arc::new(AppState { engine }),
        }
    }

    /// Create router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/health", get(health_handler))
            .route("/api/automation/draft", post(draft_handler))
            .route("/api/scripts/execute", post(execute_handler))
            .route("/api/scripts/from-actions", post(from_actions_handler))
            .route("/api/scripts/from-tool-calls", post(from_tool_calls_handler))
            .route("/api/scripts/from-transcript", post(from_transcript_handler))
            .route("/api/knowledge/refresh", post(refresh_knowledge_handler))
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the web server
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        info!("Playsmith web service starting on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Deserialize)]
struct DraftBody {
    test_case: TestCase,
    #[serde(default)]
    test_case_id: Option<String>,
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default)]
    record_video: Option<bool>,
    #[serde(default)]
    deadline_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ExecuteBody {
    script: String,
    #[serde(default)]
    test_case_id: Option<String>,
    #[serde(default)]
    record_video: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct FromActionsBody {
    actions_taken: String,
}

#[derive(Debug, Deserialize)]
struct FromToolCallsBody {
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct FromTranscriptBody {
    transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshBody {
    #[serde(default)]
    app_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct ScriptResponse {
    script: String,
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    app_name: String,
    pages: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Token cancelled when the handler future is dropped, e.g. on client disconnect
fn request_token() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": playsmith_common::VERSION,
    }))
}

async fn draft_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DraftBody>, JsonRejection>,
) -> ApiResult<Json<AutomationDraft>> {
    let Json(body) = body?;
    if body.test_case.title.trim().is_empty() {
        return Err(ApiError::BadRequest("test_case.title is required".to_string()));
    }

    let request_id = Uuid::new_v4();
    let mut request = DraftRequest::new(body.test_case);
    request.test_case_id = body.test_case_id;
    request.app_name = body.app_name;
    request.record_video = body.record_video.unwrap_or(true);
    request.deadline = body.deadline_secs.map(Duration::from_secs);

    let (token, _guard) = request_token();
    let draft = state
        .engine
        .generate_draft(request, &token)
        .instrument(tracing::info_span!("draft", %request_id))
        .await?;
    Ok(Json(draft))
}

async fn execute_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ExecuteBody>, JsonRejection>,
) -> ApiResult<Json<ExecutionReport>> {
    let Json(body) = body?;
    if body.script.trim().is_empty() {
        return Err(ApiError::BadRequest("script is required".to_string()));
    }

    let (token, _guard) = request_token();
    let report = state
        .engine
        .execute_adhoc(
            &body.script,
            body.test_case_id.as_deref(),
            body.record_video.unwrap_or(true),
            &token,
        )
        .await?;
    Ok(Json(report))
}

async fn from_actions_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<FromActionsBody>, JsonRejection>,
) -> ApiResult<Json<ScriptResponse>> {
    let Json(body) = body?;
    Ok(Json(ScriptResponse {
        script: state.engine.compile_actions(&body.actions_taken),
    }))
}

async fn from_tool_calls_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<FromToolCallsBody>, JsonRejection>,
) -> ApiResult<Json<ScriptResponse>> {
    let Json(body) = body?;
    Ok(Json(ScriptResponse {
        script: state.engine.compile_tool_calls(&body.tool_calls),
    }))
}

async fn from_transcript_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<FromTranscriptBody>, JsonRejection>,
) -> ApiResult<Json<ScriptResponse>> {
    let Json(body) = body?;
    Ok(Json(ScriptResponse {
        script: state.engine.compile_transcript(&body.transcript),
    }))
}

async fn refresh_knowledge_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RefreshBody>, JsonRejection>,
) -> ApiResult<Json<RefreshResponse>> {
    let body = match body {
        Ok(Json(body)) => body,
        Err(JsonRejection::MissingJsonContentType(_)) => RefreshBody::default(),
        Err(e) => return Err(e.into()),
    };

    let (token, _guard) = request_token();
    let graph = state
        .engine
        .knowledge()
        .refresh(body.app_name.as_deref(), &token)
        .await?;
    Ok(Json(RefreshResponse {
        app_name: graph.app_name.clone(),
        pages: graph.pages.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use playsmith_common::KnowledgeCache;
    use playsmith_engine::{
        CompletionService, EngineResult, ExecuteRequest, ExecuteResponse, ExecutionBackend, ExecutionClient,
        KnowledgeLoader, RetryPolicy, UrlRewriter,
    };

    const SCRIPT: &str = "await page.goto('http://localhost:5173/');\nawait page.getByText('Login').click();";

    struct FixedLlm;

    #[async_trait]
    impl CompletionService for FixedLlm {
        async fn complete(&self, _prompt: &str, _cancel: &CancellationToken) -> EngineResult<String> {
            Ok(SCRIPT.to_string())
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    struct PassingExecutor;

    #[async_trait]
    impl ExecutionBackend for PassingExecutor {
        async fn execute(&self, _request: &ExecuteRequest, _timeout: Duration) -> EngineResult<ExecuteResponse> {
            Ok(ExecuteResponse {
                success: true,
                actions_taken: Some("Action: click(text=Login) - ok".to_string()),
                video_saved: true,
                ..Default::default()
            })
        }
    }

    fn app() -> Router {
        let cache: &'static KnowledgeCache = Box::leak(Box::new(KnowledgeCache::new()));
        let engine = Engine::new(
            Arc::new(FixedLlm),
            ExecutionClient::new(Arc::new(PassingExecutor), RetryPolicy::default()),
            KnowledgeLoader::with_cache(None, cache),
            UrlRewriter::new("http://frontend:5173").unwrap(),
        );
        WebServer::new(engine).router()
    }

    async fn post_json(uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_draft_endpoint() {
        let (status, body) = post_json(
            "/api/automation/draft",
            serde_json::json!({
                "test_case": {"title": "Login", "steps": ["Open the app", "Click Login"]},
                "test_case_id": "tc-9"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exec_success"], true);
        assert_eq!(body["generation_mode"], "fast_single_call");
        assert_eq!(
            body["script"],
            "await page.goto('http://frontend:5173/');\nawait page.getByText('Login').click();"
        );
        assert!(body["video_path"].as_str().unwrap().starts_with("/videos/tc-9_"));
    }

    #[tokio::test]
    async fn test_draft_requires_title() {
        let (status, body) = post_json(
            "/api/automation/draft",
            serde_json::json!({"test_case": {"title": "  "}}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "test_case.title is required");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (status, body) = post_json("/api/scripts/execute", serde_json::json!({"nope": 1})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_execute_endpoint() {
        let (status, body) = post_json(
            "/api/scripts/execute",
            serde_json::json!({"script": "```js\nawait page.goto('http://localhost:5173/');\n```"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exec_success"], true);
        assert!(body["video_filename"].as_str().unwrap().starts_with("manual_"));
    }

    #[tokio::test]
    async fn test_compile_endpoints() {
        let (status, body) = post_json(
            "/api/scripts/from-actions",
            serde_json::json!({"actions_taken": "Action: goto(http://localhost:5173/x) - ok\nAction: click(#save) - ok"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["script"],
            "await page.goto('http://frontend:5173/x');\nawait page.click('#save');"
        );

        let (status, body) = post_json(
            "/api/scripts/from-tool-calls",
            serde_json::json!({"tool_calls": [{"name": "browser_press_key", "arguments": {"key": "Enter"}}]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["script"], "await page.keyboard.press('Enter');");
    }

    #[tokio::test]
    async fn test_knowledge_refresh_without_store() {
        let (status, body) = post_json("/api/knowledge/refresh", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["app_name"], "TestMaster");
        assert_eq!(body["pages"], 10);
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
