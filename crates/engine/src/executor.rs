//! Execution client
//!
//! Scripts run on an external browser executor (`POST {url}/execute`). The
//! transport sits behind [`ExecutionBackend`]; [`ExecutionClient`] adds the
//! retry policy, video naming and the page-snapshot capture on top of it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use playsmith_common::config::ExecutorConfig;
use playsmith_common::ExecutionOutcome;

use crate::cancel::{self, with_deadline};
use crate::error::{EngineError, EngineResult};

/// Snapshot replies shorter than this are treated as empty
const MIN_SNAPSHOT_CHARS: usize = 30;
/// Snapshot replies are cut to this many characters
const MAX_SNAPSHOT_CHARS: usize = 6000;

/// Harvests visible controls from the live page
const SNAPSHOT_SCRIPT: &str = r#"return await page.evaluate(() => {
  const title = document.title || '';
  const url = location.href || '';
  const buttons = [...document.querySelectorAll('button, [role="button"]')]
    .slice(0, 30)
    .map(b => b.textContent?.trim() || b.getAttribute('aria-label') || '')
    .filter(Boolean);
  const links = [...document.querySelectorAll('a')]
    .slice(0, 30)
    .map(a => ({ text: a.textContent?.trim()?.substring(0, 60), href: a.getAttribute('href') || '' }))
    .filter(l => l.text);
  const headings = [...document.querySelectorAll('h1,h2,h3,h4')]
    .slice(0, 15)
    .map(h => h.textContent?.trim())
    .filter(Boolean);
  const inputs = [...document.querySelectorAll('input,textarea,select')]
    .slice(0, 20)
    .map(i => ({ tag: i.tagName.toLowerCase(), type: i.type || '', placeholder: i.placeholder || '', name: i.name || '', label: i.getAttribute('aria-label') || '' }));
  return JSON.stringify({ title, url, buttons, links, headings, inputs }, null, 2);
})"#;

/// Body of `POST /execute`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub script: String,
    pub record_video: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,
    pub max_video_size_bytes: u64,
}

/// Reply of `POST /execute`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub actions_taken: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub video_saved: bool,
}

impl ExecuteResponse {
    fn into_outcome(self, video_identifier: Option<String>) -> ExecutionOutcome {
        ExecutionOutcome {
            success: self.success,
            actions_taken: self.actions_taken.or(self.message).unwrap_or_default(),
            error: self.error.filter(|e| !e.trim().is_empty()),
            video_saved: self.video_saved,
            video_identifier,
        }
    }
}

/// Transport to a browser executor
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Send one request. `timeout` bounds this single attempt.
    async fn execute(&self, request: &ExecuteRequest, timeout: Duration) -> EngineResult<ExecuteResponse>;
}

/// reqwest-backed executor transport
pub struct HttpExecutionBackend {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpExecutionBackend {
    pub fn new(base_url: &str) -> EngineResult<Self> {
        Ok(Self {
            endpoint: format!("{}/execute", base_url.trim_end_matches('/')),
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl ExecutionBackend for HttpExecutionBackend {
    async fn execute(&self, request: &ExecuteRequest, timeout: Duration) -> EngineResult<ExecuteResponse> {
        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::HttpStatus {
                url: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await?;
        if body.is_empty() {
            return Ok(ExecuteResponse::default());
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Retry policy for executor calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Attempt N waits up to `base_timeout * N`
    pub base_timeout: Duration,
    /// Pause between attempts is `min(max_backoff, N seconds)`
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_timeout: Duration::from_secs(15),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        self.base_timeout * attempt
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_secs(u64::from(attempt)).min(self.max_backoff)
    }
}

/// Executes scripts with retries. Outcomes are raw; [`crate::detector`] judges them.
#[derive(Clone)]
pub struct ExecutionClient {
    backend: Arc<dyn ExecutionBackend>,
    policy: RetryPolicy,
    max_video_bytes: u64,
    snapshot_timeout: Duration,
}

impl ExecutionClient {
    pub fn new(backend: Arc<dyn ExecutionBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            max_video_bytes: 50_000_000,
            snapshot_timeout: Duration::from_secs(10),
        }
    }

    /// HTTP client configured from `[executor]`
    pub fn from_config(config: &ExecutorConfig) -> EngineResult<Self> {
        let backend = HttpExecutionBackend::new(&config.url)?;
        let policy = RetryPolicy {
            max_retries: config.max_retries.max(1),
            base_timeout: Duration::from_secs(config.base_timeout_secs),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
        };
        Ok(Self::new(Arc::new(backend), policy)
            .with_max_video_bytes(config.max_video_bytes)
            .with_snapshot_timeout(Duration::from_secs(config.snapshot_timeout_secs)))
    }

    pub fn with_max_video_bytes(mut self, bytes: u64) -> Self {
        self.max_video_bytes = bytes;
        self
    }

    pub fn with_snapshot_timeout(mut self, timeout: Duration) -> Self {
        self.snapshot_timeout = timeout;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `script` once, retrying transport failures.
    ///
    /// Only the last attempt's failure is reported, as the outcome's error.
    /// The sole `Err` is [`EngineError::Cancelled`].
    pub async fn execute(
        &self,
        script: &str,
        video_name: Option<&str>,
        record_video: bool,
        cancel: &CancellationToken,
    ) -> EngineResult<ExecutionOutcome> {
        let video_identifier = video_name.filter(|_| record_video).map(str::to_string);
        let request = ExecuteRequest {
            script: script.to_string(),
            record_video,
            video_path: video_identifier.clone(),
            max_video_size_bytes: self.max_video_bytes,
        };

        let attempts = self.policy.max_retries.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            let timeout = self.policy.timeout_for(attempt);
            debug!("Executor attempt {}/{} (timeout {:?})", attempt, attempts, timeout);

            let result = with_deadline(
                cancel,
                "executor",
                timeout,
                self.backend.execute(&request, timeout),
            )
            .await;

            match result {
                Ok(resp) => {
                    info!(
                        "Executor finished: success={} video_saved={}",
                        resp.success, resp.video_saved
                    );
                    return Ok(resp.into_outcome(video_identifier));
                }
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        debug!("Executor attempt {} failed: {}", attempt, e);
                        cancel::sleep(cancel, self.policy.backoff_for(attempt)).await?;
                    }
                }
            }
        }

        warn!("Executor failed after {} attempts: {}", attempts, last_error);
        Ok(ExecutionOutcome::failed(last_error, video_identifier))
    }

    /// Best-effort inventory of the live page; `None` on any failure
    pub async fn snapshot(&self, cancel: &CancellationToken) -> EngineResult<Option<String>> {
        let request = ExecuteRequest {
            script: SNAPSHOT_SCRIPT.to_string(),
            record_video: false,
            video_path: None,
            max_video_size_bytes: self.max_video_bytes,
        };
        let result = with_deadline(
            cancel,
            "page snapshot",
            self.snapshot_timeout,
            self.backend.execute(&request, self.snapshot_timeout),
        )
        .await;

        match result {
            Ok(resp) => {
                let text = resp.actions_taken.unwrap_or_default();
                if text.chars().count() > MIN_SNAPSHOT_CHARS {
                    Ok(Some(text.chars().take(MAX_SNAPSHOT_CHARS).collect()))
                } else {
                    Ok(None)
                }
            }
            Err(EngineError::Cancelled) => Err(EngineError::Cancelled),
            Err(e) => {
                debug!("Page snapshot unavailable: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Fails `failures` times, then succeeds
    struct Flaky {
        failures: u32,
        calls: Mutex<Vec<(ExecuteRequest, Duration)>>,
    }

    #[async_trait]
    impl ExecutionBackend for Flaky {
        async fn execute(&self, request: &ExecuteRequest, timeout: Duration) -> EngineResult<ExecuteResponse> {
            let n = {
                let mut calls = self.calls.lock();
                calls.push((request.clone(), timeout));
                calls.len() as u32
            };
            if n <= self.failures {
                return Err(EngineError::Executor(format!("attempt {} refused", n)));
            }
            Ok(ExecuteResponse {
                success: true,
                message: Some("Action: click(a) - ok".to_string()),
                video_saved: true,
                ..Default::default()
            })
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_timeout: Duration::from_secs(15),
            max_backoff: Duration::ZERO,
        }
    }

    #[test]
    fn test_policy_math() {
        let p = RetryPolicy::default();
        assert_eq!(p.timeout_for(3), Duration::from_secs(45));
        assert_eq!(p.backoff_for(2), Duration::from_secs(2));
        assert_eq!(p.backoff_for(9), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let backend = Arc::new(Flaky { failures: 2, calls: Mutex::new(Vec::new()) });
        let client = ExecutionClient::new(backend.clone(), fast_policy());
        let outcome = client
            .execute("await page.goto('/');", Some("tc_1.webm"), true, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.actions_taken, "Action: click(a) - ok");
        assert_eq!(outcome.video_identifier.as_deref(), Some("tc_1.webm"));

        let calls = backend.calls.lock();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].1, Duration::from_secs(45));
        assert_eq!(calls[0].0.video_path.as_deref(), Some("tc_1.webm"));
    }

    #[tokio::test]
    async fn test_final_failure_surfaces_last_error() {
        let backend = Arc::new(Flaky { failures: 10, calls: Mutex::new(Vec::new()) });
        let client = ExecutionClient::new(backend.clone(), fast_policy());
        let outcome = client
            .execute("x", None, false, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Executor error: attempt 3 refused"));
        assert_eq!(backend.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_cancel_stops_retries() {
        let backend = Arc::new(Flaky { failures: 10, calls: Mutex::new(Vec::new()) });
        let client = ExecutionClient::new(backend.clone(), fast_policy());
        let token = CancellationToken::new();
        token.cancel();
        let err = client.execute("x", None, false, &token).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(backend.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_http_backend_roundtrip() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/execute")
            .match_body(Matcher::PartialJson(json!({
                "script": "await page.click('a');",
                "record_video": true,
                "video_path": "v.webm",
                "max_video_size_bytes": 50000000
            })))
            .with_status(200)
            .with_body(r#"{"success": true, "actions_taken": "Action: click(a) - ok", "video_saved": true}"#)
            .create_async()
            .await;

        let config = ExecutorConfig {
            url: server.url(),
            ..Default::default()
        };
        let client = ExecutionClient::from_config(&config).unwrap();
        let outcome = client
            .execute("await page.click('a');", Some("v.webm"), true, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.success);
        assert!(outcome.video_saved);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_snapshot_requires_substantial_reply() {
        let mut server = mockito::Server::new_async().await;
        let _short = server
            .mock("POST", "/execute")
            .with_status(200)
            .with_body(r#"{"success": true, "actions_taken": "{}"}"#)
            .create_async()
            .await;

        let config = ExecutorConfig {
            url: server.url(),
            ..Default::default()
        };
        let client = ExecutionClient::from_config(&config).unwrap();
        assert_eq!(client.snapshot(&CancellationToken::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_snapshot_truncates() {
        let mut server = mockito::Server::new_async().await;
        let long = "x".repeat(9000);
        let _mock = server
            .mock("POST", "/execute")
            .match_body(Matcher::PartialJson(json!({"record_video": false})))
            .with_status(200)
            .with_body(json!({"success": true, "actions_taken": long}).to_string())
            .create_async()
            .await;

        let config = ExecutorConfig {
            url: server.url(),
            ..Default::default()
        };
        let client = ExecutionClient::from_config(&config).unwrap();
        let snap = client.snapshot(&CancellationToken::new()).await.unwrap().unwrap();
        assert_eq!(snap.len(), MAX_SNAPSHOT_CHARS);
    }
}
