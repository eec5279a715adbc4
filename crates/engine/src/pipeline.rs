//! Synthesis, execution and self-repair pipeline
//!
//! ```text
//! SYNTHESIZE -> EXECUTE -> VALIDATE -> DONE
//!                             |
//!                             +-> REPAIR -> EXECUTE -> VALIDATE -> ... -> EXHAUSTED
//! ```
//!
//! One request is one sequential run. Each stage takes the [`PipelineState`]
//! by value and hands back the next one.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use playsmith_common::{
    video_path, AutomationDraft, DraftMetadata, EffectiveResult, ExecutionOutcome, ExecutionReport,
    GenerationMode, KnowledgeGraph, PlaysmithConfig, RepairAttempt, ScriptCandidate, TestCase,
};

use crate::compile::{self, ToolCall, TranscriptEntry};
use crate::compressor::compress;
use crate::detector::effective_result;
use crate::error::{EngineError, EngineResult};
use crate::executor::ExecutionClient;
use crate::llm::{CompletionService, OllamaClient};
use crate::normalize::normalize_script;
use crate::store::{store_from_config, KnowledgeLoader};
use crate::synthesis::{heuristic_script, Synthesizer};
use crate::urls::UrlRewriter;

/// Default number of repair passes
pub const DEFAULT_MAX_REPAIRS: u32 = 2;

/// What to generate and how
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub test_case: TestCase,
    /// Overrides `test_case.id` for video naming
    pub test_case_id: Option<String>,
    pub app_name: Option<String>,
    pub record_video: bool,
    /// Cancel the run once this elapses
    pub deadline: Option<Duration>,
}

impl DraftRequest {
    pub fn new(test_case: TestCase) -> Self {
        Self {
            test_case,
            test_case_id: None,
            app_name: None,
            record_video: true,
            deadline: None,
        }
    }

    fn video_base(&self) -> String {
        let id = self
            .test_case_id
            .as_deref()
            .or(self.test_case.id.as_deref())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("manual");
        format!("{}_{}", id, unix_timestamp())
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Everything a run knows; threaded by value through the stages
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub case: TestCase,
    pub graph: Arc<KnowledgeGraph>,
    pub record_video: bool,
    pub video_base: String,
    pub candidate: ScriptCandidate,
    pub outcome: ExecutionOutcome,
    pub effective: EffectiveResult,
    /// Executions so far, initial run included
    pub executions: u32,
    pub repairs: Vec<RepairAttempt>,
    pub log: Vec<String>,
}

impl PipelineState {
    fn new(request: &DraftRequest, graph: Arc<KnowledgeGraph>) -> Self {
        Self {
            case: request.test_case.clone(),
            graph,
            record_video: request.record_video,
            video_base: request.video_base(),
            candidate: ScriptCandidate::new(String::new(), GenerationMode::HeuristicFallback, 0),
            outcome: ExecutionOutcome::default(),
            effective: EffectiveResult {
                success: false,
                error: None,
                attempts: 0,
            },
            executions: 0,
            repairs: Vec::new(),
            log: Vec::new(),
        }
    }

    fn video_name(&self, repair: u32) -> String {
        if repair == 0 {
            format!("{}.webm", self.video_base)
        } else {
            format!("{}_repair{}.webm", self.video_base, repair)
        }
    }
}

/// The assembled engine: LLM, executor, knowledge and URL policy
#[derive(Clone)]
pub struct Engine {
    llm: Arc<dyn CompletionService>,
    executor: ExecutionClient,
    knowledge: KnowledgeLoader,
    urls: UrlRewriter,
    synthesizer: Arc<Synthesizer>,
    max_repairs: u32,
}

impl Engine {
    pub fn new(
        llm: Arc<dyn CompletionService>,
        executor: ExecutionClient,
        knowledge: KnowledgeLoader,
        urls: UrlRewriter,
    ) -> Self {
        let synthesizer = Arc::new(Synthesizer::new(llm.clone(), executor.clone(), urls.clone()));
        Self {
            llm,
            executor,
            knowledge,
            urls,
            synthesizer,
            max_repairs: DEFAULT_MAX_REPAIRS,
        }
    }

    /// HTTP-backed engine built from configuration
    pub fn from_config(config: &PlaysmithConfig) -> EngineResult<Self> {
        let llm = Arc::new(OllamaClient::new(&config.llm)?);
        let executor = ExecutionClient::from_config(&config.executor)?;
        let knowledge = KnowledgeLoader::new(store_from_config(&config.knowledge)?);
        let urls = UrlRewriter::new(&config.app.internal_base_url)?;
        Ok(Self::new(llm, executor, knowledge, urls).with_max_repairs(config.repair.max_attempts))
    }

    pub fn with_max_repairs(mut self, max_repairs: u32) -> Self {
        self.max_repairs = max_repairs;
        self
    }

    pub fn urls(&self) -> &UrlRewriter {
        &self.urls
    }

    pub fn knowledge(&self) -> &KnowledgeLoader {
        &self.knowledge
    }

    /// Run the whole pipeline for one test case
    pub async fn generate_draft(
        &self,
        request: DraftRequest,
        cancel: &CancellationToken,
    ) -> EngineResult<AutomationDraft> {
        let span = info_span!(
            "pipeline",
            title = %request.test_case.title,
            id = ?request.test_case_id.as_deref().or(request.test_case.id.as_deref()),
        );
        let token = cancel.child_token();
        let deadline = request.deadline;
        let timer = deadline.map(|limit| {
            let t = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                t.cancel();
            })
        });

        let result = self.run(request, &token).instrument(span).await;
        if let Some(timer) = timer {
            timer.abort();
        }

        match (result, deadline) {
            (Err(EngineError::Cancelled), Some(limit)) if !cancel.is_cancelled() => Err(EngineError::Timeout {
                what: "pipeline deadline".to_string(),
                seconds: limit.as_secs(),
            }),
            (result, _) => result,
        }
    }

    async fn run(&self, request: DraftRequest, cancel: &CancellationToken) -> EngineResult<AutomationDraft> {
        let graph = self.knowledge.current(request.app_name.as_deref(), cancel).await?;
        let mut state = PipelineState::new(&request, graph);

        state = self.synthesize(state, cancel).await?;
        state = self.execute(state, 0, cancel).await?;
        while !state.effective.success && (state.repairs.len() as u32) < self.max_repairs {
            state = self.repair(state, cancel).await?;
        }

        if state.effective.success {
            info!("Pipeline passed after {} execution(s)", state.executions);
        } else {
            warn!(
                "Pipeline exhausted after {} execution(s): {}",
                state.executions,
                state.effective.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(self.build_draft(state))
    }

    /// SYNTHESIZE: LLM strategies, then the heuristic script
    async fn synthesize(&self, mut state: PipelineState, cancel: &CancellationToken) -> EngineResult<PipelineState> {
        let synthesis = self.synthesizer.synthesize(&state.case, &state.graph, cancel).await?;
        state.log.extend(synthesis.log);
        state.candidate = match synthesis.candidate {
            Some(candidate) => candidate,
            None => {
                info!("LLM produced no script, using heuristic fallback");
                state.log.push("Heuristic fallback script built from steps".to_string());
                ScriptCandidate::new(
                    heuristic_script(&state.case.steps, &self.urls),
                    GenerationMode::HeuristicFallback,
                    0,
                )
            }
        };
        Ok(state)
    }

    /// EXECUTE + VALIDATE the current candidate
    async fn execute(
        &self,
        mut state: PipelineState,
        repair: u32,
        cancel: &CancellationToken,
    ) -> EngineResult<PipelineState> {
        let video = state.video_name(repair);
        let outcome = self
            .executor
            .execute(&state.candidate.script, Some(&video), state.record_video, cancel)
            .await?;
        state.executions += 1;
        state.effective = effective_result(&outcome, state.executions);
        state.outcome = outcome;
        debug!(
            "Execution {} effective success={}",
            state.executions, state.effective.success
        );
        Ok(state)
    }

    /// REPAIR: one LLM fix attempt, executed if it produced a script.
    ///
    /// LLM failures and empty replies count as an attempt without improvement.
    async fn repair(&self, mut state: PipelineState, cancel: &CancellationToken) -> EngineResult<PipelineState> {
        let attempt = state.repairs.len() as u32 + 1;
        let prompt = self.repair_prompt(&state);

        let script = match self.llm.complete(&prompt, cancel).await {
            Ok(reply) => {
                let script = self.urls.rewrite_text(&normalize_script(&reply)).trim().to_string();
                if script.is_empty() {
                    state.log.push(format!("Repair {}: empty model output", attempt));
                }
                script
            }
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(e) => {
                warn!("Repair {} LLM call failed: {}", attempt, e);
                state.log.push(format!("Repair {}: error: {}", attempt, e));
                String::new()
            }
        };

        if script.is_empty() {
            state.repairs.push(RepairAttempt {
                attempt,
                candidate: state.candidate.clone(),
                outcome: None,
                effective: None,
            });
            return Ok(state);
        }

        if script == state.candidate.script {
            debug!("Repair {} returned the script unchanged", attempt);
        }
        state.candidate = ScriptCandidate::new(script, GenerationMode::Repaired, attempt);
        state = self.execute(state, attempt, cancel).await?;
        state.log.push(format!(
            "Repair {}: {}",
            attempt,
            if state.effective.success { "passed" } else { "still failing" }
        ));
        state.repairs.push(RepairAttempt {
            attempt,
            candidate: state.candidate.clone(),
            outcome: Some(state.outcome.clone()),
            effective: Some(state.effective.clone()),
        });
        Ok(state)
    }

    fn repair_prompt(&self, state: &PipelineState) -> String {
        let mut prompt = String::new();
        prompt.push_str("You are an expert Playwright automation engineer. A script was executed and failed. ");
        prompt.push_str("Return ONLY the corrected JavaScript code (no markdown, no fences, no explanation). ");
        prompt.push_str("The returned code should be the full test body to be executed inside `async (page) => { ... }` and should use `await page.*` statements.\n\n");
        prompt.push_str("CRITICAL RULES:\n");
        prompt.push_str("- Use Playwright locator APIs: page.locator(), page.getByRole(), page.getByText(), page.getByLabel().\n");
        prompt.push_str("- NEVER use page.evaluate() to inspect DOM elements or read className/attributes.\n");
        prompt.push_str("- SVG elements do NOT have a string className, never call .className.split().\n");
        prompt.push_str("- For reading text, use page.locator('selector').textContent() instead of page.evaluate.\n");
        prompt.push_str("- For verifying elements, use page.locator('selector').waitFor() or .isVisible().\n\n");
        prompt.push_str("=== APP KNOWLEDGE GRAPH (routes, buttons, selectors) ===\n");
        prompt.push_str(&compress(Some(&state.graph), &state.candidate.script));
        prompt.push_str("\n=== END KNOWLEDGE GRAPH ===\n\n");
        prompt.push_str(&format!("Original script:\n{}\n\n", state.candidate.script));
        if let Some(error) = state.effective.error.as_deref().filter(|e| !e.is_empty()) {
            prompt.push_str(&format!("Execution error:\n{}\n\n", error));
        }
        if !state.outcome.actions_taken.is_empty() {
            prompt.push_str(&format!("Actions/transcript:\n{}\n\n", state.outcome.actions_taken));
        }
        prompt.push_str(&format!("Context:\n{}\n\n", state.case.context_block()));
        prompt.push_str("Please make minimal edits necessary to fix the failure (selectors, waits, ordering). ");
        prompt.push_str("Replace any page.evaluate() DOM reads with page.locator() equivalents. ");
        prompt.push_str("If you cannot determine a fix, return the original script unchanged.");
        prompt
    }

    fn build_draft(&self, state: PipelineState) -> AutomationDraft {
        let now = chrono::Utc::now().to_rfc3339();
        let mode = state.candidate.mode;
        let notes = if state.effective.success {
            format!("Generated via LLM ({}) and executed on {}.", mode, now)
        } else {
            format!(
                "Generation/execution failed; returning best-effort script ({}) on {}. Error: {}",
                mode,
                now,
                state.effective.error.as_deref().unwrap_or("unknown")
            )
        };

        let video_filename = state.outcome.video_identifier.clone();
        let video = video_filename
            .as_deref()
            .filter(|_| state.effective.success && state.outcome.video_saved)
            .map(video_path);

        AutomationDraft {
            title: state.case.title.clone(),
            framework: "playwright".to_string(),
            script: state.candidate.script,
            notes,
            actions_taken: state.outcome.actions_taken.clone(),
            exec_success: state.effective.success,
            exec_error: state.effective.error,
            transcript: Some(state.outcome.actions_taken).filter(|t| !t.is_empty()),
            video_filename,
            video_path: video,
            generation_mode: mode,
            metadata: DraftMetadata {
                generated_at: now,
                model: self.llm.model().to_string(),
                generation_log: state.log,
                repair_attempts: state.repairs.len() as u32,
                attempts: state.executions,
                repairs: state.repairs,
            },
        }
    }

    /// Run a given script once, with the same normalization and detection
    pub async fn execute_adhoc(
        &self,
        script: &str,
        test_case_id: Option<&str>,
        record_video: bool,
        cancel: &CancellationToken,
    ) -> EngineResult<ExecutionReport> {
        let script = self.urls.rewrite_text(&normalize_script(script));
        let id = test_case_id.filter(|s| !s.trim().is_empty()).unwrap_or("manual");
        let video = format!("{}_{}.webm", id, unix_timestamp());

        let outcome = self.executor.execute(&script, Some(&video), record_video, cancel).await?;
        let effective = effective_result(&outcome, 1);
        let video_path = outcome
            .video_identifier
            .as_deref()
            .filter(|_| effective.success && outcome.video_saved)
            .map(video_path);

        Ok(ExecutionReport {
            exec_success: effective.success,
            exec_error: effective.error,
            actions_taken: outcome.actions_taken,
            video_filename: outcome.video_identifier,
            video_path,
            video_saved: outcome.video_saved,
        })
    }

    pub fn compile_actions(&self, actions_taken: &str) -> String {
        compile::compile_action_log(actions_taken, &self.urls)
    }

    pub fn compile_tool_calls(&self, calls: &[ToolCall]) -> String {
        compile::compile_tool_calls(calls, &self.urls)
    }

    pub fn compile_transcript(&self, entries: &[TranscriptEntry]) -> String {
        compile::compile_agent_transcript(entries, &self.urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playsmith_common::TestStep;

    #[test]
    fn test_video_names() {
        let mut request = DraftRequest::new(TestCase::new("t"));
        assert!(request.video_base().starts_with("manual_"));

        request.test_case.id = Some("tc42".to_string());
        assert!(request.video_base().starts_with("tc42_"));

        request.test_case_id = Some("override".to_string());
        let state = PipelineState::new(&request, playsmith_common::default_graph());
        assert!(state.video_name(0).starts_with("override_"));
        assert!(state.video_name(0).ends_with(".webm"));
        assert!(state.video_name(2).ends_with("_repair2.webm"));
    }

    #[test]
    fn test_state_starts_unexecuted() {
        let request = DraftRequest::new(TestCase::new("t").with_steps(vec![TestStep::new("a")]));
        let state = PipelineState::new(&request, playsmith_common::default_graph());
        assert_eq!(state.executions, 0);
        assert!(state.repairs.is_empty());
        assert!(!state.effective.success);
    }
}
