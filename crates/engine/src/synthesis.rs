//! Script synthesis
//!
//! Three strategies, tried in order:
//!
//! 1. Fast path: one LLM call with the whole test case and the compressed
//!    knowledge graph.
//! 2. Step by step: one LLM call per step, each extending the script so far,
//!    optionally grounded in a live page snapshot.
//! 3. Heuristic: a deterministic script built from the step text alone.
//!
//! Only the heuristic is infallible; the controller falls back to it when the
//! LLM strategies yield nothing.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use playsmith_common::{GenerationMode, KnowledgeGraph, ScriptCandidate, TestCase, TestStep};

use crate::compile::js_single_quoted;
use crate::compressor::compress;
use crate::error::{EngineError, EngineResult};
use crate::executor::ExecutionClient;
use crate::llm::CompletionService;
use crate::normalize::{normalize_script, strip_code_fences};
use crate::urls::UrlRewriter;

/// Fast-path replies shorter than this are rejected
const MIN_FAST_PATH_CHARS: usize = 20;
const FAST_PATH_CONTEXT_CHARS: usize = 2000;
const STEP_CONTEXT_CHARS: usize = 4000;
const SNAPSHOT_PROMPT_CHARS: usize = 3000;

const OUTPUT_RULES: &str = "Output ONLY JavaScript code (no markdown, no code fences, no explanations).\n\
The code will be inserted inside `async (page) => { ... }` and executed by the browser executor.\n\
Only `page` is guaranteed to exist. Do NOT reference `context` or `browser`.\n\
Do NOT wrap your code in any function/IIFE.\n\n";

/// Script plus the log of how it was produced
#[derive(Debug, Clone)]
pub struct Synthesis {
    /// `None` when every LLM strategy came back empty
    pub candidate: Option<ScriptCandidate>,
    pub log: Vec<String>,
}

/// First `max` characters of `text`
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn or_na(text: &str) -> &str {
    if text.trim().is_empty() {
        "N/A"
    } else {
        text.trim()
    }
}

/// LLM-driven script synthesis
pub struct Synthesizer {
    llm: Arc<dyn CompletionService>,
    executor: ExecutionClient,
    urls: UrlRewriter,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn CompletionService>, executor: ExecutionClient, urls: UrlRewriter) -> Self {
        Self { llm, executor, urls }
    }

    /// Fast path, then step by step. Only cancellation is an error.
    pub async fn synthesize(
        &self,
        case: &TestCase,
        graph: &KnowledgeGraph,
        cancel: &CancellationToken,
    ) -> EngineResult<Synthesis> {
        let mut log = Vec::new();
        if case.steps.iter().all(|s| s.action_text().is_empty()) {
            log.push("No steps provided".to_string());
            return Ok(Synthesis { candidate: None, log });
        }

        if let Some(script) = self.fast_path(case, graph, cancel).await? {
            info!("Fast path produced {} chars", script.len());
            log.push("Fast-path (single-call + knowledge graph): OK".to_string());
            return Ok(Synthesis {
                candidate: Some(ScriptCandidate::new(script, GenerationMode::FastSingleCall, 0)),
                log,
            });
        }
        log.push("Fast-path: failed, falling back to step-by-step".to_string());

        let script = self.step_by_step(case, graph, &mut log, cancel).await?;
        let candidate = if script.is_empty() {
            None
        } else {
            Some(ScriptCandidate::new(script, GenerationMode::StepByStep, 0))
        };
        Ok(Synthesis { candidate, log })
    }

    /// Whole script in one call; `None` when the reply is unusable
    pub async fn fast_path(
        &self,
        case: &TestCase,
        graph: &KnowledgeGraph,
        cancel: &CancellationToken,
    ) -> EngineResult<Option<String>> {
        let prompt = self.fast_path_prompt(case, graph);
        let reply = match self.llm.complete(&prompt, cancel).await {
            Ok(reply) => reply,
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(e) => {
                warn!("Fast path LLM call failed: {}", e);
                return Ok(None);
            }
        };

        if strip_code_fences(&reply).chars().count() < MIN_FAST_PATH_CHARS {
            debug!("Fast path reply too short");
            return Ok(None);
        }
        Ok(Some(self.clean(&reply)).filter(|s| !s.is_empty()))
    }

    fn fast_path_prompt(&self, case: &TestCase, graph: &KnowledgeGraph) -> String {
        let steps_text = case.format_steps();
        let mut prompt = String::new();
        prompt.push_str("You are an expert Playwright automation engineer.\n");
        prompt.push_str("Generate a COMPLETE Playwright script for ALL of the test steps below in ONE output.\n");
        prompt.push_str(OUTPUT_RULES);
        prompt.push_str("CRITICAL RULES:\n");
        prompt.push_str("- Use page.getByRole(), page.getByText(), page.getByLabel(), page.locator(). NEVER page.evaluate().\n");
        prompt.push_str("- SVG elements have no string className.\n");
        prompt.push_str("- For navigation: await page.goto(url); await page.waitForLoadState('networkidle');\n");
        prompt.push_str("- For clicks: await page.getByRole('button', {name:'Label'}).click();\n");
        prompt.push_str("- For links: await page.getByRole('link', {name:'Label'}).click();\n");
        prompt.push_str("- Add await page.waitForTimeout(500); after interactions that trigger navigation.\n");
        prompt.push_str("- Prefer .first() when a selector may match multiple elements.\n\n");
        prompt.push_str(&format!("Docker base URL: {}\n", self.urls.origin()));
        prompt.push_str("Replace any localhost/127.0.0.1/0.0.0.0 URLs with the Docker base URL.\n\n");
        prompt.push_str("=== APPLICATION KNOWLEDGE GRAPH ===\n");
        prompt.push_str(&compress(Some(graph), &steps_text));
        prompt.push_str("\n=== END KNOWLEDGE GRAPH ===\n\n");
        prompt.push_str(&format!("Test Case: {}\n", case.title));
        prompt.push_str(&format!("Description: {}\n", or_na(&case.description)));
        prompt.push_str(&format!("Preconditions: {}\n", or_na(&case.preconditions)));
        if !case.gherkin.trim().is_empty() {
            prompt.push_str(&format!("\nGherkin/BDD Scenario:\n{}\n", case.gherkin.trim()));
        }
        prompt.push('\n');
        let context = case.context_block();
        prompt.push_str(&format!(
            "Additional context:\n{}\n\n",
            truncate_chars(&context, FAST_PATH_CONTEXT_CHARS)
        ));
        prompt.push_str(&format!("Steps to implement:\n{}\n\n", steps_text));
        prompt.push_str("Generate the COMPLETE script now.");
        prompt
    }

    /// Grow the script one step at a time; returns what accumulated
    pub async fn step_by_step(
        &self,
        case: &TestCase,
        graph: &KnowledgeGraph,
        log: &mut Vec<String>,
        cancel: &CancellationToken,
    ) -> EngineResult<String> {
        let kg_block = compress(Some(graph), &case.format_steps());
        let context = case.context_block();
        let context = if context.chars().count() > STEP_CONTEXT_CHARS {
            format!("{}\n\n[Context truncated]", truncate_chars(&context, STEP_CONTEXT_CHARS).trim_end())
        } else {
            context
        };

        let mut current = String::new();
        for (i, step) in case.steps.iter().enumerate() {
            let idx = i + 1;
            if step.action_text().is_empty() {
                continue;
            }

            let snapshot = if idx > 1 && !current.is_empty() {
                self.executor.snapshot(cancel).await?
            } else {
                None
            };

            let prompt = step_prompt(StepPrompt {
                case,
                step,
                idx,
                base_url: self.urls.origin(),
                kg_block: &kg_block,
                context: &context,
                snapshot: snapshot.as_deref(),
                current: &current,
            });

            match self.llm.complete(&prompt, cancel).await {
                Ok(reply) => {
                    let script = self.clean(&reply);
                    if script.is_empty() {
                        log.push(format!("Step {}: empty model output", idx));
                        continue;
                    }
                    current = script;
                    log.push(format!("Step {}: OK", idx));
                }
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    warn!("Step {} LLM call failed: {}", idx, e);
                    log.push(format!("Step {}: error: {}", idx, e));
                }
            }
        }
        Ok(current.trim().to_string())
    }

    /// Normalize model output and point loopback URLs at the app
    fn clean(&self, reply: &str) -> String {
        self.urls.rewrite_text(&normalize_script(reply)).trim().to_string()
    }
}

struct StepPrompt<'a> {
    case: &'a TestCase,
    step: &'a TestStep,
    idx: usize,
    base_url: &'a str,
    kg_block: &'a str,
    context: &'a str,
    snapshot: Option<&'a str>,
    current: &'a str,
}

fn step_prompt(p: StepPrompt<'_>) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are an expert Playwright automation engineer. ");
    prompt.push_str("We are building ONE Playwright script incrementally, one manual step at a time.\n\n");
    prompt.push_str(OUTPUT_RULES);
    prompt.push_str("CRITICAL RULES:\n");
    prompt.push_str("- Use page.getByRole(), page.getByText(), page.getByLabel(), page.locator(). NEVER page.evaluate().\n");
    prompt.push_str("- SVG elements have no string className.\n");
    prompt.push_str("- Prefer .first() when a selector may match multiple elements.\n");
    prompt.push_str("- Add short waits after navigation: await page.waitForLoadState('networkidle');\n\n");
    prompt.push_str(&format!("Docker base URL: {}\n", p.base_url));
    prompt.push_str("Replace any localhost/127.0.0.1 URLs with the Docker base URL.\n\n");
    prompt.push_str("=== APP KNOWLEDGE GRAPH (routes, buttons, selectors) ===\n");
    prompt.push_str(p.kg_block);
    prompt.push_str("\n=== END KNOWLEDGE GRAPH ===\n\n");
    prompt.push_str(&format!("Test Case: {}\n", p.case.title));
    prompt.push_str(&format!("Description: {}\n", or_na(&p.case.description)));
    prompt.push_str(&format!("Preconditions: {}\n", or_na(&p.case.preconditions)));
    prompt.push_str(&format!("Gherkin/BDD Scenario: {}\n\n", or_na(&p.case.gherkin)));
    if !p.context.is_empty() {
        prompt.push_str(&format!(
            "Context (may include app details, selectors, auth notes):\n{}\n\n",
            p.context
        ));
    }
    if let Some(snapshot) = p.snapshot {
        prompt.push_str("Live page element inventory (buttons, links, headings, inputs on current page):\n");
        prompt.push_str(&format!("```\n{}\n```\n\n", truncate_chars(snapshot, SNAPSHOT_PROMPT_CHARS)));
    }
    prompt.push_str("Current script so far (you MUST keep and extend it):\n");
    prompt.push_str(&format!("{}\n\n", p.current));
    prompt.push_str(&format!("Now implement Step {}: {}\n", p.idx, p.step.action_text()));
    prompt.push_str(&format!("Expected result: {}\n\n", or_na(p.step.expected_text())));
    prompt.push_str("Return the FULL updated script (including prior lines) as plain JavaScript code.");
    prompt
}

static URL_IN_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(https?://[^\s)\]}]+)").expect("valid url regex"));

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid number regex"));

/// Deterministic script from the step text alone.
///
/// Never empty: every script ends with a short wait so a recording has content.
pub fn heuristic_script(steps: &[TestStep], urls: &UrlRewriter) -> String {
    let mut lines = Vec::new();
    if steps.is_empty() {
        lines.push("// No steps provided".to_string());
    }

    for (i, step) in steps.iter().enumerate() {
        let action = step.action_text();
        if action.is_empty() {
            continue;
        }
        lines.push(format!("// Step {}: {}", i + 1, action));
        let expected = step.expected_text();
        if !expected.is_empty() {
            lines.push(format!("// Expected: {}", expected));
        }

        if let Some(m) = URL_IN_TEXT_RE.find(action) {
            lines.push(format!("await page.goto({});", js_single_quoted(&urls.rewrite_url(m.as_str()))));
            continue;
        }
        if let Some(url) = urls.find_loopback(action) {
            lines.push(format!("await page.goto({});", js_single_quoted(&url)));
            continue;
        }

        let lowered = action.to_lowercase();
        if lowered.contains("wait") {
            let ms = NUMBER_RE
                .find(&lowered)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .map(|n| if lowered.contains("second") && n < 1000 { n * 1000 } else { n })
                .unwrap_or(1000);
            lines.push(format!("await page.waitForTimeout({});", ms));
        }
    }

    lines.push("await page.waitForTimeout(1000);".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn urls() -> UrlRewriter {
        UrlRewriter::new("http://frontend:5173").unwrap()
    }

    #[test]
    fn test_truncate_chars_is_boundary_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_heuristic_navigation_and_waits() {
        let steps = vec![
            TestStep::new("Open http://localhost:5173 and click Login"),
            TestStep::new("Wait 2 seconds").expecting("Dashboard visible"),
            TestStep::new("Go to localhost:5173/Releases"),
            TestStep::new("Click Save"),
        ];
        let expected = "// Step 1: Open http://localhost:5173 and click Login\n\
                        await page.goto('http://frontend:5173');\n\
                        // Step 2: Wait 2 seconds\n\
                        // Expected: Dashboard visible\n\
                        await page.waitForTimeout(2000);\n\
                        // Step 3: Go to localhost:5173/Releases\n\
                        await page.goto('http://frontend:5173');\n\
                        // Step 4: Click Save\n\
                        await page.waitForTimeout(1000);";
        assert_eq!(heuristic_script(&steps, &urls()), expected);
    }

    #[test]
    fn test_heuristic_never_empty() {
        assert_eq!(
            heuristic_script(&[], &urls()),
            "// No steps provided\nawait page.waitForTimeout(1000);"
        );
        assert_eq!(
            heuristic_script(&[TestStep::new("   ")], &urls()),
            "await page.waitForTimeout(1000);"
        );
    }

    #[test]
    fn test_step_prompt_carries_script_and_snapshot() {
        let case = TestCase::new("Create release");
        let step = TestStep::new("Click New Release").expecting("Dialog opens");
        let prompt = step_prompt(StepPrompt {
            case: &case,
            step: &step,
            idx: 2,
            base_url: "http://frontend:5173",
            kg_block: "KG",
            context: "",
            snapshot: Some("{\"buttons\": [\"New Release\"]}"),
            current: "await page.goto('http://frontend:5173/Releases');",
        });
        assert!(prompt.contains("Current script so far (you MUST keep and extend it):\nawait page.goto('http://frontend:5173/Releases');"));
        assert!(prompt.contains("Now implement Step 2: Click New Release\nExpected result: Dialog opens"));
        assert!(prompt.contains("Live page element inventory"));
        assert!(!prompt.contains("Context (may include"));
    }
}
