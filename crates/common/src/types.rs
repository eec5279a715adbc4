//! Core types for Playsmith

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// A manual test case handed to the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCase {
    /// Identifier in the external record store, if any
    #[serde(default)]
    pub id: Option<String>,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub preconditions: String,

    /// Optional BDD scenario attached to the test case
    #[serde(default)]
    pub gherkin: String,

    #[serde(default)]
    pub steps: Vec<TestStep>,
}

/// A single manual step.
///
/// Deserializes from either `{action, expected_result}` or a bare string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StepInput")]
pub struct TestStep {
    pub action: String,
    pub expected_result: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StepInput {
    Text(String),
    Full {
        #[serde(default)]
        action: String,
        #[serde(default)]
        expected_result: Option<String>,
    },
}

impl From<StepInput> for TestStep {
    fn from(input: StepInput) -> Self {
        match input {
            StepInput::Text(action) => TestStep { action, expected_result: None },
            StepInput::Full { action, expected_result } => TestStep { action, expected_result },
        }
    }
}

impl TestStep {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            expected_result: None,
        }
    }

    pub fn expecting(mut self, expected: impl Into<String>) -> Self {
        self.expected_result = Some(expected.into());
        self
    }

    /// Trimmed action text, empty if the step carries no action
    pub fn action_text(&self) -> &str {
        self.action.trim()
    }

    /// Trimmed expected result, empty if none was given
    pub fn expected_text(&self) -> &str {
        self.expected_result.as_deref().map(str::trim).unwrap_or("")
    }
}

impl TestCase {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_steps(mut self, steps: Vec<TestStep>) -> Self {
        self.steps = steps;
        self
    }

    /// Parse a test case from YAML (JSON is a subset and parses too)
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let case: Self = serde_yaml::from_str(yaml)?;
        case.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidTestCase("title is empty".to_string()));
        }
        Ok(self)
    }

    /// Load a test case from a `.yaml`, `.yml` or `.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                let case: Self = serde_json::from_str(&content)?;
                case.validate()
            }
            _ => Self::from_yaml(&content),
        }
    }

    /// Steps rendered as a numbered list, one line per step
    pub fn format_steps(&self) -> String {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let expected = step.expected_text();
                if expected.is_empty() {
                    format!("{}. {}", i + 1, step.action_text())
                } else {
                    format!("{}. {} (Expected: {})", i + 1, step.action_text(), expected)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Readable context block describing the whole test case
    pub fn context_block(&self) -> String {
        let mut lines = vec![
            "=== TEST CASE ===".to_string(),
            format!("Title: {}", self.title),
        ];
        if !self.description.trim().is_empty() {
            lines.push(format!("Description: {}", self.description.trim()));
        }
        if !self.preconditions.trim().is_empty() {
            lines.push(format!("Preconditions: {}", self.preconditions.trim()));
        }
        if !self.gherkin.trim().is_empty() {
            lines.push(format!("Gherkin/BDD Scenario:\n{}", self.gherkin.trim()));
        }
        if !self.steps.is_empty() {
            lines.push("Steps:".to_string());
            for (i, step) in self.steps.iter().enumerate() {
                lines.push(format!("  {}. Action: {}", i + 1, step.action_text()));
                let expected = step.expected_text();
                if !expected.is_empty() {
                    lines.push(format!("     Expected: {}", expected));
                }
            }
        }
        lines.join("\n")
    }
}

/// How a script candidate was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    FastSingleCall,
    StepByStep,
    HeuristicFallback,
    Repaired,
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationMode::FastSingleCall => write!(f, "fast_single_call"),
            GenerationMode::StepByStep => write!(f, "step_by_step"),
            GenerationMode::HeuristicFallback => write!(f, "heuristic_fallback"),
            GenerationMode::Repaired => write!(f, "repaired"),
        }
    }
}

/// A canonical script plus where it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptCandidate {
    /// Bare `await page.*` statements, no fences and no wrapper
    pub script: String,
    pub mode: GenerationMode,
    /// 0 for the synthesized script, N for the Nth repair
    pub attempt: u32,
}

impl ScriptCandidate {
    pub fn new(script: impl Into<String>, mode: GenerationMode, attempt: u32) -> Self {
        Self {
            script: script.into(),
            mode,
            attempt,
        }
    }
}

/// What the executor reported for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(default)]
    pub actions_taken: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub video_saved: bool,
    #[serde(default)]
    pub video_identifier: Option<String>,
}

impl ExecutionOutcome {
    /// Outcome for a run that never produced an executor response
    pub fn failed(error: impl Into<String>, video_identifier: Option<String>) -> Self {
        Self {
            success: false,
            actions_taken: String::new(),
            error: Some(error.into()),
            video_saved: false,
            video_identifier,
        }
    }
}

/// Success after hidden-error correction; authoritative over the raw outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveResult {
    pub success: bool,
    pub error: Option<String>,
    /// Executions made so far, initial run included
    pub attempts: u32,
}

/// One pass of the repair loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairAttempt {
    /// 1-based repair number
    pub attempt: u32,
    pub candidate: ScriptCandidate,
    /// `None` when the attempt never reached the executor
    pub outcome: Option<ExecutionOutcome>,
    pub effective: Option<EffectiveResult>,
}

/// Metadata attached to a generated draft
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftMetadata {
    pub generated_at: String,
    pub model: String,
    pub generation_log: Vec<String>,
    pub repair_attempts: u32,
    pub attempts: u32,
    #[serde(default)]
    pub repairs: Vec<RepairAttempt>,
}

/// Reviewable automation produced for a test case; never persisted here
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationDraft {
    pub title: String,
    pub framework: String,
    pub script: String,
    pub notes: String,
    pub actions_taken: String,
    pub exec_success: bool,
    pub exec_error: Option<String>,
    pub transcript: Option<String>,
    pub video_filename: Option<String>,
    pub video_path: Option<String>,
    pub generation_mode: GenerationMode,
    pub metadata: DraftMetadata,
}

/// Result of a single ad-hoc script execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub exec_success: bool,
    pub exec_error: Option<String>,
    pub actions_taken: String,
    pub video_filename: Option<String>,
    pub video_path: Option<String>,
    pub video_saved: bool,
}

/// Public path under which the executor serves recorded videos
pub fn video_path(filename: &str) -> String {
    format!("/videos/{}", filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_accept_strings_and_objects() {
        let yaml = r#"
title: Login works
steps:
  - Open the login page
  - action: Click Login
    expected_result: Dashboard is shown
"#;
        let case = TestCase::from_yaml(yaml).unwrap();
        assert_eq!(case.steps.len(), 2);
        assert_eq!(case.steps[0].action, "Open the login page");
        assert_eq!(case.steps[1].expected_text(), "Dashboard is shown");
    }

    #[test]
    fn test_format_steps() {
        let case = TestCase::new("t").with_steps(vec![
            TestStep::new("Navigate to login page").expecting("Form visible"),
            TestStep::new("Click submit"),
        ]);
        assert_eq!(
            case.format_steps(),
            "1. Navigate to login page (Expected: Form visible)\n2. Click submit"
        );
    }

    #[test]
    fn test_empty_title_rejected() {
        assert!(TestCase::from_yaml("title: ''\nsteps: []").is_err());
    }

    #[test]
    fn test_context_block_skips_empty_fields() {
        let case = TestCase::new("Create release");
        let block = case.context_block();
        assert!(block.contains("Title: Create release"));
        assert!(!block.contains("Description:"));
        assert!(!block.contains("Steps:"));
    }

    #[test]
    fn test_generation_mode_serializes_snake_case() {
        let json = serde_json::to_string(&GenerationMode::HeuristicFallback).unwrap();
        assert_eq!(json, "\"heuristic_fallback\"");
        assert_eq!(GenerationMode::FastSingleCall.to_string(), "fast_single_call");
    }
}
