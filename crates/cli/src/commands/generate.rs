//! Generate Command
//!
//! Runs the full synthesize/execute/repair pipeline for one test case file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use playsmith_common::{AutomationDraft, PlaysmithConfig, TestCase};
use playsmith_engine::{DraftRequest, Engine};

use crate::commands::cancel_on_ctrl_c;
use crate::output::{print_error, print_item, print_success, print_warning, render_structured, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct GenerateArgs {
    /// Test case file (.yaml, .yml or .json)
    #[arg(short, long)]
    pub testcase: PathBuf,

    /// Knowledge graph to use, by application name
    #[arg(long)]
    pub app: Option<String>,

    /// Test case id used for video names
    #[arg(long)]
    pub id: Option<String>,

    /// Do not record a video
    #[arg(long)]
    pub no_video: bool,

    /// Give up after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Also write the final script to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Draft summary row
#[derive(Serialize)]
pub struct DraftSummary {
    pub title: String,
    pub mode: String,
    pub passed: bool,
    pub attempts: u32,
    pub repairs: u32,
    pub video: String,
}

impl From<&AutomationDraft> for DraftSummary {
    fn from(draft: &AutomationDraft) -> Self {
        Self {
            title: draft.title.clone(),
            mode: draft.generation_mode.to_string(),
            passed: draft.exec_success,
            attempts: draft.metadata.attempts,
            repairs: draft.metadata.repair_attempts,
            video: draft.video_path.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

impl TableDisplay for DraftSummary {
    fn headers() -> Vec<&'static str> {
        vec!["Title", "Mode", "Result", "Attempts", "Repairs", "Video"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.title.clone(),
            self.mode.clone(),
            if self.passed { "passed".to_string() } else { "failed".to_string() },
            self.attempts.to_string(),
            self.repairs.to_string(),
            self.video.clone(),
        ]
    }
}

fn build_request(args: &GenerateArgs, case: TestCase) -> DraftRequest {
    let mut request = DraftRequest::new(case);
    request.test_case_id = args.id.clone();
    request.app_name = args.app.clone();
    request.record_video = !args.no_video;
    request.deadline = args.deadline_secs.map(Duration::from_secs);
    request
}

/// Returns whether the effective result passed
pub async fn execute(args: GenerateArgs, config: &PlaysmithConfig, format: OutputFormat) -> Result<bool> {
    let case = TestCase::from_file(&args.testcase)
        .with_context(|| format!("Failed to read test case {}", args.testcase.display()))?;

    let mut request = build_request(&args, case);
    if request.app_name.is_none() {
        request.app_name = config.knowledge.app_name.clone();
    }

    let engine = Engine::from_config(config)?;
    let token = cancel_on_ctrl_c();
    let draft = engine.generate_draft(request, &token).await?;

    if let Some(path) = &args.output {
        std::fs::write(path, &draft.script)
            .with_context(|| format!("Failed to write script to {}", path.display()))?;
    }

    match format {
        OutputFormat::Json | OutputFormat::Yaml => println!("{}", render_structured(&draft, format)?),
        OutputFormat::Table | OutputFormat::Plain => {
            print_item(&DraftSummary::from(&draft), format)?;
            println!();
            println!("{}", "Script:".bold());
            println!("{}", draft.script);
            println!();
            for line in &draft.metadata.generation_log {
                println!("  {} {}", "•".dimmed(), line);
            }
            if draft.exec_success && draft.metadata.repair_attempts > 0 {
                print_warning(&format!(
                    "Script passed after {} repair attempt(s)",
                    draft.metadata.repair_attempts
                ));
            } else if draft.exec_success {
                print_success("Script passed");
            } else {
                print_error(&format!(
                    "Script failed: {}",
                    draft.exec_error.as_deref().unwrap_or("unknown error")
                ));
            }
        }
    }

    Ok(draft.exec_success)
}
