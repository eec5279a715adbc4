//! Execute Command

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use playsmith_common::{ExecutionReport, PlaysmithConfig};
use playsmith_engine::Engine;

use crate::commands::cancel_on_ctrl_c;
use crate::output::{print_item, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ExecuteArgs {
    /// Script file; fences and wrapper functions are stripped
    #[arg(short, long)]
    pub script: PathBuf,

    /// Test case id used for the video name
    #[arg(long)]
    pub id: Option<String>,

    /// Do not record a video
    #[arg(long)]
    pub no_video: bool,
}

#[derive(Serialize)]
#[serde(transparent)]
struct ReportDisplay(ExecutionReport);

impl TableDisplay for ReportDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Result", "Error", "Video"]
    }

    fn row(&self) -> Vec<String> {
        let r = &self.0;
        vec![
            if r.exec_success { "passed".to_string() } else { "failed".to_string() },
            r.exec_error.clone().unwrap_or_else(|| "-".to_string()),
            r.video_path
                .clone()
                .or_else(|| r.video_filename.clone())
                .unwrap_or_else(|| "-".to_string()),
        ]
    }
}

/// Returns whether the effective result passed
pub async fn execute(args: ExecuteArgs, config: &PlaysmithConfig, format: OutputFormat) -> Result<bool> {
    let script = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read script {}", args.script.display()))?;

    let engine = Engine::from_config(config)?;
    let token = cancel_on_ctrl_c();
    let report = engine
        .execute_adhoc(&script, args.id.as_deref(), !args.no_video, &token)
        .await?;

    let passed = report.exec_success;
    let actions = report.actions_taken.clone();
    print_item(&ReportDisplay(report), format)?;
    if matches!(format, OutputFormat::Table | OutputFormat::Plain) && !actions.is_empty() {
        println!();
        println!("{}", actions);
    }
    Ok(passed)
}
