//! Compile Commands
//!
//! Turn recorded executor output into replayable scripts without an LLM.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::de::DeserializeOwned;

use playsmith_common::PlaysmithConfig;
use playsmith_engine::compile::{compile_action_log, compile_agent_transcript, compile_tool_calls};
use playsmith_engine::{ToolCall, TranscriptEntry, UrlRewriter};

use crate::output::{print_script, OutputFormat};

#[derive(Subcommand)]
pub enum CompileCommands {
    /// Compile an executor action log
    Actions {
        /// Text file with `Action: ...` lines
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Compile a JSON list of agent tool calls
    Tools {
        /// JSON file: `[{"name": ..., "arguments": ...}]`
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Compile a JSON agent transcript
    Transcript {
        /// JSON file: `[{"role": ..., "content": ...}]`
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    serde_json::from_str(&read(path)?).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Compile the given input to a script
pub fn compile(cmd: &CompileCommands, urls: &UrlRewriter) -> Result<String> {
    Ok(match cmd {
        CompileCommands::Actions { file } => compile_action_log(&read(file)?, urls),
        CompileCommands::Tools { file } => {
            let calls: Vec<ToolCall> = read_json(file)?;
            compile_tool_calls(&calls, urls)
        }
        CompileCommands::Transcript { file } => {
            let entries: Vec<TranscriptEntry> = read_json(file)?;
            compile_agent_transcript(&entries, urls)
        }
    })
}

pub async fn execute(cmd: CompileCommands, config: &PlaysmithConfig, format: OutputFormat) -> Result<()> {
    let urls = UrlRewriter::new(&config.app.internal_base_url)?;
    print_script(&compile(&cmd, &urls)?, format)
}
