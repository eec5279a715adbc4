//! Playsmith CLI - Main Entry Point
//!
//! Generates, executes and compiles Playwright scripts from manual test cases.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{compile, compress, config, execute, generate};
use playsmith_common::PlaysmithConfig;
use playsmith_engine::logging::init_tracing;

/// Playsmith CLI - LLM-assisted Playwright script synthesis
#[derive(Parser)]
#[command(name = "playsmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "playsmith.toml", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, run and repair a script for a test case
    Generate(generate::GenerateArgs),

    /// Run an existing script once
    Execute(execute::ExecuteArgs),

    /// Compile recorded actions into a script
    #[command(subcommand)]
    Compile(compile::CompileCommands),

    /// Show the knowledge block used in prompts
    Compress(compress::CompressArgs),

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };

    let command = match cli.command {
        Commands::Config(cmd) => {
            init_tracing(log_level, false);
            return config::execute(cmd, &cli.config, cli.format);
        }
        other => other,
    };

    let cfg = PlaysmithConfig::resolve(&cli.config)?;
    init_tracing(log_level, cfg.log.json);

    let passed = match command {
        Commands::Generate(args) => generate::execute(args, &cfg, cli.format).await?,
        Commands::Execute(args) => execute::execute(args, &cfg, cli.format).await?,
        Commands::Compile(cmd) => {
            compile::execute(cmd, &cfg, cli.format).await?;
            true
        }
        Commands::Compress(args) => {
            compress::execute(args, &cfg, cli.format).await?;
            true
        }
        Commands::Version => {
            println!("Playsmith CLI v{}", playsmith_common::VERSION);
            println!("LLM:      {} ({})", cfg.llm.url, cfg.llm.model);
            println!("Executor: {}", cfg.executor.url);
            println!("App:      {}", cfg.app.internal_base_url);
            true
        }
        Commands::Config(_) => true,
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
