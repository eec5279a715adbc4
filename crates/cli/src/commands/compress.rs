//! Compress Command
//!
//! Prints the knowledge block a synthesis prompt would carry.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use playsmith_common::PlaysmithConfig;
use playsmith_engine::compressor::compress;
use playsmith_engine::store::{store_from_config, KnowledgeLoader};
use playsmith_engine::CancellationToken;

use crate::output::{render_structured, OutputFormat};

#[derive(Args)]
pub struct CompressArgs {
    /// Step text used to pick relevant pages
    #[arg(long, default_value = "")]
    pub steps: String,

    /// Knowledge graph to use, by application name
    #[arg(long)]
    pub app: Option<String>,
}

#[derive(Serialize)]
struct CompressOutput<'a> {
    app_name: &'a str,
    block: &'a str,
}

pub async fn execute(args: CompressArgs, config: &PlaysmithConfig, format: OutputFormat) -> Result<()> {
    let loader = KnowledgeLoader::new(store_from_config(&config.knowledge)?);
    let app = args.app.or_else(|| config.knowledge.app_name.clone());
    let graph = loader.refresh(app.as_deref(), &CancellationToken::new()).await?;
    let block = compress(Some(&graph), &args.steps);

    match format {
        OutputFormat::Table | OutputFormat::Plain => println!("{}", block),
        _ => println!(
            "{}",
            render_structured(
                &CompressOutput {
                    app_name: &graph.app_name,
                    block: &block,
                },
                format
            )?
        ),
    }
    Ok(())
}
