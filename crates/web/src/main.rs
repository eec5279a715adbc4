use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::info;

use playsmith_common::PlaysmithConfig;
use playsmith_engine::logging::init_tracing;
use playsmith_engine::Engine;
use playsmith_web::WebServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("PLAYSMITH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("playsmith.toml"));
    let cfg = PlaysmithConfig::resolve(&config_path)?;
    init_tracing("info", cfg.log.json);

    let web_addr: SocketAddr = std::env::var("PLAYSMITH_WEB_ADDR")
        .unwrap_or_else(|_| cfg.server.listen.clone())
        .parse()?;

    info!(
        "Starting Playsmith web service on http://{} (llm: {}, executor: {})",
        web_addr, cfg.llm.url, cfg.executor.url
    );

    let engine = Engine::from_config(&cfg)?;
    WebServer::new(engine).serve(web_addr).await
}
