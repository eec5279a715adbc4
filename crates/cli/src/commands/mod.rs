//! CLI Commands

pub mod compile;
pub mod compress;
pub mod config;
pub mod execute;
pub mod generate;

use playsmith_engine::CancellationToken;
use tracing::warn;

/// Token cancelled on the first Ctrl-C
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            child.cancel();
        }
    });
    token
}
