//! Tracing subscriber setup shared by the binaries

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_level`. A second call is a no-op.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let result = if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
