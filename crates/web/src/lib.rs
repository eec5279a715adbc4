//! Playsmith Web Service
//!
//! HTTP endpoints for draft generation, ad-hoc execution, script
//! compilation and knowledge refresh.

pub mod error;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::WebServer;
