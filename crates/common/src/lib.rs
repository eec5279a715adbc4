//! Playsmith Common Library
//!
//! Shared types, knowledge graph model and configuration for Playsmith.

pub mod config;
pub mod error;
pub mod knowledge;
pub mod types;

// Re-export commonly used types
pub use config::PlaysmithConfig;
pub use error::{Error, Result};
pub use knowledge::{
    default_graph, global_cache, KnowledgeCache, KnowledgeDocument, KnowledgeGraph, NavItem,
    PageInfo,
};
pub use types::*;

/// Playsmith version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
