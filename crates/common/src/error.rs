//! Error types for Playsmith

use thiserror::Error;

/// Result type alias using Playsmith Error
pub type Result<T> = std::result::Result<T, Error>;

/// Playsmith error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Knowledge graph not found: {0}")]
    KnowledgeNotFound(String),

    #[error("Invalid test case: {0}")]
    InvalidTestCase(String),
}
