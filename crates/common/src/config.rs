//! Playsmith configuration
//!
//! Loaded from a TOML file (defaults when the file is missing), then
//! overridden from `PLAYSMITH_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaysmithConfig {
    pub llm: LlmConfig,
    pub executor: ExecutorConfig,
    pub app: AppConfig,
    pub knowledge: KnowledgeConfig,
    pub repair: RepairConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

/// LLM completion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: "http://ollama:11434".to_string(),
            model: "gpt-oss:20b".to_string(),
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

/// Browser executor service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub url: String,
    pub max_retries: u32,
    /// Per-attempt timeout is this times the attempt number
    pub base_timeout_secs: u64,
    pub max_backoff_secs: u64,
    pub max_video_bytes: u64,
    pub snapshot_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            url: "http://playwright-mcp-agent:3000".to_string(),
            max_retries: 3,
            base_timeout_secs: 15,
            max_backoff_secs: 5,
            max_video_bytes: 50_000_000,
            snapshot_timeout_secs: 10,
        }
    }
}

/// Application under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL the executor can reach; loopback URLs are rewritten to it
    pub internal_base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            internal_base_url: "http://frontend:5173".to_string(),
        }
    }
}

/// Where knowledge graphs come from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub max_attempts: u32,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

/// HTTP service listen address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub json: bool,
}

impl PlaysmithConfig {
    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load, apply environment overrides and validate
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PLAYSMITH_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PLAYSMITH_LLM_URL") {
            self.llm.url = v;
        }
        if let Some(v) = get("PLAYSMITH_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("PLAYSMITH_LLM_TEMPERATURE") {
            self.llm.temperature = parse_var("PLAYSMITH_LLM_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("PLAYSMITH_LLM_TOP_P") {
            self.llm.top_p = parse_var("PLAYSMITH_LLM_TOP_P", &v)?;
        }
        if let Some(v) = get("PLAYSMITH_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_var("PLAYSMITH_LLM_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("PLAYSMITH_LLM_TIMEOUT") {
            self.llm.timeout_secs = parse_var("PLAYSMITH_LLM_TIMEOUT", &v)?;
        }
        if let Some(v) = get("PLAYSMITH_EXECUTOR_URL") {
            self.executor.url = v;
        }
        if let Some(v) = get("PLAYSMITH_EXECUTOR_RETRIES") {
            self.executor.max_retries = parse_var("PLAYSMITH_EXECUTOR_RETRIES", &v)?;
        }
        if let Some(v) = get("PLAYSMITH_EXECUTOR_BASE_TIMEOUT") {
            self.executor.base_timeout_secs = parse_var("PLAYSMITH_EXECUTOR_BASE_TIMEOUT", &v)?;
        }
        if let Some(v) = get("PLAYSMITH_APP_BASE_URL") {
            self.app.internal_base_url = v;
        }
        if let Some(v) = get("PLAYSMITH_KNOWLEDGE_URL") {
            self.knowledge.store_url = Some(v);
        }
        if let Some(v) = get("PLAYSMITH_LOG_JSON") {
            self.log.json = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.llm.url.trim().is_empty() {
            return Err(Error::InvalidConfig("llm.url is empty".to_string()));
        }
        if self.executor.url.trim().is_empty() {
            return Err(Error::InvalidConfig("executor.url is empty".to_string()));
        }
        if self.executor.max_retries == 0 {
            return Err(Error::InvalidConfig(
                "executor.max_retries must be at least 1".to_string(),
            ));
        }
        if self.executor.base_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "executor.base_timeout_secs must be at least 1".to_string(),
            ));
        }
        url::Url::parse(&self.app.internal_base_url).map_err(|e| {
            Error::InvalidConfig(format!(
                "app.internal_base_url '{}' is not a valid URL: {}",
                self.app.internal_base_url, e
            ))
        })?;
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{} has invalid value '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlaysmithConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, PlaysmithConfig::default());
        assert_eq!(config.executor.max_retries, 3);
        assert_eq!(config.repair.max_attempts, 2);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("playsmith.toml");
        let mut config = PlaysmithConfig::default();
        config.llm.model = "llama3".to_string();
        config.knowledge.app_name = Some("Shop".to_string());
        config.save(&path).unwrap();

        let loaded = PlaysmithConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playsmith.toml");
        std::fs::write(&path, "[executor]\nurl = \"http://exec:9000\"\n").unwrap();

        let config = PlaysmithConfig::load(&path).unwrap();
        assert_eq!(config.executor.url, "http://exec:9000");
        assert_eq!(config.executor.base_timeout_secs, 15);
        assert_eq!(config.llm.model, "gpt-oss:20b");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PLAYSMITH_LLM_MODEL", "qwen"),
            ("PLAYSMITH_EXECUTOR_RETRIES", "5"),
            ("PLAYSMITH_KNOWLEDGE_URL", "http://kg:8000"),
            ("PLAYSMITH_LOG_JSON", "1"),
            ("PLAYSMITH_LLM_URL", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = PlaysmithConfig::default();
        config
            .apply_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.llm.model, "qwen");
        assert_eq!(config.executor.max_retries, 5);
        assert_eq!(config.knowledge.store_url.as_deref(), Some("http://kg:8000"));
        assert!(config.log.json);
        assert_eq!(config.llm.url, "http://ollama:11434");
    }

    #[test]
    fn test_bad_env_number_is_rejected() {
        let mut config = PlaysmithConfig::default();
        let err = config
            .apply_vars(|k| (k == "PLAYSMITH_LLM_MAX_TOKENS").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PLAYSMITH_LLM_MAX_TOKENS"));
    }

    #[test]
    fn test_validate() {
        assert!(PlaysmithConfig::default().validate().is_ok());

        let mut config = PlaysmithConfig::default();
        config.executor.max_retries = 0;
        assert!(config.validate().is_err());

        let mut config = PlaysmithConfig::default();
        config.executor.base_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("executor.base_timeout_secs"));

        let mut config = PlaysmithConfig::default();
        config.app.internal_base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
