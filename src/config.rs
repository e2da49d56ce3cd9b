//! Configuration loading and management for threadscribe.
//!
//! Loads settings from `threadscribe.toml` with environment variable overrides for credentials.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE: &str = "threadscribe.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("missing required credential: {0}")]
    MissingCredential(String),
}

/// Language model endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
    /// Model used for per-batch thread summaries
    pub summary_model: String,
    /// Model used for the final report
    pub report_model: String,
    /// HTTP timeout applied by the client, not by the pipeline
    pub request_timeout_secs: u64,
}

/// Reddit endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub user_agent: String,
    /// Token endpoint for app-only OAuth
    pub auth_url: String,
    /// Base URL for authenticated API calls
    pub api_url: String,
    pub request_timeout_secs: u64,
}

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub batch_size: usize,
    /// Pause between summarisation batches, in milliseconds
    pub batch_pause_ms: u64,
    /// Character budget for the report corpus
    pub corpus_budget: usize,
    /// Where run artifacts are written
    pub output_dir: PathBuf,
}

/// Credentials (normally loaded from environment)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub openai_key: Option<String>,
    #[serde(default)]
    pub reddit_client_id: Option<String>,
    #[serde(default)]
    pub reddit_client_secret: Option<String>,
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::parse_file(&path)?,
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::parse_file(path)?;
        config.apply_env();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Override credentials from environment variables
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.api.openai_key = Some(key);
        }
        if let Ok(id) = std::env::var("REDDIT_CLIENT_ID") {
            self.api.reddit_client_id = Some(id);
        }
        if let Ok(secret) = std::env::var("REDDIT_CLIENT_SECRET") {
            self.api.reddit_client_secret = Some(secret);
        }
        if let Ok(agent) = std::env::var("REDDIT_USER_AGENT") {
            self.reddit.user_agent = agent;
        }
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        // Check current directory first
        let local_config = PathBuf::from(CONFIG_FILE);
        if local_config.exists() {
            return Some(local_config);
        }

        // Check home directory
        dirs::home_dir()
            .map(|home| home.join(".config").join("threadscribe").join(CONFIG_FILE))
            .filter(|path| path.exists())
    }

    pub fn openai_key(&self) -> Result<&str, ConfigError> {
        non_empty(self.api.openai_key.as_deref(), "OPENAI_API_KEY")
    }

    /// Reddit app credentials as (client id, client secret)
    pub fn reddit_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let id = non_empty(self.api.reddit_client_id.as_deref(), "REDDIT_CLIENT_ID")?;
        let secret = non_empty(
            self.api.reddit_client_secret.as_deref(),
            "REDDIT_CLIENT_SECRET",
        )?;
        Ok((id, secret))
    }
}

fn non_empty<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingCredential(name.to_string()))
}

impl LlmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RedditConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ResearchConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            summary_model: "o3".to_string(),
            report_model: "o3".to_string(),
            request_timeout_secs: 600,
        }
    }
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("threadscribe/", env!("CARGO_PKG_VERSION")).to_string(),
            auth_url: "https://www.reddit.com/api/v1/access_token".to_string(),
            api_url: "https://oauth.reddit.com".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::summarize::DEFAULT_BATCH_SIZE,
            batch_pause_ms: 500,
            corpus_budget: crate::report::CORPUS_BUDGET,
            output_dir: PathBuf::from("./research"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[llm]\nsummary_model = \"gpt-4o-mini\"\n\n[research]\nbatch_size = 4"
        )
        .unwrap();

        let config = Config::parse_file(file.path()).unwrap();
        assert_eq!(config.llm.summary_model, "gpt-4o-mini");
        assert_eq!(config.llm.report_model, "o3");
        assert_eq!(config.research.batch_size, 4);
        assert_eq!(config.research.corpus_budget, 15_000);
        assert_eq!(config.reddit.api_url, "https://oauth.reddit.com");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[llm\nbase_url = ").unwrap();
        assert!(matches!(
            Config::parse_file(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn blank_credentials_are_missing() {
        let mut config = Config::default();
        config.api.openai_key = Some("  ".to_string());
        assert!(matches!(
            config.openai_key(),
            Err(ConfigError::MissingCredential(name)) if name == "OPENAI_API_KEY"
        ));

        config.api.reddit_client_id = Some("id".to_string());
        config.api.reddit_client_secret = Some("secret".to_string());
        assert_eq!(config.reddit_credentials().unwrap(), ("id", "secret"));
    }
}
