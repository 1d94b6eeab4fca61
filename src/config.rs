use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TOKEN_URL: &str = "https://api.github.com/copilot_internal/v2/token";
pub const DEFAULT_COMPLETION_URL: &str = "https://api.githubcopilot.com/chat/completions";

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model requested from the completion endpoint
    pub model: String,

    pub temperature: f32,
    pub top_p: u32,
    pub max_tokens: u32,

    /// Identity endpoint exchanging the OAuth token for a bearer token
    pub token_url: String,

    /// Streaming chat completion endpoint
    pub completion_url: String,

    /// Copilot `hosts.json` holding the long-lived OAuth token
    pub credentials_path: PathBuf,

    pub connect_timeout_secs: u64,
    pub token_timeout_secs: u64,

    /// Longest silence tolerated between two chunks of a streamed reply
    pub read_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));

        Config {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.1,
            top_p: 1,
            max_tokens: 4096,
            token_url: DEFAULT_TOKEN_URL.to_string(),
            completion_url: DEFAULT_COMPLETION_URL.to_string(),
            credentials_path: home
                .join(".config")
                .join("github-copilot")
                .join("hosts.json"),
            connect_timeout_secs: 10,
            token_timeout_secs: 10,
            read_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Default location: `~/.copilot-chat/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".copilot-chat").join("config.toml"))
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing file means defaults; a file that exists but cannot be read
    /// or parsed is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

        tracing::debug!(path = %config_path.display(), model = %config.model, "Loaded config");
        Ok(config)
    }

    /// Apply a model given on the command line
    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        if let Some(model) = model {
            self.model = model;
        }
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn token_timeout(&self) -> Duration {
        Duration::from_secs(self.token_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model = \"gpt-4\"\nread_timeout_secs = 5").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.completion_url, DEFAULT_COMPLETION_URL);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model = [").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_model_override() {
        let config = Config::default().with_model_override(Some("gpt-4o".into()));
        assert_eq!(config.model, "gpt-4o");

        let config = Config::default().with_model_override(None);
        assert_eq!(config.model, "gpt-3.5-turbo");
    }
}
