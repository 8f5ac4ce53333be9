use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the config file looked up in the current directory.
pub const CONFIG_FILE: &str = ".dev-agent.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .dev-agent.toml.
/// All fields are optional; secrets and the repository can come from the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// GitHub repository and API settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Text-generation provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Commit identity and branch defaults
    #[serde(default)]
    pub git: GitConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// Repository owner. If None, falls back to GITHUB_REPO_OWNER env var.
    pub owner: Option<String>,
    /// Repository name. If None, falls back to GITHUB_REPO_NAME env var.
    pub repo: Option<String>,
    pub api_url: String,
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            owner: None,
            repo: None,
            api_url: "https://api.github.com".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key. If None, falls back to OPENAI_API_KEY env var.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Total provider calls allowed per review comment
    pub max_attempts: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_attempts: 3,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub default_branch: String,
    pub author_name: String,
    pub author_email: String,
    pub remote: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            author_name: "Dev Agent".to_string(),
            author_email: "dev-agent@example.com".to_string(),
            remote: "origin".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from .dev-agent.toml in the current
    /// directory when no path is given. A missing default file yields the
    /// default config; environment variables fill any unset secrets.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let default_path = Path::new(CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from(default_path)?
                } else {
                    Config::default()
                }
            }
        };

        config.apply_env();
        Ok(config)
    }

    /// Load from a specific path without consulting the environment.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        fill_from_env(&mut self.github.token, "GITHUB_TOKEN");
        fill_from_env(&mut self.github.owner, "GITHUB_REPO_OWNER");
        fill_from_env(&mut self.github.repo, "GITHUB_REPO_NAME");
        fill_from_env(&mut self.llm.api_key, "OPENAI_API_KEY");
    }
}

fn fill_from_env(slot: &mut Option<String>, var: &str) {
    if slot.is_none() {
        *slot = std::env::var(var).ok().filter(|value| !value.is_empty());
    }
}
