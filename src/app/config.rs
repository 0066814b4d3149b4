use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    CONFIG_ENV_PREFIX, CORE_PROMPT_ENV, DEFAULT_API_KEY_ENV, DEFAULT_COMPLETION_API_URL,
    DEFAULT_COMPLETION_MODEL, DEFAULT_CONTEXT_WINDOW, DEFAULT_EXPLORER_URL,
    DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_CONTEXT_MESSAGES, DEFAULT_MAX_TOKENS,
    DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT, HTTP_REQUEST_TIMEOUT_SECS,
};
use crate::utils::PaychatError;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Completion backend settings
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Conversation and context settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Relay endpoint settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Completion backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Chat completions endpoint
    pub api_url: String,
    /// Model name sent with every request
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// Environment variable containing the API key
    pub api_key_env: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_COMPLETION_API_URL.to_string(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: HTTP_REQUEST_TIMEOUT_SECS,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

/// Conversation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// System prompt sent first on every turn (empty = none)
    pub core_prompt: String,
    /// Number of prior exchanges sent as context
    pub context_window: usize,
    /// Hard cap on messages per upstream request
    pub max_context_messages: usize,
    /// Where the session is persisted (defaults to the platform data dir)
    pub data_dir: Option<PathBuf>,
    /// Block explorer prefix for payment references
    pub explorer_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            core_prompt: String::new(),
            context_window: DEFAULT_CONTEXT_WINDOW,
            max_context_messages: DEFAULT_MAX_CONTEXT_MESSAGES,
            data_dir: None,
            explorer_url: DEFAULT_EXPLORER_URL.to_string(),
        }
    }
}

/// Relay endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Config {
    /// Read the completion API key; missing or blank is fatal at startup
    pub fn api_key(&self) -> Result<String, PaychatError> {
        let env_name = &self.upstream.api_key_env;
        match std::env::var(env_name) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(PaychatError::MissingApiKey(env_name.clone())),
        }
    }

    /// Directory holding the persisted session
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.session.data_dir {
            return Ok(dir.clone());
        }
        if let Some(proj_dirs) = ProjectDirs::from("", "", "paychat") {
            Ok(proj_dirs.data_dir().to_path_buf())
        } else {
            Ok(home_dir()?.join(".local").join("share").join("paychat"))
        }
    }

    fn validate(self) -> Result<Self> {
        if self.session.max_context_messages == 0 {
            anyhow::bail!(PaychatError::Config(
                "session.max_context_messages must be at least 1".to_string()
            ));
        }
        if self.upstream.timeout_secs == 0 {
            anyhow::bail!(PaychatError::Config(
                "upstream.timeout_secs must be at least 1".to_string()
            ));
        }
        Ok(self)
    }
}

/// Build the layered figment: defaults, global file, local file, environment
fn figment_for(files: &[PathBuf]) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    for file in files {
        if file.exists() {
            figment = figment.merge(Toml::file(file));
        }
    }

    // PAYCHAT_SESSION__CONTEXT_WINDOW=2 style overrides
    figment = figment.merge(Env::prefixed(CONFIG_ENV_PREFIX).split("__"));

    // Bare CORE_PROMPT is honoured for compatibility with existing deployments
    figment.merge(
        Env::raw()
            .only(&[CORE_PROMPT_ENV])
            .map(|_| "session.core_prompt".into()),
    )
}

/// Load configuration from multiple sources
pub fn load_config() -> Result<Config> {
    let global_config = get_config_dir()?.join("config.toml");
    let local_config = PathBuf::from(".paychat/config.toml");

    figment_for(&[global_config, local_config])
        .extract::<Config>()
        .context("Failed to load configuration")?
        .validate()
}

/// Load configuration from an explicit file, still honouring the environment
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    figment_for(&[path.to_path_buf()])
        .extract::<Config>()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        .validate()
}

fn home_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home))
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "paychat") {
        Ok(proj_dirs.config_dir().to_path_buf())
    } else {
        Ok(home_dir()?.join(".config").join("paychat"))
    }
}

/// Save configuration to file
pub fn save_config(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => get_config_dir()?.join("config.toml"),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_string)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

/// Create a default configuration file if it doesn't exist
pub fn init_config() -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();

    let config_file = get_config_dir()?.join("config.toml");
    if !config_file.exists() {
        save_config(&Config::default(), Some(config_file.clone()))?;
        created.push(config_file);
    }

    // Create example local config
    let local_example = PathBuf::from(".paychat/config.toml.example");
    if !local_example.exists() {
        if let Some(parent) = local_example.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let example_config = r#"# Paychat Project Configuration
# This file overrides global settings for this directory.
# The API key is never read from here: export COMPLETION_API_KEY instead.

[upstream]
model = "gpt-3.5-turbo"
max_tokens = 2000

[session]
core_prompt = "You are helpful."
context_window = 1
max_context_messages = 4

[server]
port = 8888
"#;
        std::fs::write(&local_example, example_config)?;
        created.push(local_example);
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.upstream.model, "gpt-3.5-turbo");
        assert_eq!(config.upstream.max_tokens, 2000);
        assert_eq!(config.upstream.api_key_env, "COMPLETION_API_KEY");
        assert_eq!(config.session.core_prompt, "");
        assert_eq!(config.session.context_window, 1);
        assert_eq!(config.session.max_context_messages, 4);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[session]\ncontext_window = 2\nmax_context_messages = 6\n\n[upstream]\nmodel = \"gpt-4o\"\n",
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.session.context_window, 2);
        assert_eq!(config.session.max_context_messages, 6);
        assert_eq!(config.upstream.model, "gpt-4o");
        // Untouched sections keep their defaults
        assert_eq!(config.upstream.max_tokens, 2000);
        assert_eq!(config.server.port, 8888);
    }

    #[test]
    fn test_zero_max_messages_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[session]\nmax_context_messages = 0\n").unwrap();
        assert!(load_config_from(&path).is_err());
    }

    #[test]
    fn test_missing_api_key_is_an_error() {
        let mut config = Config::default();
        config.upstream.api_key_env = "PAYCHAT_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        assert!(matches!(
            config.api_key(),
            Err(PaychatError::MissingApiKey(name)) if name == "PAYCHAT_TEST_KEY_THAT_IS_NEVER_SET"
        ));
    }

    #[test]
    fn test_save_config_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.session.core_prompt = "Be brief.".to_string();
        save_config(&config, Some(path.clone())).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.session.core_prompt, "Be brief.");
    }

    #[test]
    fn test_explicit_data_dir_wins() {
        let mut config = Config::default();
        config.session.data_dir = Some(PathBuf::from("/tmp/paychat-test"));
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/paychat-test"));
    }
}
