use std::{env, fs, path::Path, time::Duration};

use log::{debug, error, info};
use serde::Deserialize;
use url::Url;

use crate::error::{BotError, Result};

const CONFIG_PATH_VAR: &str = "XERES_BOT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub xeres: XeresConfig,
    pub openai: OpenAiConfig,
    pub context: ContextConfig,
}

/// Connection and provisioning settings for the local Xeres node.
#[derive(Debug, Clone, Deserialize)]
pub struct XeresConfig {
    pub api_url: String,
    pub profile_name: String,
    pub location_name: String,
    #[serde(default)]
    pub friend_ids: Vec<String>,
    #[serde(default)]
    pub room_names: Vec<String>,
}

/// Completion backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    pub api_url: String,
    pub temperature: f64,
    #[serde(default)]
    pub model: Option<String>,
    /// System prompt template with `{assistant}` and `{user}` placeholders.
    pub prompt: String,
}

/// Conversation cache bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    /// Maximum number of tracked conversations.
    pub max_users: usize,
    /// Idle time in seconds after which a conversation is forgotten.
    pub max_time: u64,
    /// Number of user/assistant pairs kept per conversation.
    pub interactions: usize,
}

impl ContextConfig {
    #[must_use]
    pub fn max_idle_time(&self) -> Duration {
        Duration::from_secs(self.max_time)
    }
}

impl Config {
    /// Loads the configuration file named by `XERES_BOT_CONFIG`, or `config.json`.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(&path)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let raw = fs::read_to_string(path).map_err(|source| {
            error!(
                "Missing configuration file '{}'. Copy config.example.json to get started.",
                path.display()
            );
            BotError::ConfigFile {
                path: path.display().to_string(),
                source,
            }
        })?;

        let config = Self::from_json(&raw).map_err(|e| match e {
            BotError::Json(source) => BotError::ConfigParse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;

        info!("Configuration loaded successfully");
        debug!("Xeres API: {}", config.xeres.api_url);
        debug!("Completion backend: {}", config.openai.api_url);
        debug!(
            "Model: {}",
            config.openai.model.as_deref().unwrap_or("<backend default>")
        );
        debug!(
            "Prompt template length: {} characters",
            config.openai.prompt.len()
        );

        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.xeres.api_url)
            .map_err(|e| BotError::Config(format!("xeres.api_url is not a valid URL: {e}")))?;
        Url::parse(&self.openai.api_url)
            .map_err(|e| BotError::Config(format!("openai.api_url is not a valid URL: {e}")))?;

        if self.xeres.profile_name.trim().is_empty() {
            return Err(BotError::Config(
                "xeres.profile_name must not be empty".to_string(),
            ));
        }
        if self.context.interactions == 0 {
            return Err(BotError::Config(
                "context.interactions must be at least 1".to_string(),
            ));
        }
        if self.context.max_users == 0 {
            return Err(BotError::Config(
                "context.max_users must be at least 1".to_string(),
            ));
        }
        if self.context.max_time == 0 {
            return Err(BotError::Config(
                "context.max_time must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}
