//! Configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub extensions: ExtensionsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatewayKind {
    Console,
    Telegram,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GatewayConfig {
    pub kind: GatewayKind,
    pub reconnect_delay_secs: u64,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

impl GatewayConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TelegramConfig {
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool_size: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityConfig {
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtensionsConfig {
    pub enabled: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "warden-bot".to_string(),
                prefix: "!".to_string(),
            },
            gateway: GatewayConfig {
                kind: GatewayKind::Console,
                reconnect_delay_secs: 5,
                telegram: Some(TelegramConfig { token: None }),
            },
            database: DatabaseConfig {
                path: PathBuf::from("warden-bot.db"),
                pool_size: 4,
            },
            security: SecurityConfig {
                rate_limit: RateLimitConfig {
                    enabled: true,
                    max_requests: 5,
                    window_seconds: 10,
                },
            },
            extensions: ExtensionsConfig {
                enabled: vec!["core".to_string(), "audit-log".to_string()],
            },
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Environment variables win over file values
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("BOT_TOKEN") {
            self.set_telegram_token(token);
        }

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            self.bot.prefix = prefix;
        }

        if let Ok(path) = std::env::var("WARDEN_DATABASE") {
            self.database.path = PathBuf::from(path);
        }

        if let Ok(delay) = std::env::var("WARDEN_RECONNECT_DELAY_SECS") {
            match delay.parse() {
                Ok(secs) => self.gateway.reconnect_delay_secs = secs,
                Err(_) => tracing::warn!("Ignoring invalid WARDEN_RECONNECT_DELAY_SECS: {}", delay),
            }
        }
    }

    /// Providing a token switches the gateway to Telegram
    pub fn set_telegram_token(&mut self, token: impl Into<String>) {
        self.gateway.kind = GatewayKind::Telegram;
        self.gateway.telegram = Some(TelegramConfig {
            token: Some(token.into()),
        });
    }

    pub fn telegram_token(&self) -> Option<&str> {
        self.gateway.telegram.as_ref().and_then(|t| t.token.as_deref())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.pool_size == 0 {
            return Err(ConfigError::InvalidValue("database.pool-size must be at least 1".to_string()));
        }
        if self.gateway.reconnect_delay_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "gateway.reconnect-delay-secs must be at least 1".to_string(),
            ));
        }
        if self.gateway.kind == GatewayKind::Telegram && self.telegram_token().is_none() {
            return Err(ConfigError::MissingField("gateway.telegram.token".to_string()));
        }
        if self.security.rate_limit.enabled && self.security.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidValue(
                "security.rate-limit.max-requests must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
