//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.gemrelay/config.json`) and environment.
//! Built once at startup and shared read-only (behind `Arc`) with the gateway, channel, and dispatcher.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Env var holding the Telegram bot token. Overrides `channels.telegram.botToken`.
pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_TOKEN";
/// Env var holding the Gemini API key. Overrides `gemini.apiKey`.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Liveness / webhook HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Completion provider settings.
    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the liveness endpoint and webhook route (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0" so the hosting platform's health check can reach it).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_TOKEN env when set.
    pub bot_token: Option<String>,
    /// Bot API base URL (default https://api.telegram.org).
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token). Used only when webhook_url is set.
    pub webhook_secret: Option<String>,
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for TelegramChannelConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_telegram_api_base(),
            webhook_url: None,
            webhook_secret: None,
        }
    }
}

/// Gemini generateContent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    /// API key. Overridden by GEMINI_API_KEY env when set.
    pub api_key: Option<String>,
    /// API base URL (default https://generativelanguage.googleapis.com).
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    /// Model id used in the generateContent path (default "gemini-2.5-flash").
    #[serde(default = "default_gemini_model")]
    pub model: String,
    /// Request timeout in seconds for each completion call (default 60).
    #[serde(default = "default_gemini_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_gemini_timeout_secs() -> u64 {
    60
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
            timeout_secs: default_gemini_timeout_secs(),
        }
    }
}

/// The two secrets the relay cannot run without.
#[derive(Clone)]
pub struct Credentials {
    pub telegram_token: String,
    pub gemini_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("telegram_token", &"<redacted>")
            .field("gemini_api_key", &"<redacted>")
            .finish()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| non_empty(&s))
}

/// Resolve the Telegram bot token: env TELEGRAM_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    env_non_empty(TELEGRAM_TOKEN_ENV).or_else(|| {
        config
            .channels
            .telegram
            .bot_token
            .as_deref()
            .and_then(non_empty)
    })
}

/// Resolve the Gemini API key: env GEMINI_API_KEY overrides config.
pub fn resolve_gemini_api_key(config: &Config) -> Option<String> {
    env_non_empty(GEMINI_API_KEY_ENV).or_else(|| config.gemini.api_key.as_deref().and_then(non_empty))
}

/// Resolve both credentials or fail naming the one that is missing. Called before anything starts serving.
pub fn resolve_credentials(config: &Config) -> Result<Credentials> {
    let Some(telegram_token) = resolve_telegram_token(config) else {
        anyhow::bail!(
            "telegram bot token not configured (set {} or channels.telegram.botToken)",
            TELEGRAM_TOKEN_ENV
        );
    };
    let Some(gemini_api_key) = resolve_gemini_api_key(config) else {
        anyhow::bail!(
            "gemini api key not configured (set {} or gemini.apiKey)",
            GEMINI_API_KEY_ENV
        );
    };
    Ok(Credentials {
        telegram_token,
        gemini_api_key,
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("GEMRELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".gemrelay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path (or GEMRELAY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
