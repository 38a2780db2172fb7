use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::messaging::{LiveBackend, SessionConfig};
use crate::transport::ReconnectPolicy;

pub const API_URL_ENV: &str = "GIGCONNECT_API_URL";
pub const SOCKET_URL_ENV: &str = "GIGCONNECT_SOCKET_URL";
pub const MOCK_ENV: &str = "GIGCONNECT_MOCK";

static CONFIG_DIR_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Use `dir` instead of the platform config directory. Only the first call wins.
pub fn set_config_dir_override(dir: PathBuf) -> Result<()> {
    CONFIG_DIR_OVERRIDE
        .set(dir)
        .map_err(|dir| anyhow!("Config directory already set, ignoring {}", dir.display()))
}

pub fn config_dir() -> Result<PathBuf> {
    let dir = match CONFIG_DIR_OVERRIDE.get() {
        Some(dir) => dir.clone(),
        None => dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("gigconnect"),
    };
    if !dir.exists() {
        fs::create_dir_all(&dir).with_context(|| format!("Creating {}", dir.display()))?;
    }
    Ok(dir)
}

fn default_api_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_socket_url() -> String {
    "ws://localhost:5000".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_typing_debounce_ms() -> u64 {
    2000
}

fn default_typing_indicator_timeout_ms() -> Option<u64> {
    Some(2000)
}

fn default_notification_ttl_ms() -> u64 {
    4000
}

fn default_mock_delay_ms() -> u64 {
    400
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_socket_url")]
    pub socket_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_typing_debounce_ms")]
    pub typing_debounce_ms: u64,
    /// `null` disables the local expiry of the remote typing indicator.
    #[serde(default = "default_typing_indicator_timeout_ms")]
    pub typing_indicator_timeout_ms: Option<u64>,
    #[serde(default = "default_notification_ttl_ms")]
    pub notification_ttl_ms: u64,
    /// Unset means "mock unless an API URL was configured".
    #[serde(default)]
    pub mock: Option<bool>,
    #[serde(default = "default_mock_delay_ms")]
    pub mock_delay_ms: u64,
    #[serde(skip)]
    api_url_configured: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: default_api_url(),
            socket_url: default_socket_url(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            typing_debounce_ms: default_typing_debounce_ms(),
            typing_indicator_timeout_ms: default_typing_indicator_timeout_ms(),
            notification_ttl_ms: default_notification_ttl_ms(),
            mock: None,
            mock_delay_ms: default_mock_delay_ms(),
            api_url_configured: false,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load `config.json` from the config directory, then apply environment overrides.
    pub fn load() -> Result<Config> {
        let path = config_dir()?.join("config.json");
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Config> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        let value: serde_json::Value =
            serde_json::from_str(&contents).with_context(|| format!("Parsing {}", path.display()))?;
        let api_url_configured = value.get("api_url").is_some();

        let mut config: Config =
            serde_json::from_value(value).with_context(|| format!("Invalid config in {}", path.display()))?;
        config.api_url_configured = api_url_configured;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `GIGCONNECT_*` overrides looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_url = url;
            self.api_url_configured = true;
        }
        if let Some(url) = lookup(SOCKET_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.socket_url = url;
        }
        if let Some(flag) = lookup(MOCK_ENV).as_deref().and_then(parse_flag) {
            self.mock = Some(flag);
        }
    }

    /// Whether the offline backend should be used when the command line does not decide.
    pub fn use_mock(&self) -> bool {
        self.mock.unwrap_or(!self.api_url_configured)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            attempts: self.reconnect_attempts,
            delay: Duration::from_millis(self.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            typing_debounce: Duration::from_millis(self.typing_debounce_ms),
            typing_indicator_timeout: self.typing_indicator_timeout_ms.map(Duration::from_millis),
            notification_ttl: Duration::from_millis(self.notification_ttl_ms),
        }
    }

    pub fn live_backend(&self) -> LiveBackend {
        LiveBackend {
            api_url: self.api_url.clone(),
            socket_url: self.socket_url.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            policy: self.reconnect_policy(),
        }
    }

    pub fn mock_delay(&self) -> Duration {
        Duration::from_millis(self.mock_delay_ms)
    }
}
