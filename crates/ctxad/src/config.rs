//! Daemon configuration
//!
//! Values come from an optional TOML file and are then overridden by
//! `CTXA_*` environment variables. A malformed override is a startup error,
//! never silently ignored.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use ctxa_api::ApiConfig;
use ctxa_core::{AdapterMode, EntityAttributeScheme, FiwareHeaders};
use serde::Deserialize;

/// Adapter HTTP server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_path: String,
    pub callback_path: String,
    /// Externally reachable base URL, used to build the callback URL
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9999,
            base_path: "/v1".to_string(),
            callback_path: "/callback".to_string(),
            public_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub base_path: String,
    pub timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1026,
            base_path: "/v1".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Fiware headers assumed when a callback does not carry them
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub service: String,
    pub service_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            service: "blackbutton".to_string(),
            service_path: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EntitiesConfig {
    pub button_type: String,
    pub service_type: String,
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            button_type: "BlackButton".to_string(),
            service_type: "service".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}', expected 'text' or 'json'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    /// Seconds between request-count heartbeats; 0 disables them
    pub heartbeat_secs: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            heartbeat_secs: 60,
        }
    }
}

/// Top-level daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub mode: AdapterMode,
    pub adapter: ServerConfig,
    pub broker: BrokerConfig,
    pub defaults: DefaultsConfig,
    pub entities: EntitiesConfig,
    pub log: LogConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            mode: AdapterMode::ContextProvider,
            adapter: ServerConfig::default(),
            broker: BrokerConfig::default(),
            defaults: DefaultsConfig::default(),
            entities: EntitiesConfig::default(),
            log: LogConfig::default(),
        }
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid value '{}' for {}: {}", raw, name, e))
}

impl AdapterConfig {
    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file '{}'", path))
    }

    /// Apply `CTXA_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        macro_rules! override_with {
            ($name:literal, $field:expr) => {
                if let Some(raw) = lookup($name) {
                    $field = parse_var($name, &raw)?;
                }
            };
        }

        override_with!("CTXA_MODE", self.mode);
        override_with!("CTXA_ADAPTER_HOST", self.adapter.host);
        override_with!("CTXA_ADAPTER_PORT", self.adapter.port);
        override_with!("CTXA_ADAPTER_BASE_PATH", self.adapter.base_path);
        override_with!("CTXA_CALLBACK_PATH", self.adapter.callback_path);
        if let Some(raw) = lookup("CTXA_PUBLIC_URL") {
            self.adapter.public_url = Some(raw).filter(|url| !url.is_empty());
        }
        override_with!("CTXA_BROKER_HOST", self.broker.host);
        override_with!("CTXA_BROKER_PORT", self.broker.port);
        override_with!("CTXA_BROKER_BASE_PATH", self.broker.base_path);
        override_with!("CTXA_BROKER_TIMEOUT_MS", self.broker.timeout_ms);
        override_with!("CTXA_DEFAULT_SERVICE", self.defaults.service);
        override_with!("CTXA_DEFAULT_SERVICE_PATH", self.defaults.service_path);
        override_with!("CTXA_BUTTON_TYPE", self.entities.button_type);
        override_with!("CTXA_SERVICE_TYPE", self.entities.service_type);
        override_with!("CTXA_LOG_LEVEL", self.log.level);
        override_with!("CTXA_LOG_FORMAT", self.log.format);
        override_with!("CTXA_HEARTBEAT_SECS", self.log.heartbeat_secs);

        Ok(())
    }

    pub fn scheme(&self) -> EntityAttributeScheme {
        EntityAttributeScheme::new(
            self.mode,
            self.entities.button_type.clone(),
            self.entities.service_type.clone(),
        )
    }

    pub fn api(&self) -> ApiConfig {
        ApiConfig {
            base_path: self.adapter.base_path.clone(),
            callback_path: self.adapter.callback_path.clone(),
            default_headers: FiwareHeaders::new(
                self.defaults.service.clone(),
                self.defaults.service_path.clone(),
            ),
        }
    }

    /// Base URL of the broker's NGSI v1 API
    pub fn broker_url(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.broker.host, self.broker.port, self.broker.base_path
        )
    }

    pub fn broker_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.timeout_ms)
    }

    /// URL third parties call back on
    pub fn callback_url(&self) -> String {
        let base = self
            .adapter
            .public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.adapter.host, self.adapter.port));
        format!("{}{}", base.trim_end_matches('/'), self.api().callback_route())
    }

    /// Filter directive for the adapter's own crates at the configured level
    pub fn log_directive(&self) -> String {
        ["ctxad", "ctxa_api", "ctxa_orchestrator", "ctxa_client"]
            .iter()
            .map(|target| format!("{}={}", target, self.log.level))
            .collect::<Vec<_>>()
            .join(",")
    }
}
