//! Client configuration with TOML/YAML support

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vlink_core::Brand;

use crate::waiter::WaitSchedule;

/// Per-account client configuration
///
/// Can be loaded from TOML, YAML, or constructed programmatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Account credentials
    pub account: AccountConfig,

    /// Vendor gateway connection
    pub connection: ConnectionConfig,

    /// Operation cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Default status-convergence schedule
    #[serde(default)]
    pub wait: WaitConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

/// Account credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub username: String,

    pub password: String,

    /// Remote command PIN
    #[serde(default)]
    pub pin: Option<String>,

    pub brand: Brand,

    /// Vendor region (e.g. "us", "ca", "eu")
    #[serde(default = "default_region")]
    pub region: String,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("pin", &self.pin.as_ref().map(|_| "<redacted>"))
            .field("brand", &self.brand)
            .field("region", &self.region)
            .finish()
    }
}

fn default_region() -> String {
    "us".to_string()
}

/// Connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the vendor gateway
    pub base_url: String,

    /// API key for the gateway (optional)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API key header name (default: X-API-Key)
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

/// Operation cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a cached read stays servable (default: 5s)
    #[serde(default = "default_ttl")]
    pub ttl_ms: u64,

    /// Interval of the background expiry sweep, 0 disables it (default: 30s)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

fn default_ttl() -> u64 {
    5_000
}

fn default_sweep_interval() -> u64 {
    30_000
}

/// Status-convergence schedule defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first poll, in seconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Delay between polls, in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_delay() -> u64 {
    10
}

fn default_retry_delay() -> u64 {
    5
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// General request timeout in milliseconds (default: 30s)
    #[serde(default = "default_request_timeout")]
    pub request_ms: u64,

    /// Connect timeout in milliseconds (default: 10s)
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_ms: default_request_timeout(),
            connect_ms: default_connect_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_connect_timeout() -> u64 {
    10_000 // 10 seconds
}

impl ClientConfig {
    /// Load configuration from a file, picking the format by extension
    /// (`.yaml`/`.yml` for YAML, anything else as TOML)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_toml(&content),
        }
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Create a builder for programmatic configuration
    pub fn builder(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        brand: Brand,
    ) -> ClientConfigBuilder {
        ClientConfigBuilder::new(base_url, username, password, brand)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache.ttl_ms)
    }

    /// Sweep interval, or `None` when sweeping is disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.cache.sweep_interval_ms > 0).then(|| Duration::from_millis(self.cache.sweep_interval_ms))
    }

    pub fn wait_schedule(&self) -> WaitSchedule {
        WaitSchedule::from_secs(
            self.wait.max_attempts,
            self.wait.initial_delay_secs,
            self.wait.retry_delay_secs,
        )
    }
}

/// Builder for ClientConfig
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        brand: Brand,
    ) -> Self {
        Self {
            config: ClientConfig {
                account: AccountConfig {
                    username: username.into(),
                    password: password.into(),
                    pin: None,
                    brand,
                    region: default_region(),
                },
                connection: ConnectionConfig {
                    base_url: base_url.into(),
                    api_key: None,
                    api_key_header: default_api_key_header(),
                },
                cache: CacheConfig::default(),
                wait: WaitConfig::default(),
                timeouts: TimeoutsConfig::default(),
            },
        }
    }

    /// Set the remote command PIN
    pub fn pin(mut self, pin: impl Into<String>) -> Self {
        self.config.account.pin = Some(pin.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.account.region = region.into();
        self
    }

    /// Set the API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.connection.api_key = Some(key.into());
        self
    }

    /// Set cache TTL in milliseconds
    pub fn cache_ttl_ms(mut self, ms: u64) -> Self {
        self.config.cache.ttl_ms = ms;
        self
    }

    /// Set sweep interval in milliseconds (0 disables)
    pub fn sweep_interval_ms(mut self, ms: u64) -> Self {
        self.config.cache.sweep_interval_ms = ms;
        self
    }

    pub fn wait(mut self, max_attempts: u32, initial_delay_secs: u64, retry_delay_secs: u64) -> Self {
        self.config.wait = WaitConfig {
            max_attempts,
            initial_delay_secs,
            retry_delay_secs,
        };
        self
    }

    /// Set request timeout in milliseconds
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.request_ms = ms;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
