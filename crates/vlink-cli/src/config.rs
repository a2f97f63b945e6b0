//! Configuration file handling for vlink

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vlink_client::config::{CacheConfig, WaitConfig};
use vlink_client::ClientConfig;
use vlink_core::Brand;

const DEFAULT_SERVER: &str = "https://gateway.example.com";

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Vendor gateway URL
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Remote command PIN
    pub pin: Option<String>,
    pub brand: Option<Brand>,
    pub region: Option<String>,
    pub api_key: Option<String>,
    /// Directory for tokens and vehicle records
    pub data_dir: Option<PathBuf>,
    /// Disable colored output
    pub no_color: Option<bool>,
    pub cache: Option<CacheConfig>,
    pub wait: Option<WaitConfig>,
}

/// Account options given on the command line
#[derive(Debug, Clone, Default)]
pub struct AccountArgs {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub pin: Option<String>,
    pub brand: Option<Brand>,
    pub region: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("vlink");

        Ok(config_dir.join("config.toml"))
    }

    fn default_data_dir() -> Result<PathBuf> {
        Ok(dirs::data_dir()
            .context("Could not determine data directory")?
            .join("vlink"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(&self, args: AccountArgs, no_color: bool) -> Result<MergedConfig> {
        let username = args
            .username
            .or_else(|| self.username.clone())
            .context("No username given (use --username or set it in the config file)")?;
        let password = args
            .password
            .or_else(|| self.password.clone())
            .context("No password given (use --password, VLINK_PASSWORD, or the config file)")?;
        let brand = args.brand.or(self.brand).unwrap_or(Brand::Hyundai);
        let server = args
            .server
            .or_else(|| self.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());

        let mut builder = ClientConfig::builder(server, username, password, brand);
        if let Some(pin) = args.pin.or_else(|| self.pin.clone()) {
            builder = builder.pin(pin);
        }
        if let Some(region) = args.region.or_else(|| self.region.clone()) {
            builder = builder.region(region);
        }
        if let Some(key) = &self.api_key {
            builder = builder.api_key(key.clone());
        }

        let mut client = builder.build();
        if let Some(cache) = &self.cache {
            client.cache = cache.clone();
        }
        if let Some(wait) = &self.wait {
            client.wait = wait.clone();
        }

        let data_dir = match args.data_dir.or_else(|| self.data_dir.clone()) {
            Some(dir) => dir,
            None => Self::default_data_dir()?,
        };

        Ok(MergedConfig {
            client,
            data_dir,
            no_color: no_color || self.no_color.unwrap_or(false),
        })
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub client: ClientConfig,
    pub data_dir: PathBuf,
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file_config() -> Config {
        toml::from_str(
            r#"
            server = "https://file.example.com"
            username = "file-user"
            password = "file-pass"
            brand = "kia"
            data_dir = "/tmp/vlink-test"

            [wait]
            max_attempts = 4
            initial_delay_secs = 2
            retry_delay_secs = 3
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_args_override_file() {
        let args = AccountArgs {
            server: Some("http://localhost:9000".into()),
            pin: Some("4321".into()),
            ..Default::default()
        };
        let merged = file_config().merge_with_args(args, false).unwrap();

        assert_eq!(merged.client.connection.base_url, "http://localhost:9000");
        assert_eq!(merged.client.account.username, "file-user");
        assert_eq!(merged.client.account.brand, Brand::Kia);
        assert_eq!(merged.client.account.pin.as_deref(), Some("4321"));
        assert_eq!(merged.client.wait.max_attempts, 4);
        assert_eq!(merged.data_dir, PathBuf::from("/tmp/vlink-test"));
        assert!(!merged.no_color);
    }

    #[test]
    fn test_missing_credentials() {
        let err = Config::default()
            .merge_with_args(AccountArgs::default(), false)
            .unwrap_err();
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn test_no_color_from_file() {
        let config = Config {
            no_color: Some(true),
            ..file_config()
        };
        let merged = config.merge_with_args(AccountArgs::default(), false).unwrap();
        assert!(merged.no_color);
    }
}
