//! Configuration management for CDP Bridge

use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Macro for parsing environment variables with type safety and consistent error handling
macro_rules! parse_env_var {
    ($config:ident, $field:ident, $env_var:expr, $ty:ty) => {
        if let Ok(value) = env::var($env_var) {
            $config.$field = value
                .parse::<$ty>()
                .map_err(|_| Error::configuration(concat!("Invalid ", $env_var)))?;
        }
    };

    ($config:ident, $field:ident, $env_var:expr) => {
        if let Ok(value) = env::var($env_var) {
            $config.$field = value;
        }
    };

    (opt $config:ident, $field:ident, $env_var:expr) => {
        if let Ok(value) = env::var($env_var) {
            $config.$field = Some(value);
        }
    };
}

/// Which `ContextFactory` variant the tab controller is built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Drive an already-running browser extension through the CDP relay.
    Relay,
    /// Launch and drive a local Chrome/Chromium process directly.
    Persistent,
}

impl std::str::FromStr for ContextMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relay" => Ok(ContextMode::Relay),
            "persistent" => Ok(ContextMode::Persistent),
            other => Err(format!("unknown context mode: {}", other)),
        }
    }
}

/// Bridge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Which context factory variant to run
    pub mode: ContextMode,

    /// Relay server bind host
    pub relay_host: String,

    /// Relay server bind port (0 lets the OS pick a free port)
    pub relay_port: u16,

    /// Chrome executable path (persistent context only)
    pub chrome_path: Option<String>,

    /// Chrome user-data directory override (persistent context only)
    pub chrome_data_dir: Option<String>,

    /// Whether to launch Chrome headless (persistent context only)
    pub chrome_headless: bool,

    /// Default per-operation timeout in milliseconds (openTab/closeTab/etc.)
    pub default_timeout_ms: u64,

    /// Navigation timeout in milliseconds
    pub navigation_timeout_ms: u64,

    /// Number of retries when the persistent context fails with a profile-locked error
    pub profile_lock_retries: u32,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: ContextMode::Relay,
            relay_host: "127.0.0.1".to_string(),
            relay_port: 0,
            chrome_path: None,
            chrome_data_dir: None,
            chrome_headless: false,
            default_timeout_ms: 5_000,
            navigation_timeout_ms: 60_000,
            profile_lock_retries: 5,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(value) = env::var("CDP_BRIDGE_MODE") {
            config.mode = ContextMode::from_str(&value).map_err(Error::configuration)?;
        }
        parse_env_var!(config, relay_host, "CDP_BRIDGE_RELAY_HOST");
        parse_env_var!(config, relay_port, "CDP_BRIDGE_RELAY_PORT", u16);
        parse_env_var!(opt config, chrome_path, "CDP_BRIDGE_CHROME_PATH");
        parse_env_var!(opt config, chrome_data_dir, "CDP_BRIDGE_CHROME_DATA_DIR");
        parse_env_var!(config, chrome_headless, "CDP_BRIDGE_CHROME_HEADLESS", bool);
        parse_env_var!(config, default_timeout_ms, "CDP_BRIDGE_DEFAULT_TIMEOUT_MS", u64);
        parse_env_var!(config, navigation_timeout_ms, "CDP_BRIDGE_NAVIGATION_TIMEOUT_MS", u64);
        parse_env_var!(config, profile_lock_retries, "CDP_BRIDGE_PROFILE_LOCK_RETRIES", u32);
        parse_env_var!(config, log_level, "CDP_BRIDGE_LOG_LEVEL");

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.relay_host, "127.0.0.1");
        assert_eq!(config.relay_port, 0);
        assert_eq!(config.default_timeout_ms, 5_000);
    }

    #[test]
    fn test_from_file() {
        let toml = r#"
            mode = "relay"
            relay_host = "0.0.0.0"
            relay_port = 9999
            chrome_headless = false
            default_timeout_ms = 1000
            navigation_timeout_ms = 2000
            profile_lock_retries = 3
            log_level = "debug"
        "#;
        let dir = std::env::temp_dir().join(format!("cdp-bridge-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, toml).unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.relay_host, "0.0.0.0");
        assert_eq!(config.relay_port, 9999);

        std::fs::remove_dir_all(&dir).ok();
    }
}
