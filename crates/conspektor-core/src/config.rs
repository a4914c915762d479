//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/conspektor/config.toml)
//! 3. Environment variables (CONSPEKTOR_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "CONSPEKTOR";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for local data (logs)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// REST gateway base URL
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Collaboration hub WebSocket base URL
    #[serde(default = "default_hub_url")]
    pub hub_url: String,

    /// Identity used when opening documents
    #[serde(default)]
    pub user: Option<String>,

    /// Quiet period before local edits are pushed, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Interval between fallback saves, in seconds
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,

    /// Give up on the initial sync after this many seconds (off by default)
    #[serde(default)]
    pub handshake_timeout_secs: Option<u64>,

    /// Log file (defaults to {data_dir}/conspektor.log)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            gateway_url: default_gateway_url(),
            hub_url: default_hub_url(),
            user: None,
            debounce_ms: default_debounce_ms(),
            save_interval_secs: default_save_interval_secs(),
            handshake_timeout_secs: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable numbers are ignored.
    fn apply_env_overrides(&mut self) {
        if let Some(val) = env_var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }

        if let Some(val) = env_var("GATEWAY_URL") {
            self.gateway_url = val;
        }

        if let Some(val) = env_var("HUB_URL") {
            self.hub_url = val;
        }

        // Empty string clears it
        if let Some(val) = env_var("USER") {
            self.user = if val.is_empty() { None } else { Some(val) };
        }

        if let Some(ms) = env_var("DEBOUNCE_MS").and_then(|v| v.parse().ok()) {
            self.debounce_ms = ms;
        }

        if let Some(secs) = env_var("SAVE_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.save_interval_secs = secs;
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with CONSPEKTOR_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Some(path) = env_var("CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conspektor")
            .join("config.toml")
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Fallback save interval, never shorter than one second
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs.max(1))
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_secs.map(Duration::from_secs)
    }

    /// Path of the log file
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("conspektor.log"))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok()
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("conspektor")
}

fn default_gateway_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_hub_url() -> String {
    "ws://localhost:8000".to_string()
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_save_interval_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "CONSPEKTOR_DATA_DIR",
        "CONSPEKTOR_GATEWAY_URL",
        "CONSPEKTOR_HUB_URL",
        "CONSPEKTOR_USER",
        "CONSPEKTOR_DEBOUNCE_MS",
        "CONSPEKTOR_SAVE_INTERVAL_SECS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway_url, "http://localhost:8000");
        assert_eq!(config.hub_url, "ws://localhost:8000");
        assert_eq!(config.debounce(), Duration::from_millis(100));
        assert_eq!(config.save_interval(), Duration::from_secs(5));
        assert!(config.handshake_timeout().is_none());
        assert!(config.data_dir.ends_with("conspektor"));
    }

    #[test]
    fn test_log_path() {
        let mut config = Config::default();
        assert!(config.log_path().ends_with("conspektor.log"));

        config.log_file = Some(PathBuf::from("/tmp/custom.log"));
        assert_eq!(config.log_path(), PathBuf::from("/tmp/custom.log"));
    }

    #[test]
    fn test_save_interval_floor() {
        let config = Config {
            save_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.save_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_env_override_urls() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("CONSPEKTOR_GATEWAY_URL", "http://gateway:9000");
        env::set_var("CONSPEKTOR_HUB_URL", "wss://hub.example.com");
        config.apply_env_overrides();

        assert_eq!(config.gateway_url, "http://gateway:9000");
        assert_eq!(config.hub_url, "wss://hub.example.com");
    }

    #[test]
    fn test_env_override_user() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("CONSPEKTOR_USER", "alice");
        config.apply_env_overrides();
        assert_eq!(config.user, Some("alice".to_string()));

        // Empty string clears it
        env::set_var("CONSPEKTOR_USER", "");
        config.apply_env_overrides();
        assert!(config.user.is_none());
    }

    #[test]
    fn test_env_override_timings() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("CONSPEKTOR_DEBOUNCE_MS", "250");
        env::set_var("CONSPEKTOR_SAVE_INTERVAL_SECS", "not-a-number");
        config.apply_env_overrides();

        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.save_interval_secs, 5);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            gateway_url = "http://example.com"
            user = "bob"
            save_interval_secs = 30
            handshake_timeout_secs = 15
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.gateway_url, "http://example.com");
        assert_eq!(config.hub_url, "ws://localhost:8000");
        assert_eq!(config.user, Some("bob".to_string()));
        assert_eq!(config.save_interval(), Duration::from_secs(30));
        assert_eq!(config.handshake_timeout(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = Config {
            data_dir: temp_dir.path().join("data"),
            user: Some("carol".to_string()),
            debounce_ms: 50,
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.user, Some("carol".to_string()));
        assert_eq!(loaded.debounce_ms, 50);
        assert!(loaded.data_dir.exists());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        env::set_var("CONSPEKTOR_DATA_DIR", temp_dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert!(config.user.is_none());
        assert_eq!(config.save_interval_secs, 5);
    }
}
