//! Config command handlers

use anyhow::{bail, Context, Result};

use conspektor_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str = "data_dir, gateway_url, hub_url, user, debounce_ms, \
                          save_interval_secs, handshake_timeout_secs, log_file";

/// Show current configuration
pub fn show(output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "gateway_url": config.gateway_url,
                    "hub_url": config.hub_url,
                    "user": config.user,
                    "debounce_ms": config.debounce_ms,
                    "save_interval_secs": config.save_interval_secs,
                    "handshake_timeout_secs": config.handshake_timeout_secs,
                    "log_file": config.log_path()
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.gateway_url);
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:               {}", config.data_dir.display());
            println!("  gateway_url:            {}", config.gateway_url);
            println!("  hub_url:                {}", config.hub_url);
            println!(
                "  user:                   {}",
                config.user.as_deref().unwrap_or("(not set)")
            );
            println!("  debounce_ms:            {}", config.debounce_ms);
            println!("  save_interval_secs:     {}", config.save_interval_secs);
            println!(
                "  handshake_timeout_secs: {}",
                config
                    .handshake_timeout_secs
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "(off)".to_string())
            );
            println!("  log_file:               {}", config.log_path().display());
            println!();
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, output: &Output) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    apply_setting(&mut config, &key, &value)?;

    config.save().context("Failed to save configuration")?;
    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply_setting(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let cleared = value.is_empty() || value == "none";

    match key {
        "data_dir" => config.data_dir = value.into(),
        "gateway_url" => config.gateway_url = value.to_string(),
        "hub_url" => config.hub_url = value.to_string(),
        "user" => config.user = (!cleared).then(|| value.to_string()),
        "debounce_ms" => {
            config.debounce_ms = value
                .parse()
                .context("Invalid value for debounce_ms. Use a number of milliseconds.")?;
        }
        "save_interval_secs" => {
            config.save_interval_secs = value
                .parse()
                .context("Invalid value for save_interval_secs. Use a number of seconds.")?;
        }
        "handshake_timeout_secs" => {
            config.handshake_timeout_secs = if cleared {
                None
            } else {
                Some(value.parse().context(
                    "Invalid value for handshake_timeout_secs. Use a number of seconds or 'none'.",
                )?)
            };
        }
        "log_file" => config.log_file = (!cleared).then(|| value.into()),
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_set_urls_and_user() {
        let mut config = Config::default();
        apply_setting(&mut config, "gateway_url", "http://gw:9000").unwrap();
        apply_setting(&mut config, "hub_url", "ws://hub:9000").unwrap();
        apply_setting(&mut config, "user", "alice").unwrap();

        assert_eq!(config.gateway_url, "http://gw:9000");
        assert_eq!(config.hub_url, "ws://hub:9000");
        assert_eq!(config.user, Some("alice".to_string()));

        apply_setting(&mut config, "user", "none").unwrap();
        assert!(config.user.is_none());
    }

    #[test]
    fn test_set_timings() {
        let mut config = Config::default();
        apply_setting(&mut config, "debounce_ms", "250").unwrap();
        apply_setting(&mut config, "handshake_timeout_secs", "15").unwrap();
        assert_eq!(config.debounce(), Duration::from_millis(250));
        assert_eq!(config.handshake_timeout(), Some(Duration::from_secs(15)));

        apply_setting(&mut config, "handshake_timeout_secs", "").unwrap();
        assert!(config.handshake_timeout().is_none());

        assert!(apply_setting(&mut config, "debounce_ms", "fast").is_err());
        assert_eq!(config.debounce_ms, 250);
    }

    #[test]
    fn test_set_log_file() {
        let mut config = Config::default();
        apply_setting(&mut config, "log_file", "/tmp/c.log").unwrap();
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/c.log")));
    }

    #[test]
    fn test_unknown_key() {
        let mut config = Config::default();
        let err = apply_setting(&mut config, "sync_url", "x").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }
}
