use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid {field}: must be at least 1")]
    ZeroValue { field: &'static str },

    #[error("Invalid {field}: must be at most {max}")]
    TooLarge { field: &'static str, max: u64 },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

const DAY_SECS: u64 = 86_400;
const DAY_MS: u64 = DAY_SECS * 1_000;
const HOUR_SECS: u64 = 3_600;

const CONFIG_DIR: &str = ".turnguard";
const ENV_PREFIX: &str = "TURNGUARD_";

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .turnguard/config.yaml
    /// 3. .turnguard/local.yaml (optional local overrides)
    /// 4. Environment variables (TURNGUARD_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same layering, rooted at `dir` instead of the working directory.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let base = dir.as_ref().join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base.join("config.yaml")))
            .merge(Yaml::file(base.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file; environment variables still
    /// override it.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let r = &config.reconciler;
        let w = &config.watchdog;
        let nonzero = [
            ("reconciler.match_window_secs", r.match_window_secs == 0),
            ("reconciler.max_entries_per_call", r.max_entries_per_call == 0),
            ("reconciler.legacy_prefix_chars", r.legacy_prefix_chars == 0),
            ("reconciler.interval_secs", r.interval_secs == 0),
            ("watchdog.poll_interval_ms", w.poll_interval_ms == 0),
            ("watchdog.capture_lines", w.capture_lines == 0),
            ("watchdog.capture_timeout_secs", w.capture_timeout_secs == 0),
            ("watchdog.snippet_lines", w.snippet_lines == 0),
            ("bridge.send_timeout_secs", config.bridge.send_timeout_secs == 0),
            ("events.channel_capacity", config.events.channel_capacity == 0),
        ];
        if let Some(&(field, _)) = nonzero.iter().find(|(_, zero)| *zero) {
            return Err(ConfigError::ZeroValue { field });
        }

        let bounded = [
            ("reconciler.match_window_secs", r.match_window_secs, DAY_SECS),
            ("reconciler.timestamp_tolerance_ms", r.timestamp_tolerance_ms, DAY_MS),
            ("reconciler.interval_secs", r.interval_secs, DAY_SECS),
            ("watchdog.poll_interval_ms", w.poll_interval_ms, HOUR_SECS * 1_000),
            ("watchdog.gap_threshold_ms", w.gap_threshold_ms, DAY_MS),
            ("watchdog.capture_timeout_secs", w.capture_timeout_secs, HOUR_SECS),
            ("watchdog.recent_turn_window_secs", w.recent_turn_window_secs, DAY_SECS),
            ("bridge.send_timeout_secs", config.bridge.send_timeout_secs, HOUR_SECS),
        ];
        if let Some(&(field, _, max)) = bounded.iter().find(|(_, value, max)| value > max) {
            return Err(ConfigError::TooLarge { field, max });
        }

        if config.bridge.tmux_binary.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("bridge.tmux_binary cannot be empty".to_string()));
        }

        Ok(())
    }
}
