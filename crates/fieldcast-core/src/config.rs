//! Configuration resolution for Fieldcast.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/fieldcast/settings.json)
//! 3. Explicit config file (passed by the caller, e.g. `--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::channel::ChannelType;
use crate::db::PoolSettings;
use crate::error::{Error, Result};

/// Default bound on concurrent per-recipient dispatches during a broadcast.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Default timeout for a single external carrier attempt, in seconds.
pub const DEFAULT_CARRIER_TIMEOUT_SECS: u64 = 10;

/// Complete Fieldcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the `SQLite` database. `None` resolves to [`database_path`].
    pub database_path: Option<PathBuf>,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let pool = PoolSettings::default();
        Self {
            database_path: None,
            max_connections: pool.max_connections,
            busy_timeout_ms: u64::try_from(pool.busy_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl StorageConfig {
    /// Pool sizing for the file-backed store, zero values normalised.
    pub const fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.max_connections,
            busy_timeout: std::time::Duration::from_millis(self.busy_timeout_ms),
        }
        .normalised()
    }
}

/// Dispatch and fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum recipients dispatched concurrently during one broadcast.
    pub max_concurrency: usize,
    /// Upper bound on a single external carrier call.
    pub carrier_timeout_secs: u64,
    /// Channel used when neither the caller nor the recipient names one.
    pub default_channel: ChannelType,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            carrier_timeout_secs: DEFAULT_CARRIER_TIMEOUT_SECS,
            default_channel: ChannelType::Internal,
        }
    }
}

impl DispatchConfig {
    /// Concurrency limit with `0` normalised to the default.
    pub const fn effective_concurrency(&self) -> usize {
        if self.max_concurrency == 0 {
            DEFAULT_MAX_CONCURRENCY
        } else {
            self.max_concurrency
        }
    }

    /// Carrier timeout with `0` normalised to the default.
    pub const fn effective_carrier_timeout(&self) -> std::time::Duration {
        if self.carrier_timeout_secs == 0 {
            std::time::Duration::from_secs(DEFAULT_CARRIER_TIMEOUT_SECS)
        } else {
            std::time::Duration::from_secs(self.carrier_timeout_secs)
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub fn filter_directive(&self) -> String {
        format!("fieldcast_notify={0},fieldcast_core={0}", self.level)
    }
}

/// Configuration source priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    Default = 0,
    Global = 1,
    File = 2,
    Environment = 3,
    Cli = 4,
}

/// Load configuration with hierarchical resolution.
///
/// A missing global file is skipped; a missing explicit file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    // Load global config
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            merge_config(&mut merged, load_config_file(&global_path)?);
        }
    }

    // Load explicit config
    if let Some(path) = explicit {
        merge_config(&mut merged, load_config_file(path)?);
    }

    let mut config: Config = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;
    apply_env_overrides(&mut config)?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("settings.json"))
}

/// Get the default database path.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("fieldcast.db"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".fieldcast"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/fieldcast"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("fieldcast"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    if !value.is_object() {
        return Err(Error::Config(format!(
            "Config file {} must contain a JSON object",
            path.display()
        )));
    }
    Ok(value)
}

/// Overlay `overlay` onto `base` key by key. Only keys present in the
/// overlay replace values in the base; `null` leaves the base untouched.
fn merge_config(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_config(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, serde_json::Value::Null) => {}
        (slot, value) => *slot = value,
    }
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(val) = std::env::var("FIELDCAST_DB_PATH") {
        config.storage.database_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("FIELDCAST_DB_MAX_CONNECTIONS") {
        if let Ok(n) = val.parse() {
            config.storage.max_connections = n;
        }
    }
    if let Ok(val) = std::env::var("FIELDCAST_MAX_CONCURRENCY") {
        if let Ok(n) = val.parse() {
            config.dispatch.max_concurrency = n;
        }
    }
    if let Ok(val) = std::env::var("FIELDCAST_CARRIER_TIMEOUT_SECS") {
        if let Ok(n) = val.parse() {
            config.dispatch.carrier_timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("FIELDCAST_DEFAULT_CHANNEL") {
        config.dispatch.default_channel = val.parse()?;
    }
    if let Ok(val) = std::env::var("FIELDCAST_LOG_LEVEL") {
        config.logging.level = val;
    }
    Ok(())
}
