//! Configuration for teardown timings.
//!
//! Values come from prioritized [`ConfigSource`]s (environment variables,
//! JSON files, in-memory maps) and are assembled into a [`LifecycleConfig`].
//! Keys are dotted (`process.grace_period_ms`); the environment source maps
//! them to upper-case underscore names behind a prefix
//! (`DEMO_LIFECYCLE_PROCESS_GRACE_PERIOD_MS`).

use std::collections::HashMap;
use std::env;
use std::time::Duration;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::fs::RetryPolicy;
use crate::process::ProcessTimeouts;

/// Environment variable prefix used by [`LifecycleConfig::from_env`].
pub const ENV_PREFIX: &str = "DEMO_LIFECYCLE";

/// A configuration value that can be various types
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(untagged))]
pub enum ConfigValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ConfigValue {
    /// Parses a raw string the way environment values are interpreted.
    pub fn parse(raw: &str) -> Self {
        if let Ok(int_val) = raw.parse::<i64>() {
            ConfigValue::Integer(int_val)
        } else if let Ok(float_val) = raw.parse::<f64>() {
            ConfigValue::Float(float_val)
        } else if let Ok(bool_val) = raw.parse::<bool>() {
            ConfigValue::Boolean(bool_val)
        } else {
            ConfigValue::String(raw.to_string())
        }
    }

    fn as_i64(&self, key: &str) -> ConfigResult<i64> {
        match self {
            ConfigValue::Integer(i) => Ok(*i),
            _ => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: "integer",
            }),
        }
    }
}

/// Trait for configuration sources
pub trait ConfigSource: Send + Sync + std::fmt::Debug {
    /// Get a configuration value by key
    fn get(&self, key: &str) -> Option<ConfigValue>;
}

/// Environment variable configuration source
#[derive(Debug, Default)]
pub struct EnvironmentConfigSource {
    /// Prefix to filter environment variables
    prefix: Option<String>,
}

impl EnvironmentConfigSource {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn env_key(&self, key: &str) -> String {
        let key = key.replace('.', "_").to_uppercase();
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix.to_uppercase(), key),
            None => key,
        }
    }
}

impl ConfigSource for EnvironmentConfigSource {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        env::var(self.env_key(key)).ok().map(|value| ConfigValue::parse(&value))
    }
}

/// In-memory configuration source.
#[derive(Debug, Default, Clone)]
pub struct MapConfigSource {
    values: HashMap<String, ConfigValue>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

impl ConfigSource for MapConfigSource {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.values.get(key).cloned()
    }
}

/// JSON configuration source holding a flat object of dotted keys.
///
/// ```json
/// { "process.grace_period_ms": 5000, "delete.max_attempts": 8 }
/// ```
#[cfg(feature = "config")]
#[derive(Debug, Clone)]
pub struct JsonConfigSource {
    values: HashMap<String, ConfigValue>,
}

#[cfg(feature = "config")]
impl JsonConfigSource {
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(Self {
            values: serde_json::from_str(json)?,
        })
    }

    pub fn from_path(path: impl AsRef<std::path::Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
            key: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&content)
    }
}

#[cfg(feature = "config")]
impl ConfigSource for JsonConfigSource {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.values.get(key).cloned()
    }
}

/// Ordered set of configuration sources; earlier sources win.
#[derive(Debug, Default)]
pub struct ConfigProvider {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigProvider {
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    /// Add a configuration source (higher priority sources should be added first)
    pub fn add_source(&mut self, source: Box<dyn ConfigSource>) {
        self.sources.push(source);
    }

    pub fn with_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.add_source(Box::new(source));
        self
    }

    /// Get a configuration value, checking sources in priority order
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        self.sources.iter().find_map(|source| source.get(key))
    }

    /// Integer value, or `default` when absent.
    pub fn get_i64_or(&self, key: &str, default: i64) -> ConfigResult<i64> {
        match self.get(key) {
            Some(value) => value.as_i64(key),
            None => Ok(default),
        }
    }

    /// Non-negative millisecond duration, or `default` when absent.
    pub fn get_duration_ms_or(&self, key: &str, default: Duration) -> ConfigResult<Duration> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        let ms = value.as_i64(key)?;
        u64::try_from(ms)
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                message: format!("duration cannot be negative ({ms} ms)"),
            })
    }
}

/// Every tunable timing of the teardown primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub process: ProcessTimeouts,
    pub delete: RetryPolicy,
    /// Pause between disposing watchers and deleting the watched path
    pub watcher_settle: Duration,
    /// How long to wait for a port to be released after its process exits
    pub port_release_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            process: ProcessTimeouts::default(),
            delete: RetryPolicy::default(),
            watcher_settle: Duration::from_millis(100),
            port_release_timeout: Duration::from_millis(5000),
        }
    }
}

impl LifecycleConfig {
    /// Loads values from `provider`, falling back to defaults for missing keys.
    ///
    /// # Errors
    ///
    /// Wrong types, negative durations, a zero poll interval and fewer than
    /// one delete attempt are rejected.
    pub fn load(provider: &ConfigProvider) -> ConfigResult<Self> {
        let defaults = Self::default();

        let poll_interval = provider.get_duration_ms_or("process.poll_interval_ms", defaults.process.poll_interval)?;
        if poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "process.poll_interval_ms".to_string(),
                message: "poll interval must be positive".to_string(),
            });
        }

        let max_attempts = provider.get_i64_or("delete.max_attempts", i64::from(defaults.delete.max_attempts))?;
        let max_attempts = u32::try_from(max_attempts)
            .ok()
            .filter(|&n| n >= 1)
            .ok_or_else(|| ConfigError::Invalid {
                key: "delete.max_attempts".to_string(),
                message: format!("must be between 1 and {}, got {max_attempts}", u32::MAX),
            })?;

        Ok(Self {
            process: ProcessTimeouts {
                grace_period: provider.get_duration_ms_or("process.grace_period_ms", defaults.process.grace_period)?,
                escalation_wait: provider
                    .get_duration_ms_or("process.escalation_wait_ms", defaults.process.escalation_wait)?,
                poll_interval,
            },
            delete: RetryPolicy::new(
                max_attempts,
                provider.get_duration_ms_or("delete.base_delay_ms", defaults.delete.base_delay)?,
            ),
            watcher_settle: provider.get_duration_ms_or("watcher.settle_ms", defaults.watcher_settle)?,
            port_release_timeout: provider
                .get_duration_ms_or("port.release_timeout_ms", defaults.port_release_timeout)?,
        })
    }

    /// Loads from `DEMO_LIFECYCLE_*` environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::load(&ConfigProvider::new().with_source(EnvironmentConfigSource::with_prefix(ENV_PREFIX)))
    }
}
