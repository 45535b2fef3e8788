//! Limiter configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

/// Rates for one traffic class. Zero means "no limit" for either field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Short-term ceiling in bytes per second.
    #[serde(default)]
    pub short_term_bytes_per_sec: i64,

    /// Long-term average ceiling in bytes per second.
    #[serde(default)]
    pub average_bytes_per_sec: i64,
}

impl LimiterConfig {
    pub fn new(short_term_bytes_per_sec: i64, average_bytes_per_sec: i64) -> Self {
        Self {
            short_term_bytes_per_sec,
            average_bytes_per_sec,
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.short_term_bytes_per_sec < 0 || self.average_bytes_per_sec < 0 {
            return Err(ConfigError::Invalid(format!(
                "{name}: rates must not be negative"
            )));
        }
        if self.average_bytes_per_sec > 0 && self.short_term_bytes_per_sec == 0 {
            return Err(ConfigError::Invalid(format!(
                "{name}: an average rate needs a short-term rate"
            )));
        }
        Ok(())
    }
}

/// Throttling configuration for a process.
///
/// Can be loaded from a TOML file via [`ThrottleConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Draw both directions from one budget, sized by `upload`.
    #[serde(default)]
    pub share_budget: bool,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Outbound traffic.
    #[serde(default)]
    pub upload: LimiterConfig,

    /// Inbound traffic.
    #[serde(default)]
    pub download: LimiterConfig,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ThrottleConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.upload.validate("upload")?;
        self.download.validate("download")?;
        Ok(())
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            share_budget: false,
            log_format: default_log_format(),
            log_level: default_log_level(),
            upload: LimiterConfig::unlimited(),
            download: LimiterConfig::unlimited(),
        }
    }
}
