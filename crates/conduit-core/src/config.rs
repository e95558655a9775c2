use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConduitError, Result};

/// Top-level configuration for a Conduit engine.
///
/// Loaded from `~/.conduit/config.toml` by default. Every section is
/// optional; missing keys fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConduitConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

impl ConduitConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// parsed values are out of range.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ConduitConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.pool.workers == 0 {
            return Err(ConduitError::Config(
                "pool.workers must be at least 1".to_string(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConduitError::Config(
                "events.channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level used when `RUST_LOG` is unset: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of handlers executing at once.
    pub workers: usize,
    /// Maximum number of operations waiting for a worker. Unset means the
    /// queue is unbounded; when set, overflow is reported as `Overloaded`.
    pub max_queue_depth: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_queue_depth: None,
        }
    }
}

/// How many consumers see a dispatched result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Hand the result to the single most specific consumer.
    #[default]
    First,
    /// Hand the result to every matching consumer, most specific first.
    Broadcast,
}

/// Result dispatch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub policy: DispatchPolicy,
}

/// Lifecycle event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Per-subscriber buffer; slow subscribers lag past this many events.
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}
