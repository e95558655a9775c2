//! CLI argument definitions for the Conduit application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Conduit: resolve an intent for a file or URL and run the matching handler.
#[derive(Parser, Debug)]
#[command(name = "conduit", version, about)]
pub struct CliArgs {
    /// File path or URL the intent refers to.
    pub target: String,

    /// Intent action.
    #[arg(short = 'a', long = "action", default_value = "view")]
    pub action: String,

    /// MIME type of the target.
    #[arg(short = 't', long = "type")]
    pub mime_type: Option<String>,

    /// Intent category; may be repeated.
    #[arg(short = 'C', long = "category")]
    pub categories: Vec<String>,

    /// Bypass resolution and use this handler.
    #[arg(long = "handler")]
    pub handler: Option<String>,

    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > CONDUIT_CONFIG env var > platform default (~/.conduit/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("CONDUIT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".conduit").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".conduit").join("config.toml");
    }
    PathBuf::from("config.toml")
}
