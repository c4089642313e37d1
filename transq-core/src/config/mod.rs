//! Configuration structures and constants for the transq-core library.
//!
//! This module provides the settings that shape scheduling and pipeline
//! construction: the concurrency bound, the stall watchdog, where temporary
//! outputs go, and per-element property overrides.

mod builder;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use builder::TranscoderConfigBuilder;

use crate::error::{CoreError, CoreResult};

// Default constants

/// Default number of seconds a running job may take to expose a decodable
/// stream before it is treated as stalled. Zero disables the watchdog.
pub const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 30;

/// Default concurrency bound: the number of logical CPUs, or 1 when that
/// cannot be determined.
pub fn default_max_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Main configuration structure for the transcoder.
///
/// All fields have defaults, so a config file only needs to name what it
/// changes.
///
/// # Examples
///
/// ```rust
/// use transq_core::config::TranscoderConfig;
///
/// let config = TranscoderConfig::from_toml_str(r#"
///     max_threads = 2
///
///     [element_properties.libmp3lame]
///     "b:a" = "192k"
/// "#).unwrap();
/// assert_eq!(config.max_threads, 2);
/// assert_eq!(config.properties_for("libmp3lame").unwrap()["b:a"], "192k");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranscoderConfig {
    /// Maximum number of concurrently running jobs. Must be at least 1.
    pub max_threads: usize,

    /// Seconds a running job may wait for its decoder to expose a stream
    /// before it is failed. 0 disables.
    pub stream_timeout_secs: u64,

    /// Directory for temporary job outputs (defaults to the system temp dir)
    pub temp_dir: Option<PathBuf>,

    /// Factory name -> property -> value, applied to every element built
    /// from that factory.
    pub element_properties: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            max_threads: default_max_threads(),
            stream_timeout_secs: DEFAULT_STREAM_TIMEOUT_SECS,
            temp_dir: None,
            element_properties: BTreeMap::new(),
        }
    }
}

impl TranscoderConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(toml_str: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML config file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.max_threads == 0 {
            return Err(CoreError::Config("max_threads must be at least 1".to_string()));
        }
        if let Some(dir) = &self.temp_dir {
            if dir.as_os_str().is_empty() {
                return Err(CoreError::Config("temp_dir must not be empty".to_string()));
            }
        }
        Ok(())
    }

    /// The stall timeout, or `None` when the watchdog is disabled.
    pub fn stream_timeout(&self) -> Option<Duration> {
        (self.stream_timeout_secs > 0).then(|| Duration::from_secs(self.stream_timeout_secs))
    }

    /// Property overrides for elements built from `factory`.
    pub fn properties_for(&self, factory: &str) -> Option<&BTreeMap<String, String>> {
        self.element_properties.get(factory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = TranscoderConfig::from_toml_str("").unwrap();
        assert_eq!(config, TranscoderConfig::default());
        assert!(config.max_threads >= 1);
        assert_eq!(config.stream_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_timeout_disables_watchdog() {
        let config = TranscoderConfig::from_toml_str("stream_timeout_secs = 0").unwrap();
        assert_eq!(config.stream_timeout(), None);
    }

    #[test]
    fn zero_threads_is_rejected() {
        let err = TranscoderConfig::from_toml_str("max_threads = 0").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = TranscoderConfig::from_toml_str("max_thread = 2").unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = TranscoderConfig::load(Path::new("/nonexistent/transq.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/transq.toml"));
    }
}
