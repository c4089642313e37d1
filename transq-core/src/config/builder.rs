// ============================================================================
// transq-core/src/config/builder.rs
// ============================================================================
//
// CONFIGURATION BUILDER: Builder Pattern for TranscoderConfig
//
// This module implements a fluent API for creating TranscoderConfig instances
// in code, mainly for embedders and tests. Config files go through serde
// instead.
//
// KEY COMPONENTS:
// - TranscoderConfigBuilder: Builder struct for creating TranscoderConfig instances
// - Default values for every parameter

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::TranscoderConfig;

/// Builder for creating TranscoderConfig instances.
///
/// # Examples
///
/// ```rust
/// use transq_core::config::TranscoderConfigBuilder;
///
/// let config = TranscoderConfigBuilder::new()
///     .max_threads(4)
///     .stream_timeout_secs(10)
///     .element_property("libvorbis", "q:a", "6")
///     .build();
/// assert_eq!(config.max_threads, 4);
/// ```
#[derive(Debug, Clone)]
pub struct TranscoderConfigBuilder {
    max_threads: usize,
    stream_timeout_secs: u64,
    temp_dir: Option<PathBuf>,
    element_properties: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for TranscoderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscoderConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        let defaults = TranscoderConfig::default();
        Self {
            max_threads: defaults.max_threads,
            stream_timeout_secs: defaults.stream_timeout_secs,
            temp_dir: defaults.temp_dir,
            element_properties: defaults.element_properties,
        }
    }

    /// Sets the concurrency bound. Values below 1 are raised to 1.
    pub fn max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    /// Sets the stall timeout in seconds; 0 disables the watchdog.
    pub fn stream_timeout_secs(mut self, secs: u64) -> Self {
        self.stream_timeout_secs = secs;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Adds a property applied to every element built from `factory`.
    pub fn element_property(
        mut self,
        factory: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.element_properties
            .entry(factory.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> TranscoderConfig {
        TranscoderConfig {
            max_threads: self.max_threads,
            stream_timeout_secs: self.stream_timeout_secs,
            temp_dir: self.temp_dir,
            element_properties: self.element_properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_threads_and_collects_properties() {
        let config = TranscoderConfigBuilder::new()
            .max_threads(0)
            .temp_dir("/tmp/transq")
            .element_property("flac", "compression_level", "8")
            .element_property("flac", "sample_fmt", "s16")
            .build();

        assert_eq!(config.max_threads, 1);
        assert_eq!(config.temp_dir, Some(PathBuf::from("/tmp/transq")));
        assert_eq!(config.properties_for("flac").map(|p| p.len()), Some(2));
        assert!(config.validate().is_ok());
    }
}
