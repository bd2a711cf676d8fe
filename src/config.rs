//! Engine configuration
//!
//! Defaults mirror production settings: a one-minute monitor tick and an
//! early-stopping floor of 30 samples.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default monitor tick
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Default minimum total samples before early stopping may trigger
pub const DEFAULT_EARLY_STOP_MIN_SAMPLES: usize = 30;

/// Default data directory for the durable collections
pub const DEFAULT_DATA_DIR: &str = "data/experiments";

/// Configuration for an [`ExperimentEngine`](crate::engine::ExperimentEngine).
///
/// # Example
/// ```
/// use std::time::Duration;
/// use optimization_lab::config::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .data_dir("/tmp/lab")
///     .monitor_interval(Duration::from_secs(5))
///     .build();
/// assert_eq!(config.early_stop_min_samples, 30);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding `designs.json` and `results.json`
    pub data_dir: PathBuf,

    /// Interval between background monitor scans
    pub monitor_interval: Duration,

    /// Floor for the early-stopping activation threshold
    ///
    /// Early stopping activates once total samples reach
    /// `max(early_stop_min_samples, sample_size_per_condition / 4)`.
    pub early_stop_min_samples: usize,

    /// Write designs and results to `data_dir` on every mutation
    ///
    /// Disable for a purely in-memory engine.
    pub persist: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            early_stop_min_samples: DEFAULT_EARLY_STOP_MIN_SAMPLES,
            persist: true,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// In-memory configuration (nothing is written to disk).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            persist: false,
            ..Self::default()
        }
    }

    /// Path of the designs collection
    #[must_use]
    pub fn designs_path(&self) -> PathBuf {
        self.data_dir.join("designs.json")
    }

    /// Path of the results collection
    #[must_use]
    pub fn results_path(&self) -> PathBuf {
        self.data_dir.join("results.json")
    }
}

/// Builder for [`EngineConfig`]
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the data directory
    #[must_use]
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.data_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the monitor tick
    #[must_use]
    pub const fn monitor_interval(mut self, interval: Duration) -> Self {
        self.config.monitor_interval = interval;
        self
    }

    /// Set the early-stopping sample floor
    #[must_use]
    pub const fn early_stop_min_samples(mut self, samples: usize) -> Self {
        self.config.early_stop_min_samples = samples;
        self
    }

    /// Enable or disable durable writes
    #[must_use]
    pub const fn persist(mut self, persist: bool) -> Self {
        self.config.persist = persist;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
