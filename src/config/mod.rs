//! Configuration types for the candidate sifting engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating a configuration.
///
/// Every variant is fatal: the run stops before any candidate file is read.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{name}: minimum {min} exceeds maximum {max}")]
    InvertedBounds { name: &'static str, min: f64, max: f64 },

    #[error("{name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: f64 },

    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("worker pool size must be at least 1")]
    NoWorkers,
}

/// Which search-tool output files belong to the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// zmax suffix of the acceleration search files (`_ACCEL_<accel>`)
    #[serde(default = "default_accel")]
    pub accel: u32,

    /// wmax suffix of jerk search files (`_JERK_<jerk>`), if any
    #[serde(default)]
    pub jerk: Option<u32>,
}

fn default_accel() -> u32 {
    20
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            accel: default_accel(),
            jerk: None,
        }
    }
}

impl SearchConfig {
    /// File name suffix selecting the trial files of this search.
    pub fn file_suffix(&self) -> String {
        match self.jerk {
            Some(wmax) => format!("_ACCEL_{}_JERK_{}", self.accel, wmax),
            None => format!("_ACCEL_{}", self.accel),
        }
    }
}

/// Period quantization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Digits kept after the decimal point of the period (ms)
    #[serde(default = "default_period_precision")]
    pub period_precision: usize,

    /// Keep only the first record per period key within each file
    #[serde(default)]
    pub collapse_within_file: bool,
}

fn default_period_precision() -> usize {
    4
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            period_precision: default_period_precision(),
            collapse_within_file: false,
        }
    }
}

/// Acceptance thresholds applied to every cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Shortest plausible spin period (ms)
    #[serde(default = "default_min_period")]
    pub min_period_ms: f64,

    /// Longest plausible spin period (ms)
    #[serde(default = "default_max_period")]
    pub max_period_ms: f64,

    /// Minimum number of detections across DM trials
    #[serde(default = "default_min_detections")]
    pub min_detections: usize,

    /// Largest allowed spread of trial DMs within one cluster
    #[serde(default = "default_max_dm_range")]
    pub max_dm_range: f64,

    /// Weakest accepted peak significance
    #[serde(default = "default_min_sigma")]
    pub min_sigma: f64,

    /// Strongest accepted peak significance; stronger clusters are treated as RFI
    #[serde(default = "default_max_sigma")]
    pub max_sigma: f64,

    /// Lowest representative DM considered astrophysical
    #[serde(default)]
    pub low_dm_cutoff: Option<f64>,
}

fn default_min_period() -> f64 {
    0.5
}

fn default_max_period() -> f64 {
    15_000.0
}

fn default_min_detections() -> usize {
    2
}

fn default_max_dm_range() -> f64 {
    100.0
}

fn default_min_sigma() -> f64 {
    2.0
}

fn default_max_sigma() -> f64 {
    100.0
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_period_ms: default_min_period(),
            max_period_ms: default_max_period(),
            min_detections: default_min_detections(),
            max_dm_range: default_max_dm_range(),
            min_sigma: default_min_sigma(),
            max_sigma: default_max_sigma(),
            low_dm_cutoff: None,
        }
    }
}

impl SelectionConfig {
    /// Check threshold consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            ("min_period_ms", self.min_period_ms),
            ("max_period_ms", self.max_period_ms),
            ("max_dm_range", self.max_dm_range),
            ("min_sigma", self.min_sigma),
            ("max_sigma", self.max_sigma),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { name, value });
            }
        }
        if let Some(cutoff) = self.low_dm_cutoff {
            if !cutoff.is_finite() {
                return Err(ConfigError::NotFinite {
                    name: "low_dm_cutoff",
                    value: cutoff,
                });
            }
        }

        if self.max_dm_range < 0.0 {
            return Err(ConfigError::Negative {
                name: "max_dm_range",
                value: self.max_dm_range,
            });
        }
        if self.min_period_ms > self.max_period_ms {
            return Err(ConfigError::InvertedBounds {
                name: "period",
                min: self.min_period_ms,
                max: self.max_period_ms,
            });
        }
        if self.min_sigma > self.max_sigma {
            return Err(ConfigError::InvertedBounds {
                name: "sigma",
                min: self.min_sigma,
                max: self.max_sigma,
            });
        }
        Ok(())
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Draw progress bars for each parallel stage
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(10)
}

fn default_show_progress() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            show_progress: default_show_progress(),
        }
    }
}

/// Main sifting configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiftConfig {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl SiftConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SiftConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execution.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        self.selection.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_sift_config() {
        let config = SiftConfig::default();
        assert_eq!(config.search.accel, 20);
        assert_eq!(config.search.jerk, None);
        assert_eq!(config.clustering.period_precision, 4);
        assert_eq!(config.selection.min_detections, 2);
        assert_eq!(config.selection.max_sigma, 100.0);
        assert!(config.execution.workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_suffix() {
        let mut search = SearchConfig::default();
        assert_eq!(search.file_suffix(), "_ACCEL_20");
        search.jerk = Some(40);
        assert_eq!(search.file_suffix(), "_ACCEL_20_JERK_40");
    }

    #[test]
    fn test_inverted_sigma_bounds_rejected() {
        let mut config = SiftConfig::default();
        config.selection.min_sigma = 50.0;
        config.selection.max_sigma = 10.0;

        match config.validate() {
            Err(ConfigError::InvertedBounds { name, .. }) => assert_eq!(name, "sigma"),
            other => panic!("Expected InvertedBounds, got {:?}", other),
        }
    }

    #[test]
    fn test_inverted_period_bounds_rejected() {
        let mut config = SiftConfig::default();
        config.selection.min_period_ms = 20.0;
        config.selection.max_period_ms = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedBounds { name: "period", .. })
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = SiftConfig::default();
        config.execution.workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NoWorkers)));
    }

    #[test]
    fn test_negative_dm_range_and_nan_rejected() {
        let mut config = SiftConfig::default();
        config.selection.max_dm_range = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Negative { .. })));

        let mut config = SiftConfig::default();
        config.selection.min_sigma = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::NotFinite { .. })));
    }

    #[test]
    fn test_yaml_roundtrip_with_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sift.yaml");
        std::fs::write(
            &path,
            "search:\n  accel: 50\n  jerk: 100\nselection:\n  min_detections: 3\n",
        )
        .unwrap();

        let config = SiftConfig::from_yaml(&path).unwrap();
        assert_eq!(config.search.accel, 50);
        assert_eq!(config.search.jerk, Some(100));
        assert_eq!(config.selection.min_detections, 3);
        // Unspecified values fall back to defaults
        assert_eq!(config.selection.max_dm_range, 100.0);
        assert_eq!(config.clustering.period_precision, 4);

        let out = temp_dir.path().join("written.yaml");
        config.to_yaml(&out).unwrap();
        let reloaded = SiftConfig::from_yaml(&out).unwrap();
        assert_eq!(reloaded.search.jerk, Some(100));
    }

    #[test]
    fn test_missing_config_file() {
        let result = SiftConfig::from_yaml("/nonexistent/sift.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
