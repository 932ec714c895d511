use serde::Deserialize;
use std::path::Path;

use crate::error::{AnalyzerError, Result};

/// Tunable thresholds for the analysis run (spec §6). Loaded from an
/// optional TOML file; any field not present falls back to its default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub deviation_threshold_sigma: f64,
    pub bias_threshold_d: f64,
    pub min_group_size: u32,
    pub min_numeric_coverage: f64,
    pub min_cv: f64,
    pub max_group_cardinality: u32,
    pub outlier_fraction_floor: f64,
    pub intersectional_multiplier: f64,
    pub severe_disparity_ratio: f64,
    pub min_periods: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            deviation_threshold_sigma: 2.0,
            bias_threshold_d: 0.3,
            min_group_size: 10,
            min_numeric_coverage: 0.6,
            min_cv: 0.02,
            max_group_cardinality: 20,
            outlier_fraction_floor: 0.05,
            intersectional_multiplier: 1.2,
            severe_disparity_ratio: 4.0,
            min_periods: 2,
        }
    }
}

impl AnalyzerConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| AnalyzerError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let config: AnalyzerConfig =
            toml::from_str(&contents).map_err(|source| AnalyzerError::ConfigParse {
                path: path.display().to_string(),
                source,
            })?;
        tracing::info!("loaded config from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values before the pipeline runs (spec §6, §7).
    pub fn validate(&self) -> Result<()> {
        let checks: &[(bool, &str)] = &[
            (
                self.deviation_threshold_sigma > 0.0,
                "deviation_threshold_sigma must be positive",
            ),
            (self.bias_threshold_d > 0.0, "bias_threshold_d must be positive"),
            (self.min_group_size >= 1, "min_group_size must be at least 1"),
            (
                (0.0..=1.0).contains(&self.min_numeric_coverage),
                "min_numeric_coverage must be in [0, 1]",
            ),
            (self.min_cv >= 0.0, "min_cv must be non-negative"),
            (
                self.max_group_cardinality >= 2,
                "max_group_cardinality must be at least 2",
            ),
            (
                (0.0..=1.0).contains(&self.outlier_fraction_floor),
                "outlier_fraction_floor must be in [0, 1]",
            ),
            (
                self.intersectional_multiplier > 0.0,
                "intersectional_multiplier must be positive",
            ),
            (
                self.severe_disparity_ratio > 0.0,
                "severe_disparity_ratio must be positive",
            ),
            (self.min_periods >= 2, "min_periods must be at least 2"),
        ];

        for (ok, message) in checks {
            if !ok {
                return Err(AnalyzerError::ConfigurationInvalid(message.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AnalyzerConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_min_periods() {
        let mut cfg = AnalyzerConfig::default();
        cfg.min_periods = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_coverage() {
        let mut cfg = AnalyzerConfig::default();
        cfg.min_numeric_coverage = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = AnalyzerConfig::load("/nonexistent/path/does-not-exist.toml").unwrap();
        assert_eq!(cfg.min_group_size, 10);
    }
}
