use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Immutable configuration for one editing run. Loaded once from TOML and
/// passed by reference into the pipelines; nothing mutates it mid-run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub zscore: ZScoreConfig,
    pub iqr: IqrConfig,
    /// Inclusive year range for the run. Records outside it never enter the
    /// group computations. None means no year filtering.
    pub years: Option<YearRange>,
    /// Component codes admitted into the run. Empty means all components.
    pub components: Vec<String>,
    /// When true, the redistribution engine skips the negative-clamping
    /// passes and negative adjusted values pass through unchanged.
    pub accept_negatives: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZScoreConfig {
    pub enabled: bool,
    pub lower_threshold: f64,
    pub upper_threshold: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct IqrConfig {
    pub enabled: bool,
    pub lower_quantile: f64,
    pub upper_quantile: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            zscore: ZScoreConfig::default(),
            iqr: IqrConfig::default(),
            years: None,
            components: Vec::new(),
            accept_negatives: false,
        }
    }
}

impl Default for ZScoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lower_threshold: -3.0,
            upper_threshold: 3.0,
        }
    }
}

impl Default for IqrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lower_quantile: 0.25,
            upper_quantile: 0.75,
            multiplier: 3.0,
        }
    }
}

impl RunConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: RunConfig = toml::from_str(&raw).map_err(|err| {
            PipelineError::Config(format!("failed to parse {}: {}", path.display(), err))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects inconsistent settings before any group is processed.
    pub fn validate(&self) -> Result<()> {
        if self.zscore.enabled && self.zscore.lower_threshold >= self.zscore.upper_threshold {
            return Err(PipelineError::Config(format!(
                "z-score lower threshold {} must be below upper threshold {}",
                self.zscore.lower_threshold, self.zscore.upper_threshold
            )));
        }

        if self.iqr.enabled {
            let (lo, hi) = (self.iqr.lower_quantile, self.iqr.upper_quantile);
            if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) {
                return Err(PipelineError::Config(format!(
                    "IQR quantiles must lie in [0, 1], got {} and {}",
                    lo, hi
                )));
            }
            if lo >= hi {
                return Err(PipelineError::Config(format!(
                    "IQR lower quantile {} must be below upper quantile {}",
                    lo, hi
                )));
            }
            if self.iqr.multiplier < 0.0 {
                return Err(PipelineError::Config(format!(
                    "IQR multiplier must be non-negative, got {}",
                    self.iqr.multiplier
                )));
            }
        }

        if let Some(years) = &self.years {
            if years.start > years.end {
                return Err(PipelineError::Config(format!(
                    "year range start {} is after end {}",
                    years.start, years.end
                )));
            }
        }

        Ok(())
    }
}
