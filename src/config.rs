use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, VoError};
use crate::mapping::{KeyframeConfig, SmoothingConfig};
use crate::odometry::{EstimatorConfig, SamplingStrategy, DEFAULT_CALIBRATION_LABEL};

/// Settings of a full pipeline run. Every section falls back to its defaults,
/// so a settings file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub strategy: SamplingStrategy,
    /// Record label of the projection matrix in the calibration file
    pub calibration_label: String,
    pub estimator: EstimatorConfig,
    pub keyframes: KeyframeConfig,
    pub smoothing: SmoothingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: SamplingStrategy::default(),
            calibration_label: DEFAULT_CALIBRATION_LABEL.to_string(),
            estimator: EstimatorConfig::default(),
            keyframes: KeyframeConfig::default(),
            smoothing: SmoothingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON settings file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        // bad values (unknown strategy, wrong types) are configuration errors
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            if e.is_data() {
                VoError::config(e.to_string())
            } else {
                VoError::from(e)
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.smoothing.validate()?;

        if self.keyframes.step == 0 {
            return Err(VoError::config("keyframe step must be at least 1"));
        }
        let estimator = &self.estimator;
        if estimator.max_correspondences == 0 {
            return Err(VoError::config("correspondence cap must be at least 1"));
        }
        if estimator.min_correspondences < 8 {
            return Err(VoError::config(format!(
                "at least 8 correspondences are needed, got {}",
                estimator.min_correspondences
            )));
        }
        if !(estimator.ransac_threshold > 0.0 && estimator.ransac_threshold.is_finite()) {
            return Err(VoError::config("ransac threshold must be positive"));
        }
        if !(estimator.max_depth > 0.0) {
            return Err(VoError::config("cheirality depth limit must be positive"));
        }
        if self.calibration_label.trim().is_empty() {
            return Err(VoError::config("calibration label is empty"));
        }
        Ok(())
    }
}
