use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VoError};

/// Savitzky-Golay filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Window length in samples, odd
    pub window: usize,
    /// Degree of the fitted polynomial, below `window`
    pub poly_order: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window: 7,
            poly_order: 2,
        }
    }
}

impl SmoothingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 || self.window % 2 == 0 {
            return Err(VoError::config(format!(
                "smoothing window must be a positive odd number, got {}",
                self.window
            )));
        }
        if self.poly_order >= self.window {
            return Err(VoError::config(format!(
                "polynomial order {} must be less than the window {}",
                self.poly_order, self.window
            )));
        }
        Ok(())
    }
}

/// Per-axis Savitzky-Golay smoothing of a 3D point sequence
///
/// Interior samples use the centred least-squares coefficients. The first and last
/// `window / 2` samples are evaluated from the polynomial fitted to the first and
/// last full window, so the output has the same length as the input.
#[derive(Debug, Clone)]
pub struct TrajectorySmoother {
    config: SmoothingConfig,
    /// Least-squares fit operator: polynomial coefficients from one window of samples
    fit: na::DMatrix<f64>,
}

impl TrajectorySmoother {
    pub fn new(config: SmoothingConfig) -> Result<Self> {
        config.validate()?;

        let half = (config.window / 2) as f64;
        let vandermonde = na::DMatrix::from_fn(config.window, config.poly_order + 1, |r, c| {
            (r as f64 - half).powi(c as i32)
        });
        let fit = vandermonde
            .pseudo_inverse(1e-12)
            .map_err(|e| VoError::config(format!("smoothing fit: {e}")))?;

        Ok(Self { config, fit })
    }

    pub fn config(&self) -> &SmoothingConfig {
        &self.config
    }

    /// Smooth `points`. Sequences shorter than the window come back unchanged.
    pub fn smooth(&self, points: &[na::Point3<f64>]) -> Vec<na::Point3<f64>> {
        let n = points.len();
        let window = self.config.window;
        if n < window {
            return points.to_vec();
        }
        let half = window / 2;

        let mut smoothed = points.to_vec();
        for axis in 0..3 {
            let samples: Vec<f64> = points.iter().map(|p| p[axis]).collect();

            for (i, point) in smoothed.iter_mut().enumerate() {
                // window start clamped at both ends; offset of i from the window centre
                let start = i.saturating_sub(half).min(n - window);
                let offset = i as f64 - (start + half) as f64;
                point[axis] = self.evaluate(&samples[start..start + window], offset);
            }
        }
        smoothed
    }

    /// Value at `offset` from the centre of the polynomial fitted to `window`
    fn evaluate(&self, window: &[f64], offset: f64) -> f64 {
        let y = na::DVector::from_column_slice(window);
        let coefficients = &self.fit * y;
        coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * offset + c)
    }
}
