//! Quality engine configuration.

use serde::{Deserialize, Serialize};

use crate::domain::QualityAxis;

/// Weight of each axis in the overall score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    /// Sharpness weight.
    pub sharpness: f64,
    /// Lighting weight.
    pub lighting: f64,
    /// Colour weight.
    pub color: f64,
    /// Noise weight.
    pub noise: f64,
    /// Resolution weight.
    pub resolution: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            sharpness: 0.30,
            lighting: 0.25,
            color: 0.15,
            noise: 0.15,
            resolution: 0.15,
        }
    }
}

impl QualityWeights {
    /// Weight of one axis.
    #[must_use]
    pub const fn get(&self, axis: QualityAxis) -> f64 {
        match axis {
            QualityAxis::Sharpness => self.sharpness,
            QualityAxis::Lighting => self.lighting,
            QualityAxis::Color => self.color,
            QualityAxis::Noise => self.noise,
            QualityAxis::Resolution => self.resolution,
        }
    }

    /// Sum of all weights.
    #[must_use]
    pub fn total(&self) -> f64 {
        QualityAxis::ALL.iter().map(|a| self.get(*a)).sum()
    }
}

/// Minimum sub-score per axis before an issue is reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Sharpness threshold.
    pub sharpness: f64,
    /// Lighting threshold.
    pub lighting: f64,
    /// Colour threshold.
    pub color: f64,
    /// Noise threshold.
    pub noise: f64,
    /// Resolution threshold.
    pub resolution: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            sharpness: 60.0,
            lighting: 60.0,
            color: 60.0,
            noise: 60.0,
            resolution: 100.0,
        }
    }
}

impl QualityThresholds {
    /// Threshold for one axis.
    #[must_use]
    pub const fn get(&self, axis: QualityAxis) -> f64 {
        match axis {
            QualityAxis::Sharpness => self.sharpness,
            QualityAxis::Lighting => self.lighting,
            QualityAxis::Color => self.color,
            QualityAxis::Noise => self.noise,
            QualityAxis::Resolution => self.resolution,
        }
    }
}

/// Quality engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Axis weights.
    pub weights: QualityWeights,
    /// Per-axis issue thresholds.
    pub thresholds: QualityThresholds,
    /// Laplacian variance that scores 100.
    pub sharpness_reference: f64,
    /// Noise sigma that scores 0.
    pub noise_reference: f64,
    /// Channel spread (0.0 to 1.0) on neutral areas that scores 0.
    pub color_cast_reference: f64,
    /// Tile size for the noise estimate.
    pub noise_block: u32,
    /// Minimum width in pixels.
    pub min_width: u32,
    /// Minimum height in pixels.
    pub min_height: u32,
    /// Minimum overall score for `passes_threshold`.
    pub minimum_overall: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            thresholds: QualityThresholds::default(),
            sharpness_reference: 100.0,
            noise_reference: 20.0,
            color_cast_reference: 0.15,
            noise_block: 8,
            min_width: 300,
            min_height: 400,
            minimum_overall: 70.0,
        }
    }
}

impl QualityConfig {
    /// Validates weights and references.
    ///
    /// # Errors
    ///
    /// Returns an error message if a weight is negative, the weights do not
    /// sum to 1.0, or a reference value is not positive.
    pub fn validate(&self) -> Result<(), String> {
        for axis in QualityAxis::ALL {
            if self.weights.get(axis) < 0.0 {
                return Err(format!("quality weight for {} is negative", axis.as_str()));
            }
        }
        let total = self.weights.total();
        if (total - 1.0).abs() > 1e-6 {
            return Err(format!("quality weights must sum to 1.0, got {total:.3}"));
        }
        if self.sharpness_reference <= 0.0
            || self.noise_reference <= 0.0
            || self.color_cast_reference <= 0.0
        {
            return Err("quality reference values must be positive".to_string());
        }
        if !(0.0..=100.0).contains(&self.minimum_overall) {
            return Err(format!(
                "minimum_overall must be 0-100, got {}",
                self.minimum_overall
            ));
        }
        Ok(())
    }
}
