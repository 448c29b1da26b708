//! Quality engine output types.

use serde::{Deserialize, Serialize};

/// Independent axes scored by the quality engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityAxis {
    /// Focus / edge sharpness.
    Sharpness,
    /// Exposure on the subject.
    Lighting,
    /// White balance and colour cast.
    Color,
    /// Sensor noise.
    Noise,
    /// Pixel resolution against the required minimum.
    Resolution,
}

impl QualityAxis {
    /// All axes in scoring order.
    pub const ALL: [Self; 5] = [
        Self::Sharpness,
        Self::Lighting,
        Self::Color,
        Self::Noise,
        Self::Resolution,
    ];

    /// Lowercase axis name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sharpness => "sharpness",
            Self::Lighting => "lighting",
            Self::Color => "color",
            Self::Noise => "noise",
            Self::Resolution => "resolution",
        }
    }
}

/// Raw measurements behind the sub-scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityDetails {
    /// Variance of the Laplacian over the assessed region.
    pub laplacian_variance: f64,
    /// Mean luminance of the assessed region.
    pub mean_luminance: f64,
    /// Underexposure score (0.0 to 1.0).
    pub under_exposure: f32,
    /// Overexposure score (0.0 to 1.0).
    pub over_exposure: f32,
    /// Largest channel deviation from grey (0.0 to 1.0).
    pub color_cast: f64,
    /// Estimated noise standard deviation in luminance levels.
    pub noise_sigma: f64,
    /// Smallest of width/height ratios against the required resolution.
    pub resolution_ratio: f64,
}

/// Per-axis quality scores for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Sharpness score (0-100).
    pub sharpness_score: f64,
    /// Lighting score (0-100).
    pub lighting_score: f64,
    /// Colour score (0-100).
    pub color_score: f64,
    /// Noise score (0-100, higher is cleaner).
    pub noise_score: f64,
    /// Resolution score (0-100).
    pub resolution_score: f64,
    /// Weighted overall score (0-100).
    pub overall_score: f64,
    /// Problems found, one per failing axis.
    pub issues: Vec<String>,
    /// Suggested remedies, parallel to `issues`.
    pub suggestions: Vec<String>,
    /// Raw measurements.
    pub details: QualityDetails,
}

impl QualityMetrics {
    /// Score for a single axis.
    #[must_use]
    pub const fn score(&self, axis: QualityAxis) -> f64 {
        match axis {
            QualityAxis::Sharpness => self.sharpness_score,
            QualityAxis::Lighting => self.lighting_score,
            QualityAxis::Color => self.color_score,
            QualityAxis::Noise => self.noise_score,
            QualityAxis::Resolution => self.resolution_score,
        }
    }
}

/// Letter-style grade for an overall quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    /// 90 and above.
    Excellent,
    /// 75 to 89.
    Good,
    /// 60 to 74.
    Fair,
    /// Below 60.
    Poor,
}

impl QualityGrade {
    /// Grade for a 0-100 score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::Excellent
        } else if score >= 75.0 {
            Self::Good
        } else if score >= 60.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// Quality score aggregated over repeated measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallQualityScore {
    /// Mean overall score (0-100).
    pub score: f64,
    /// Grade for `score`.
    pub grade: QualityGrade,
    /// Whether `score` meets the configured minimum.
    pub passes_threshold: bool,
    /// `1 - stdev/mean`, clamped to 0.0..=1.0.
    pub confidence: f64,
    /// Mean score per axis.
    pub breakdown: Vec<(QualityAxis, f64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(QualityGrade::from_score(90.0), QualityGrade::Excellent);
        assert_eq!(QualityGrade::from_score(89.99), QualityGrade::Good);
        assert_eq!(QualityGrade::from_score(75.0), QualityGrade::Good);
        assert_eq!(QualityGrade::from_score(74.9), QualityGrade::Fair);
        assert_eq!(QualityGrade::from_score(60.0), QualityGrade::Fair);
        assert_eq!(QualityGrade::from_score(59.9), QualityGrade::Poor);
    }
}
