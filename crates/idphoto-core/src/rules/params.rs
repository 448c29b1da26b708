//! Per-format rule parameter tables.
//!
//! A [`RuleParameters`] value is immutable once built and is passed into
//! every validation call. Selecting another country variation means
//! building another value, never mutating a shared one.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::RuleCategory;

/// Supported photo formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CountryVariation {
    /// ICAO Doc 9303 baseline.
    #[serde(rename = "ICAO")]
    Icao,
    /// UAE Federal Authority for Identity and Citizenship.
    #[serde(rename = "ICS-UAE")]
    IcsUae,
    /// US passport and visa.
    #[serde(rename = "US")]
    Us,
}

impl CountryVariation {
    /// All supported variations.
    pub const ALL: [Self; 3] = [Self::Icao, Self::IcsUae, Self::Us];

    /// Canonical format name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Icao => "ICAO",
            Self::IcsUae => "ICS-UAE",
            Self::Us => "US",
        }
    }
}

impl std::fmt::Display for CountryVariation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CountryVariation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|v| v.name() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown format '{s}' (expected one of: {})",
                    Self::ALL.map(Self::name).join(", ")
                )
            })
    }
}

/// Eyewear rule parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlassesParameters {
    /// Whether glasses may be worn at all.
    pub allowed: bool,
    /// Maximum saturation/value delta between lens and skin.
    pub max_tint_delta: f64,
    /// Maximum edge density inside a lens box.
    pub max_frame_edge_density: f64,
    /// Sobel magnitude counted as an edge.
    pub edge_threshold: f64,
    /// Maximum fraction of glare pixels inside a lens box.
    pub max_glare_ratio: f64,
    /// Luminance counted as glare.
    pub glare_luminance: u8,
    /// Lens box side as a fraction of face width.
    pub lens_box_ratio: f32,
}

/// Head covering rule parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadCoveringParameters {
    /// Minimum visibility score for a covering to count as religious-exempt.
    pub min_visibility: f32,
    /// Visibility below which a single feature counts as hidden.
    pub feature_min_visibility: f32,
}

/// Expression rule parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionParameters {
    /// Maximum mouth openness.
    pub max_mouth_openness: f32,
    /// Maximum smile score for a neutral expression.
    pub max_smile: f32,
    /// Maximum `sqrt(yaw² + pitch²)` in degrees.
    pub max_gaze_deviation: f32,
    /// Minimum openness of each eye.
    pub min_eye_openness: f32,
    /// Maximum absolute roll in degrees.
    pub max_roll: f32,
}

/// Minimum quality sub-scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRuleParameters {
    /// Minimum sharpness score.
    pub min_sharpness: f64,
    /// Minimum lighting score.
    pub min_lighting: f64,
    /// Minimum resolution score.
    pub min_resolution: f64,
    /// Minimum noise score.
    pub min_noise: f64,
    /// Minimum colour score.
    pub min_color: f64,
}

/// Background and lighting rule parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleParameters {
    /// Required background colour.
    pub background_color: [u8; 3],
    /// Maximum Euclidean RGB distance from `background_color`.
    pub background_tolerance: f64,
    /// Minimum background uniformity (0.0 to 1.0).
    pub min_uniformity: f64,
    /// Maximum shadow intensity (0.0 to 1.0).
    pub max_shadow: f64,
    /// Maximum fraction of specular pixels on the face.
    pub max_flash_ratio: f64,
    /// Luminance counted as a specular highlight.
    pub flash_luminance: u8,
    /// Maximum fraction of red-dominant pixels in an eye region.
    pub max_red_eye_ratio: f64,
}

/// Image dimension and face placement parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryParameters {
    /// Required width in pixels.
    pub width: u32,
    /// Required height in pixels.
    pub height: u32,
    /// Whether dimensions must match exactly rather than as a minimum.
    pub exact_dimensions: bool,
    /// Allowed face height as a fraction of image height.
    pub face_height_ratio: (f64, f64),
    /// Allowed eye line height as a fraction of image height from the top.
    pub eye_height_ratio: (f64, f64),
    /// Maximum horizontal offset of the face centre as a fraction of width.
    pub centering_tolerance: f64,
    /// Whether more than one detected face fails the photo.
    pub single_face_only: bool,
}

/// Complete, immutable rule parameter table for one format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleParameters {
    /// Format these parameters implement.
    pub variation: CountryVariation,
    /// Eyewear rules.
    pub glasses: GlassesParameters,
    /// Head covering rules.
    pub head_covering: HeadCoveringParameters,
    /// Expression rules.
    pub expression: ExpressionParameters,
    /// Quality rules.
    pub quality: QualityRuleParameters,
    /// Background and lighting rules.
    pub style: StyleParameters,
    /// Dimension and placement rules.
    pub geometry: GeometryParameters,
    /// Category weights for the overall score.
    pub category_weights: Vec<(RuleCategory, f64)>,
    /// Minimum overall score to pass.
    pub pass_threshold: f64,
}

impl Default for RuleParameters {
    fn default() -> Self {
        Self::for_variation(CountryVariation::Icao)
    }
}

impl RuleParameters {
    /// Parameter table for a format.
    #[must_use]
    pub fn for_variation(variation: CountryVariation) -> Self {
        let icao = Self::icao();
        match variation {
            CountryVariation::Icao => icao,
            CountryVariation::IcsUae => Self {
                variation,
                expression: ExpressionParameters {
                    max_mouth_openness: 0.06,
                    max_gaze_deviation: 6.0,
                    min_eye_openness: 0.28,
                    max_roll: 2.0,
                    ..icao.expression
                },
                style: StyleParameters {
                    background_color: [240, 240, 240],
                    background_tolerance: 12.0,
                    ..icao.style
                },
                geometry: GeometryParameters {
                    width: 413,
                    height: 531,
                    exact_dimensions: true,
                    face_height_ratio: (0.62, 0.69),
                    eye_height_ratio: (0.33, 0.36),
                    centering_tolerance: 0.05,
                    single_face_only: true,
                },
                ..icao
            },
            CountryVariation::Us => Self {
                variation,
                glasses: GlassesParameters {
                    allowed: false,
                    ..icao.glasses
                },
                style: StyleParameters {
                    background_tolerance: 30.0,
                    ..icao.style
                },
                geometry: GeometryParameters {
                    width: 600,
                    height: 600,
                    face_height_ratio: (0.50, 0.69),
                    eye_height_ratio: (0.31, 0.44),
                    ..icao.geometry
                },
                ..icao
            },
        }
    }

    /// Parameter table for a format name such as `"ICS-UAE"`.
    ///
    /// # Errors
    ///
    /// Returns an error message for an unknown format.
    pub fn for_format(name: &str) -> Result<Self, String> {
        name.parse().map(Self::for_variation)
    }

    fn icao() -> Self {
        Self {
            variation: CountryVariation::Icao,
            glasses: GlassesParameters {
                allowed: true,
                max_tint_delta: 0.3,
                max_frame_edge_density: 0.25,
                edge_threshold: 100.0,
                max_glare_ratio: 0.15,
                glare_luminance: 240,
                lens_box_ratio: 0.25,
            },
            head_covering: HeadCoveringParameters {
                min_visibility: 0.85,
                feature_min_visibility: 0.5,
            },
            expression: ExpressionParameters {
                max_mouth_openness: 0.1,
                max_smile: 0.3,
                max_gaze_deviation: 10.0,
                min_eye_openness: 0.25,
                max_roll: 5.0,
            },
            quality: QualityRuleParameters {
                min_sharpness: 60.0,
                min_lighting: 60.0,
                min_resolution: 100.0,
                min_noise: 60.0,
                min_color: 60.0,
            },
            style: StyleParameters {
                background_color: [255, 255, 255],
                background_tolerance: 40.0,
                min_uniformity: 0.85,
                max_shadow: 0.15,
                max_flash_ratio: 0.05,
                flash_luminance: 250,
                max_red_eye_ratio: 0.2,
            },
            geometry: GeometryParameters {
                width: 300,
                height: 400,
                exact_dimensions: false,
                face_height_ratio: (0.50, 0.80),
                eye_height_ratio: (0.30, 0.50),
                centering_tolerance: 0.1,
                single_face_only: true,
            },
            category_weights: RuleCategory::ALL.iter().map(|c| (*c, 1.0)).collect(),
            pass_threshold: 75.0,
        }
    }

    /// Weight of a category in the overall score (0 if absent).
    #[must_use]
    pub fn category_weight(&self, category: RuleCategory) -> f64 {
        self.category_weights
            .iter()
            .find(|(c, _)| *c == category)
            .map_or(0.0, |(_, w)| *w)
    }

    /// Returns a copy with a different head-covering visibility threshold.
    #[must_use]
    pub fn with_head_covering_threshold(mut self, min_visibility: f32) -> Self {
        self.head_covering.min_visibility = min_visibility;
        self
    }

    /// Returns a copy with a different pass threshold.
    #[must_use]
    pub fn with_pass_threshold(mut self, pass_threshold: f64) -> Self {
        self.pass_threshold = pass_threshold;
        self
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns an error message describing the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.head_covering.min_visibility) {
            return Err(format!(
                "head covering visibility threshold must be 0.0-1.0, got {}",
                self.head_covering.min_visibility
            ));
        }
        if !(0.0..=100.0).contains(&self.pass_threshold) {
            return Err(format!(
                "pass threshold must be 0-100, got {}",
                self.pass_threshold
            ));
        }
        let (lo, hi) = self.geometry.face_height_ratio;
        if lo > hi {
            return Err(format!("face height range {lo}-{hi} is inverted"));
        }
        let (lo, hi) = self.geometry.eye_height_ratio;
        if lo > hi {
            return Err(format!("eye height range {lo}-{hi} is inverted"));
        }
        if self.category_weights.iter().any(|(_, w)| *w < 0.0) {
            return Err("category weights must not be negative".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variation_names() {
        assert_eq!("icao".parse::<CountryVariation>(), Ok(CountryVariation::Icao));
        assert_eq!("ics_uae".parse::<CountryVariation>(), Ok(CountryVariation::IcsUae));
        assert_eq!(" US ".parse::<CountryVariation>(), Ok(CountryVariation::Us));
        let err = "schengen".parse::<CountryVariation>().unwrap_err();
        assert!(err.contains("ICS-UAE"), "got {err}");
    }

    #[test]
    fn test_ics_uae_table() {
        let params = RuleParameters::for_variation(CountryVariation::IcsUae);
        assert_eq!(params.style.background_color, [240, 240, 240]);
        assert!((params.style.background_tolerance - 12.0).abs() < f64::EPSILON);
        assert_eq!((params.geometry.width, params.geometry.height), (413, 531));
        assert!(params.geometry.exact_dimensions);
        assert!((params.expression.max_roll - 2.0).abs() < f32::EPSILON);
        // untouched sections fall back to ICAO
        assert_eq!(params.head_covering, RuleParameters::default().head_covering);
    }

    #[test]
    fn test_us_forbids_glasses() {
        assert!(!RuleParameters::for_format("US").unwrap().glasses.allowed);
        assert!(RuleParameters::for_format("ICAO").unwrap().glasses.allowed);
    }

    #[test]
    fn test_builders_return_new_values() {
        let base = RuleParameters::default();
        let strict = base.clone().with_head_covering_threshold(0.95);
        assert!((base.head_covering.min_visibility - 0.85).abs() < f32::EPSILON);
        assert!((strict.head_covering.min_visibility - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn test_validate() {
        assert!(RuleParameters::default().validate().is_ok());
        let bad = RuleParameters::default().with_head_covering_threshold(1.5);
        assert!(bad.validate().is_err());
    }
}
