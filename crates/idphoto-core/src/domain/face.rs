//! Face detector output consumed by the rules engine.

use serde::{Deserialize, Serialize};

use super::{BoundingBox, Point};

/// A single face returned by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    /// Face bounding box in pixels.
    pub bbox: BoundingBox,
    /// Detection confidence (0.0 to 1.0).
    pub confidence: f32,
}

/// Head pose in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceOrientation {
    /// Left/right rotation.
    pub yaw: f32,
    /// Up/down rotation.
    pub pitch: f32,
    /// In-plane tilt.
    pub roll: f32,
}

impl FaceOrientation {
    /// Combined gaze deviation `sqrt(yaw² + pitch²)`.
    #[must_use]
    pub fn gaze_deviation(&self) -> f32 {
        self.yaw.hypot(self.pitch)
    }
}

/// Facial features that must stay visible under a head covering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacialFeature {
    /// Both eyes.
    Eyes,
    /// Nose.
    Nose,
    /// Mouth.
    Mouth,
    /// Chin.
    Chin,
}

impl FacialFeature {
    /// All features in declaration order.
    pub const ALL: [Self; 4] = [Self::Eyes, Self::Nose, Self::Mouth, Self::Chin];

    /// Lowercase feature name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eyes => "eyes",
            Self::Nose => "nose",
            Self::Mouth => "mouth",
            Self::Chin => "chin",
        }
    }
}

/// Per-feature visibility (0.0 hidden to 1.0 fully visible).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVisibility {
    /// Eye visibility.
    pub eyes: f32,
    /// Nose visibility.
    pub nose: f32,
    /// Mouth visibility.
    pub mouth: f32,
    /// Chin visibility.
    pub chin: f32,
}

impl Default for FeatureVisibility {
    fn default() -> Self {
        Self {
            eyes: 1.0,
            nose: 1.0,
            mouth: 1.0,
            chin: 1.0,
        }
    }
}

impl FeatureVisibility {
    /// Visibility of a single feature.
    #[must_use]
    pub const fn get(&self, feature: FacialFeature) -> f32 {
        match feature {
            FacialFeature::Eyes => self.eyes,
            FacialFeature::Nose => self.nose,
            FacialFeature::Mouth => self.mouth,
            FacialFeature::Chin => self.chin,
        }
    }

    /// Mean visibility across all required features.
    #[must_use]
    pub fn score(&self) -> f32 {
        FacialFeature::ALL.iter().map(|f| self.get(*f)).sum::<f32>() / 4.0
    }

    /// Features whose visibility falls below `min_visibility`.
    #[must_use]
    pub fn missing(&self, min_visibility: f32) -> Vec<FacialFeature> {
        FacialFeature::ALL
            .into_iter()
            .filter(|f| self.get(*f) < min_visibility)
            .collect()
    }
}

/// Features extracted for one detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceFeatures {
    /// Whether glasses were detected.
    pub glasses_detected: bool,
    /// Whether any head covering was detected.
    pub head_covering_detected: bool,
    /// Left and right eye centres.
    pub eye_positions: (Point, Point),
    /// Mouth centre.
    pub mouth_position: Point,
    /// Mouth openness (0.0 closed to 1.0 wide open).
    pub mouth_openness: f32,
    /// Smile intensity (0.0 neutral to 1.0 broad smile).
    #[serde(default)]
    pub smile_score: f32,
    /// Left and right eye openness (0.0 closed to 1.0 open).
    pub eye_openness: (f32, f32),
    /// Head pose.
    pub face_orientation: FaceOrientation,
    /// Visibility of the features checked under head coverings.
    #[serde(default)]
    pub feature_visibility: FeatureVisibility,
}

impl FaceFeatures {
    /// Midpoint between the eyes.
    #[must_use]
    pub fn eye_center(&self) -> Point {
        self.eye_positions.0.midpoint(&self.eye_positions.1)
    }

    /// Rescales landmark coordinates after the image was resized.
    #[must_use]
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            eye_positions: (
                self.eye_positions.0.scaled(factor),
                self.eye_positions.1.scaled(factor),
            ),
            mouth_position: self.mouth_position.scaled(factor),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaze_deviation() {
        let pose = FaceOrientation {
            yaw: 3.0,
            pitch: 4.0,
            roll: 0.0,
        };
        assert!((pose.gaze_deviation() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_visibility_missing_features_in_order() {
        let visibility = FeatureVisibility {
            eyes: 1.0,
            nose: 0.2,
            mouth: 0.9,
            chin: 0.1,
        };
        assert_eq!(
            visibility.missing(0.5),
            vec![FacialFeature::Nose, FacialFeature::Chin]
        );
        assert!((visibility.score() - 0.55).abs() < 1e-6);
    }
}
