//! Face detector backed by JSON sidecar files.
//!
//! An external landmark model writes its output next to each photo as
//! `<stem>.faces.json`:
//!
//! ```json
//! {
//!   "width": 600,
//!   "faces": [
//!     {
//!       "bbox": { "x": 150, "y": 140, "width": 300, "height": 440 },
//!       "confidence": 0.97,
//!       "features": {
//!         "glasses_detected": false,
//!         "head_covering_detected": false,
//!         "eye_positions": [{ "x": 240.0, "y": 316.0 }, { "x": 360.0, "y": 316.0 }],
//!         "mouth_position": { "x": 300.0, "y": 483.0 },
//!         "mouth_openness": 0.05,
//!         "eye_openness": [0.9, 0.9],
//!         "face_orientation": { "yaw": 0.0, "pitch": 0.0, "roll": 0.0 }
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! Coordinates refer to an image `width` pixels wide (the photo's own width
//! when omitted) and are rescaled to the image being analysed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use idphoto_core::domain::{BoundingBox, FaceDetection, FaceFeatures, ImageInfo};
use idphoto_core::ports::FaceDetector;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SidecarFile {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    faces: Vec<SidecarFace>,
}

#[derive(Debug, Deserialize)]
struct SidecarFace {
    bbox: BoundingBox,
    confidence: f32,
    features: FaceFeatures,
}

/// Path of the sidecar describing `image`.
#[must_use]
pub fn sidecar_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    image.with_file_name(format!("{stem}.faces.json"))
}

/// Reads face detections and landmarks from `<stem>.faces.json` sidecars.
///
/// A photo without a sidecar has no detectable face.
#[derive(Debug, Default, Clone, Copy)]
pub struct SidecarFaceDetector;

impl SidecarFaceDetector {
    /// Creates the detector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Faces for `image` rescaled to its width, or `None` without a sidecar.
    fn faces(image: &ImageInfo) -> Result<Option<Vec<(FaceDetection, FaceFeatures)>>> {
        let path = sidecar_path(Path::new(&image.path));
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No sidecar for {}", image.path);
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let sidecar: SidecarFile = serde_json::from_str(&text)
            .with_context(|| format!("Malformed sidecar {}", path.display()))?;

        #[allow(clippy::cast_precision_loss)]
        let scale = sidecar
            .width
            .filter(|w| *w > 0)
            .map_or(1.0, |w| image.width as f32 / w as f32);
        Ok(Some(
            sidecar
                .faces
                .into_iter()
                .map(|face| {
                    let detection = FaceDetection {
                        bbox: face.bbox.scaled(scale).clamp_to(image.width, image.height),
                        confidence: face.confidence,
                    };
                    (detection, face.features.scaled(scale))
                })
                .collect(),
        ))
    }
}

fn centre_distance(a: &BoundingBox, b: &BoundingBox) -> f32 {
    a.center().distance(&b.center())
}

impl FaceDetector for SidecarFaceDetector {
    fn detect_faces(&self, image: &ImageInfo) -> Result<Vec<FaceDetection>> {
        let faces = Self::faces(image)?.unwrap_or_default();
        debug!("{}: {} face(s) in sidecar", image.path, faces.len());
        Ok(faces.into_iter().map(|(detection, _)| detection).collect())
    }

    fn extract_face_features(&self, image: &ImageInfo, bbox: &BoundingBox) -> Result<FaceFeatures> {
        Self::faces(image)?
            .unwrap_or_default()
            .into_iter()
            .min_by(|(a, _), (b, _)| {
                centre_distance(&a.bbox, bbox).total_cmp(&centre_distance(&b.bbox, bbox))
            })
            .map(|(_, features)| features)
            .with_context(|| format!("No landmarks for {} in sidecar", image.path))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/photos/alice.jpg")),
            PathBuf::from("/photos/alice.faces.json")
        );
        assert_eq!(
            sidecar_path(Path::new("bob.v2.png")),
            PathBuf::from("bob.v2.faces.json")
        );
    }

    #[test]
    fn test_missing_sidecar_means_no_face() {
        let image = ImageInfo::new(
            "/nonexistent/portrait.png",
            image::DynamicImage::new_rgb8(10, 10),
        );
        assert!(SidecarFaceDetector::new().detect_faces(&image).unwrap().is_empty());
        assert!(SidecarFaceDetector::new()
            .extract_face_features(&image, &BoundingBox::new(0, 0, 5, 5))
            .is_err());
    }
}
