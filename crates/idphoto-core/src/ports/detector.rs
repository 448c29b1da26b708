//! Face detector and background segmenter ports.
//!
//! Both are black-box feature extractors. Coordinates are in the pixel
//! space of the image passed in.

use crate::domain::{BackgroundMask, BoundingBox, FaceDetection, FaceFeatures, ImageInfo};

/// Port for locating faces and extracting their features.
pub trait FaceDetector: Send + Sync {
    /// Detects faces in the image. An empty list means no face was found.
    ///
    /// # Errors
    ///
    /// Returns an error if detection could not run.
    fn detect_faces(&self, image: &ImageInfo) -> anyhow::Result<Vec<FaceDetection>>;

    /// Extracts landmarks and attributes for the face inside `bbox`.
    ///
    /// # Errors
    ///
    /// Returns an error if feature extraction fails.
    fn extract_face_features(
        &self,
        image: &ImageInfo,
        bbox: &BoundingBox,
    ) -> anyhow::Result<FaceFeatures>;
}

/// Port for separating the subject from the background.
pub trait BackgroundSegmenter: Send + Sync {
    /// Returns a mask the size of `image` marking background pixels.
    ///
    /// # Errors
    ///
    /// Returns an error if segmentation fails.
    fn segment_background(&self, image: &ImageInfo) -> anyhow::Result<BackgroundMask>;
}
