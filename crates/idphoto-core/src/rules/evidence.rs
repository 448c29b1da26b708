//! Inputs to rule evaluation.

use std::borrow::Cow;

use crate::domain::{
    BackgroundMask, BoundingBox, FaceDetection, FaceFeatures, ImageInfo, QualityMetrics,
};

/// Detector output for the face being validated.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceEvidence {
    /// Detection box and confidence.
    pub detection: FaceDetection,
    /// Extracted features.
    pub features: FaceFeatures,
}

/// Everything the rule categories read, gathered once per validation.
#[derive(Debug)]
pub struct ValidationEvidence<'a> {
    /// RGB pixels.
    pub rgb: image::RgbImage,
    /// Luminance pixels.
    pub luma: image::GrayImage,
    /// The validated face, if one was detected.
    pub face: Option<&'a FaceEvidence>,
    /// Number of faces the detector reported.
    pub face_count: usize,
    /// Quality engine output for the image.
    pub quality: &'a QualityMetrics,
    /// Segmenter mask, if segmentation ran.
    pub mask: Option<&'a BackgroundMask>,
}

impl<'a> ValidationEvidence<'a> {
    /// Evidence without face or mask.
    #[must_use]
    pub fn new(image: &ImageInfo, quality: &'a QualityMetrics) -> Self {
        Self {
            rgb: image.to_rgb8(),
            luma: image.to_luma8(),
            face: None,
            face_count: 0,
            quality,
            mask: None,
        }
    }

    /// Adds the validated face and the total face count.
    #[must_use]
    pub fn with_face(mut self, face: &'a FaceEvidence, face_count: usize) -> Self {
        self.face = Some(face);
        self.face_count = face_count.max(1);
        self
    }

    /// Adds a segmenter mask.
    #[must_use]
    pub fn with_mask(mut self, mask: Option<&'a BackgroundMask>) -> Self {
        self.mask = mask;
        self
    }

    /// Image width.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    /// Image height.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    /// Face box clipped to the image.
    #[must_use]
    pub fn face_box(&self) -> Option<BoundingBox> {
        self.face
            .map(|f| f.detection.bbox.clamp_to(self.width(), self.height()))
    }

    /// Background mask: the segmenter's when it fits the image, otherwise
    /// everything outside the face box grown by 20% and the torso below it.
    #[must_use]
    pub fn background_mask(&self) -> Option<Cow<'a, BackgroundMask>> {
        let (w, h) = (self.width(), self.height());
        if let Some(mask) = self.mask.filter(|m| m.fits(w, h)) {
            return Some(Cow::Borrowed(mask));
        }
        let face = self.face_box()?;
        let head = face.expand(0.2, w, h);
        let shoulders = face.expand(0.5, w, h);
        Some(Cow::Owned(BackgroundMask::from_fn(w, h, |x, y| {
            let torso = y >= face.bottom() && x >= shoulders.x && x < shoulders.right();
            !head.contains(x, y) && !torso
        })))
    }
}
