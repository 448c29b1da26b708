//! Correction primitive port.

use crate::domain::{CorrectionKind, CorrectionParameters};

/// A pixel-level correction, `apply(image, params) -> image'`.
///
/// Implementations must not modify their input; the executor keeps it as
/// the rollback snapshot.
pub trait CorrectionPrimitive: Send + Sync {
    /// Operation this primitive implements.
    fn kind(&self) -> CorrectionKind;

    /// Applies the correction, returning a new image of the same size.
    ///
    /// # Errors
    ///
    /// Returns an error if the correction cannot be applied.
    fn apply(
        &self,
        image: &image::RgbImage,
        params: &CorrectionParameters,
    ) -> anyhow::Result<image::RgbImage>;
}
