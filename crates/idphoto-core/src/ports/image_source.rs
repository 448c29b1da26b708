//! Image source and loader ports.

use std::path::Path;

use crate::domain::{ImageInfo, ImageInput};

/// Port for enumerating images to process.
pub trait ImageSource: Send + Sync {
    /// Returns an iterator over inputs from this source.
    fn inputs(&self) -> Box<dyn Iterator<Item = ImageInput> + Send + '_>;

    /// Returns the total number of inputs, if known.
    fn count_hint(&self) -> Option<usize>;
}

/// Port for decoding an image file during the loading stage.
pub trait ImageLoader: Send + Sync {
    /// Loads and decodes the image at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or not an image.
    fn load(&self, path: &Path) -> anyhow::Result<ImageInfo>;
}
