//! Port definitions for hexagonal architecture.
//!
//! These traits define the boundaries between the domain core and external adapters.

mod correction;
mod detector;
mod image_source;
mod progress;
mod result_output;

pub use correction::CorrectionPrimitive;
pub use detector::{BackgroundSegmenter, FaceDetector};
pub use image_source::{ImageLoader, ImageSource};
pub use progress::ProgressSink;
pub use result_output::ResultOutput;
