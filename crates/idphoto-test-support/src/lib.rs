//! Test support utilities for idphoto.
//!
//! Provides synthetic portraits with matching detector output, flat test
//! images, and mock implementations of every core port.
//!
//! # Example
//!
//! ```
//! use idphoto_test_support::{Lenses, MockImageSource, SyntheticPortraitBuilder};
//!
//! let compliant = SyntheticPortraitBuilder::compliant().path("ok.png");
//! let glasses = SyntheticPortraitBuilder::compliant()
//!     .path("glasses.png")
//!     .glasses(Lenses::Tinted);
//!
//! let detector = compliant.detector();
//! let source = MockImageSource::new(vec![compliant.build().into(), glasses.build().into()]);
//! ```

mod builders;
mod mocks;

pub use builders::{Lenses, SyntheticImageBuilder, SyntheticPortraitBuilder};
pub use mocks::{
    MockCorrection, MockFaceDetector, MockImageLoader, MockImageSource, MockProgressSink,
    MockResultOutput, MockSegmenter,
};
