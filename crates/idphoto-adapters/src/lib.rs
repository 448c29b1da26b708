//! ID Photo Adapters - External adapters for idphoto.
//!
//! This crate provides adapters for:
//! - Filesystem image source and loader
//! - Face detection from JSON sidecar files
//! - Border-colour background segmentation
//! - Background, lighting and geometry correction primitives

pub mod correct;
pub mod fs;
pub mod segment;
pub mod sidecar;

pub use correct::{default_corrections, BackgroundFill, GeometryCorrection, LightingGain};
pub use fs::{FsImageLoader, FsImageSource};
pub use segment::BorderColorSegmenter;
pub use sidecar::{sidecar_path, SidecarFaceDetector};
