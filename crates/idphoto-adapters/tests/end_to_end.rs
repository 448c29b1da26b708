//! Controller runs wired to the filesystem adapters.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use idphoto_adapters::{
    default_corrections, sidecar_path, BorderColorSegmenter, FsImageLoader, FsImageSource,
    SidecarFaceDetector,
};
use idphoto_core::domain::{CorrectionKind, ImageInput};
use idphoto_core::ports::{FaceDetector, ImageSource};
use idphoto_core::{ControllerConfig, ProcessingController, ProcessingOptions};
use idphoto_test_support::SyntheticPortraitBuilder;
use serde_json::json;
use tempfile::TempDir;

/// Saves `portrait` as PNG with a sidecar recorded at `sidecar_width`.
fn save(dir: &Path, name: &str, portrait: &SyntheticPortraitBuilder, sidecar_width: u32) -> PathBuf {
    let path = dir.join(name);
    portrait.build().to_rgb8().save(&path).unwrap();

    #[allow(clippy::cast_precision_loss)]
    let factor = sidecar_width as f32 / portrait.build().width as f32;
    let detection = portrait.detection();
    let sidecar = json!({
        "width": sidecar_width,
        "faces": [{
            "bbox": detection.bbox.scaled(factor),
            "confidence": detection.confidence,
            "features": portrait.features().scaled(factor),
        }]
    });
    std::fs::write(sidecar_path(&path), sidecar.to_string()).unwrap();
    path
}

fn controller() -> ProcessingController {
    ProcessingController::builder(Arc::new(FsImageLoader), Arc::new(SidecarFaceDetector::new()))
        .segmenter(Arc::new(BorderColorSegmenter::default()))
        .corrections(default_corrections())
        .config(ControllerConfig {
            workers: 2,
            ..ControllerConfig::default()
        })
        .build()
        .unwrap()
}

#[test]
fn test_sidecar_coordinates_follow_image_width() {
    let dir = TempDir::new().unwrap();
    let portrait = SyntheticPortraitBuilder::compliant();
    let path = save(dir.path(), "alice.png", &portrait, 600);

    let image = idphoto_core::ports::ImageLoader::load(&FsImageLoader, &path).unwrap();
    let faces = SidecarFaceDetector::new().detect_faces(&image).unwrap();
    assert_eq!(faces.len(), 1);
    let bbox = faces[0].bbox;
    let expected = portrait.detection().bbox;
    assert!(bbox.x.abs_diff(expected.x) <= 1, "{bbox:?} vs {expected:?}");
    assert!(bbox.width.abs_diff(expected.width) <= 1, "{bbox:?} vs {expected:?}");

    let features = SidecarFaceDetector::new()
        .extract_face_features(&image, &bbox)
        .unwrap();
    let eye = features.eye_positions.0;
    assert!((eye.x - portrait.features().eye_positions.0.x).abs() < 1.0);
}

#[test]
fn test_malformed_sidecar_is_an_error() {
    let dir = TempDir::new().unwrap();
    let portrait = SyntheticPortraitBuilder::compliant();
    let path = save(dir.path(), "bob.png", &portrait, 300);
    std::fs::write(sidecar_path(&path), "{ not json").unwrap();

    let image = idphoto_core::ports::ImageLoader::load(&FsImageLoader, &path).unwrap();
    assert!(SidecarFaceDetector::new().detect_faces(&image).is_err());
}

#[test]
fn test_compliant_photo_on_disk_passes() {
    let dir = TempDir::new().unwrap();
    let portrait = SyntheticPortraitBuilder::compliant();
    let path = save(dir.path(), "carol.png", &portrait, 300);

    let result = controller().process_image(path, "ICAO", &ProcessingOptions::default());
    assert!(result.success, "{:?}", result.error_message);
    assert!(result.passes(), "{:?}", result.validation_result);
}

#[test]
fn test_grey_backdrop_is_fixed_on_disk() {
    let dir = TempDir::new().unwrap();
    let portrait = SyntheticPortraitBuilder::compliant().background([200, 200, 200]);
    let path = save(dir.path(), "dave.png", &portrait, 300);

    let result = controller().process_image(path, "ICAO", &ProcessingOptions { auto_fix: true });
    assert!(result.success, "{:?}", result.error_message);

    let validation = result.validation_result.as_ref().unwrap();
    assert!(!validation.report.rule_passes("ICAO.6.1.1"));

    let fix = result.auto_fix_result.as_ref().expect("auto-fix should run");
    assert!(fix.applied_corrections.contains(&CorrectionKind::BackgroundCorrection));
    assert!(fix.after_report.rule_passes("ICAO.6.1.1"));
    assert!(fix.improvement.overall_compliance_improvement > 0.0);
}

#[test]
fn test_directory_batch_reports_missing_sidecar_as_no_face() {
    let dir = TempDir::new().unwrap();
    let portrait = SyntheticPortraitBuilder::compliant();
    save(dir.path(), "a.png", &portrait, 300);
    let orphan = dir.path().join("b.png");
    portrait.build().to_rgb8().save(&orphan).unwrap();

    let source = FsImageSource::new(vec![dir.path().to_path_buf()], false);
    let inputs: Vec<ImageInput> = source.inputs().collect();
    let batch = controller().batch_process(inputs, "ICAO", &ProcessingOptions::default());

    assert_eq!(batch.results.len(), 2);
    assert!(batch.results[0].passes());
    let orphan_result = &batch.results[1];
    assert!(orphan_result.path.ends_with("b.png"));
    assert!(!orphan_result.passes());
    assert!(orphan_result.requires_manual_review());
}
