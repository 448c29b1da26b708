//! Shared helpers: synthetic portraits written to disk with face sidecars.

#![allow(dead_code, clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use idphoto_test_support::SyntheticPortraitBuilder;
use serde_json::{json, Value};

/// Writes `portrait` as PNG plus its `<stem>.faces.json` sidecar.
pub fn write_portrait(dir: &Path, name: &str, portrait: &SyntheticPortraitBuilder) -> PathBuf {
    let path = write_without_sidecar(dir, name, portrait);
    let detection = portrait.detection();
    let sidecar = json!({
        "faces": [{
            "bbox": detection.bbox,
            "confidence": detection.confidence,
            "features": portrait.features(),
        }]
    });
    let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
    std::fs::write(dir.join(format!("{stem}.faces.json")), sidecar.to_string()).unwrap();
    path
}

/// Writes `portrait` as PNG only; the detector will find no face.
pub fn write_without_sidecar(dir: &Path, name: &str, portrait: &SyntheticPortraitBuilder) -> PathBuf {
    let path = dir.join(name);
    portrait.build().to_rgb8().save(&path).unwrap();
    path
}

/// A compliant ICAO portrait.
pub fn compliant() -> SyntheticPortraitBuilder {
    SyntheticPortraitBuilder::compliant()
}

/// A portrait on a grey backdrop, failing the background colour rule.
pub fn grey_backdrop() -> SyntheticPortraitBuilder {
    SyntheticPortraitBuilder::compliant().background([200, 200, 200])
}

/// Parses JSON Lines output.
pub fn parse_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Whether rule `rule_id` passes in a serialized compliance report.
pub fn rule_passes(report: &Value, rule_id: &str) -> bool {
    report["rule_results"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["rule_id"] == rule_id)
        .map(|r| r["passes"].as_bool().unwrap())
        .unwrap()
}
