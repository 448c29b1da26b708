//! Integration tests for configuration layering.
//!
//! Tests the full priority chain: hardcoded defaults < XDG config < project config < CLI args

#![allow(clippy::unwrap_used)] // Test code uses unwrap for brevity
#![allow(deprecated)] // cargo_bin deprecation warning

mod common;

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

fn idphoto() -> Command {
    Command::cargo_bin("idphoto").unwrap()
}

#[test]
fn test_project_config_applies_standard() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(
        temp_dir.path().join(".idphoto.toml"),
        r"
[general]
standard = 'ICS-UAE'
",
    )
    .unwrap();
    let path = common::write_portrait(temp_dir.path(), "a.png", &common::compliant());

    let output = idphoto()
        .current_dir(temp_dir.path())
        .arg(&path)
        .output()
        .unwrap();

    // white backdrop violates the ICS-UAE background colour
    assert_eq!(output.status.code(), Some(1));
    let record = &common::parse_lines(&output.stdout)[0];
    assert_eq!(record["standard"], "ICS-UAE");
}

#[test]
fn test_cli_overrides_project_standard() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(
        temp_dir.path().join(".idphoto.toml"),
        r"
[general]
standard = 'ICS-UAE'
",
    )
    .unwrap();
    let path = common::write_portrait(temp_dir.path(), "a.png", &common::compliant());

    idphoto()
        .current_dir(temp_dir.path())
        .args(["--standard", "ICAO"])
        .arg(&path)
        .assert()
        .code(0)
        .stdout(predicate::str::contains(r#""standard":"ICAO""#));
}

#[test]
fn test_project_config_applies_format() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(
        temp_dir.path().join(".idphoto.toml"),
        r"
[output]
format = 'json'
",
    )
    .unwrap();
    let path = common::write_portrait(temp_dir.path(), "a.png", &common::compliant());

    idphoto()
        .current_dir(temp_dir.path())
        .arg(&path)
        .assert()
        .code(0)
        .stdout(predicate::str::starts_with("["));
}

#[test]
fn test_cli_overrides_project_format() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(
        temp_dir.path().join(".idphoto.toml"),
        r"
[output]
format = 'json'
",
    )
    .unwrap();
    let path = common::write_portrait(temp_dir.path(), "a.png", &common::compliant());

    idphoto()
        .current_dir(temp_dir.path())
        .args(["--format", "jsonl"])
        .arg(&path)
        .assert()
        .code(0)
        .stdout(predicate::str::starts_with("{"));
}

#[test]
fn test_config_found_in_parent_directory() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(
        temp_dir.path().join(".idphoto.toml"),
        r"
[output]
format = 'json'
",
    )
    .unwrap();
    let nested = temp_dir.path().join("photos").join("2024");
    fs::create_dir_all(&nested).unwrap();
    let path = common::write_portrait(&nested, "a.png", &common::compliant());

    idphoto()
        .current_dir(&nested)
        .arg(&path)
        .assert()
        .stdout(predicate::str::starts_with("["));
}

#[test]
fn test_config_enables_auto_fix() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(
        temp_dir.path().join(".idphoto.toml"),
        r"
[autofix]
enabled = true
",
    )
    .unwrap();
    let path = common::write_portrait(temp_dir.path(), "a.png", &common::grey_backdrop());

    let output = idphoto()
        .current_dir(temp_dir.path())
        .arg(&path)
        .output()
        .unwrap();
    let record = &common::parse_lines(&output.stdout)[0];
    assert!(record["auto_fix_result"].is_object());
}

#[test]
fn test_invalid_config_value_warns() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(
        temp_dir.path().join(".idphoto.toml"),
        r"
[pipeline]
workers = 0
",
    )
    .unwrap();
    let path = common::write_portrait(temp_dir.path(), "a.png", &common::compliant());

    // the invalid value is reported and the default worker count is used
    idphoto()
        .current_dir(temp_dir.path())
        .arg(&path)
        .assert()
        .code(0)
        .stderr(predicate::str::contains("pipeline.workers"));
}

#[test]
fn test_malformed_config_is_ignored() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join(".idphoto.toml"), "[output\nformat = 'json'").unwrap();
    let path = common::write_portrait(temp_dir.path(), "a.png", &common::compliant());

    idphoto()
        .current_dir(temp_dir.path())
        .arg("-v")
        .arg(&path)
        .assert()
        .code(0)
        .stdout(predicate::str::starts_with("{"))
        .stderr(predicate::str::contains("Failed to parse config file"));
}
