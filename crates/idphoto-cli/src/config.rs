//! Configuration file support for idphoto.
//!
//! Supports TOML configuration from:
//! - XDG config: `~/.config/idphoto/config.toml` (lowest priority)
//! - Project-local: `.idphoto.toml` (searched up directory tree)
//! - CLI flags (highest priority, applied separately)

use std::path::{Path, PathBuf};

use idphoto_core::CountryVariation;
use serde::Deserialize;
use tracing::{debug, info};

/// Top-level configuration structure.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General options.
    pub general: GeneralConfig,
    /// Controller settings.
    pub pipeline: PipelineConfig,
    /// Quality engine settings.
    pub quality: QualityConfig,
    /// Auto-fix settings.
    pub autofix: AutoFixConfig,
    /// Background segmentation settings.
    pub segmentation: SegmentationConfig,
    /// Output formatting settings.
    pub output: OutputConfig,
}

/// General configuration options.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Recurse into subdirectories by default.
    pub recursive: Option<bool>,
    /// Photo standard to validate against ("ICAO", "ICS-UAE", "US").
    pub standard: Option<String>,
}

/// Processing controller configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Batch worker threads.
    pub workers: Option<usize>,
    /// Per-stage time budget in milliseconds.
    pub stage_timeout_ms: Option<u64>,
    /// Cache validation results by image fingerprint.
    pub cache: Option<bool>,
    /// Minimum face detection confidence.
    pub min_face_confidence: Option<f32>,
    /// Compliance score (0-100) required to pass.
    pub pass_threshold: Option<f64>,
}

/// Quality engine configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimum overall quality score (0-100).
    pub minimum_overall: Option<f64>,
    /// Minimum image width in pixels.
    pub min_width: Option<u32>,
    /// Minimum image height in pixels.
    pub min_height: Option<u32>,
}

/// Auto-fix configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AutoFixConfig {
    /// Run auto-fix after validation.
    pub enabled: Option<bool>,
    /// Allowed quality score drop before a correction is rolled back.
    pub quality_tolerance: Option<f64>,
    /// Strength multiplier for high-risk correction plans (0.0-1.0).
    pub conservative_strength: Option<f32>,
}

/// Background segmentation configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Maximum RGB distance from the backdrop colour.
    pub tolerance: Option<f32>,
}

/// Output formatting configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format: "json" or "jsonl".
    pub format: Option<String>,
    /// Pretty-print JSON output.
    pub pretty: Option<bool>,
    /// Show progress bar.
    pub progress: Option<bool>,
    /// Directory for corrected images.
    pub fixed_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from XDG and project-local files.
    ///
    /// Priority (lowest to highest):
    /// 1. XDG config: `~/.config/idphoto/config.toml`
    /// 2. Project-local: `.idphoto.toml` (searched up from cwd)
    ///
    /// Missing files are silently ignored. Invalid values are logged as warnings.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(xdg_path) = xdg_config_path() {
            if xdg_path.exists() {
                info!("Loading XDG config: {}", xdg_path.display());
                if let Some(xdg_config) = load_file(&xdg_path) {
                    config = xdg_config;
                }
            } else {
                debug!("XDG config not found: {}", xdg_path.display());
            }
        }

        if let Some(project_path) = find_project_config() {
            info!("Loading project config: {}", project_path.display());
            if let Some(project_config) = load_file(&project_path) {
                config.merge(project_config);
            }
        }

        if let Err(e) = config.validate() {
            eprintln!("warning: {e}");
        }

        config
    }

    /// Validate configuration values are within acceptable ranges.
    fn validate(&self) -> Result<(), String> {
        if self.pipeline.workers == Some(0) {
            return Err("pipeline.workers must be at least 1".to_string());
        }
        if self.pipeline.stage_timeout_ms == Some(0) {
            return Err("pipeline.stage_timeout_ms must be positive".to_string());
        }
        if let Some(c) = self.pipeline.min_face_confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(format!(
                    "pipeline.min_face_confidence must be 0.0-1.0, got {c}"
                ));
            }
        }
        if let Some(t) = self.pipeline.pass_threshold {
            if !(0.0..=100.0).contains(&t) {
                return Err(format!("pipeline.pass_threshold must be 0-100, got {t}"));
            }
        }
        if let Some(m) = self.quality.minimum_overall {
            if !(0.0..=100.0).contains(&m) {
                return Err(format!("quality.minimum_overall must be 0-100, got {m}"));
            }
        }
        if let Some(t) = self.autofix.quality_tolerance {
            if t < 0.0 {
                return Err(format!(
                    "autofix.quality_tolerance must not be negative, got {t}"
                ));
            }
        }
        if let Some(s) = self.autofix.conservative_strength {
            if !(0.0..=1.0).contains(&s) {
                return Err(format!(
                    "autofix.conservative_strength must be 0.0-1.0, got {s}"
                ));
            }
        }
        if let Some(t) = self.segmentation.tolerance {
            if t <= 0.0 {
                return Err(format!("segmentation.tolerance must be positive, got {t}"));
            }
        }

        if let Some(ref s) = self.general.standard {
            if let Err(e) = s.parse::<CountryVariation>() {
                return Err(format!("general.standard: {e}"));
            }
        }
        if let Some(ref f) = self.output.format {
            if f != "json" && f != "jsonl" {
                return Err(format!(
                    "output.format must be 'json' or 'jsonl', got '{f}'"
                ));
            }
        }

        Ok(())
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` when present.
    fn merge(&mut self, other: Self) {
        // General
        self.general.recursive = other.general.recursive.or(self.general.recursive);
        self.general.standard = other
            .general
            .standard
            .or_else(|| self.general.standard.take());

        // Pipeline
        self.pipeline.workers = other.pipeline.workers.or(self.pipeline.workers);
        self.pipeline.stage_timeout_ms = other
            .pipeline
            .stage_timeout_ms
            .or(self.pipeline.stage_timeout_ms);
        self.pipeline.cache = other.pipeline.cache.or(self.pipeline.cache);
        self.pipeline.min_face_confidence = other
            .pipeline
            .min_face_confidence
            .or(self.pipeline.min_face_confidence);
        self.pipeline.pass_threshold = other
            .pipeline
            .pass_threshold
            .or(self.pipeline.pass_threshold);

        // Quality
        self.quality.minimum_overall = other
            .quality
            .minimum_overall
            .or(self.quality.minimum_overall);
        self.quality.min_width = other.quality.min_width.or(self.quality.min_width);
        self.quality.min_height = other.quality.min_height.or(self.quality.min_height);

        // Auto-fix
        self.autofix.enabled = other.autofix.enabled.or(self.autofix.enabled);
        self.autofix.quality_tolerance = other
            .autofix
            .quality_tolerance
            .or(self.autofix.quality_tolerance);
        self.autofix.conservative_strength = other
            .autofix
            .conservative_strength
            .or(self.autofix.conservative_strength);

        // Segmentation
        self.segmentation.tolerance = other
            .segmentation
            .tolerance
            .or(self.segmentation.tolerance);

        // Output
        self.output.format = other.output.format.or_else(|| self.output.format.take());
        self.output.pretty = other.output.pretty.or(self.output.pretty);
        self.output.progress = other.output.progress.or(self.output.progress);
        self.output.fixed_dir = other
            .output
            .fixed_dir
            .or_else(|| self.output.fixed_dir.take());
    }
}

/// Get the XDG config file path.
fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("idphoto").join("config.toml"))
}

/// Find project-local config by searching up from current directory.
fn find_project_config() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_parents(&cwd)
}

/// Search for `.idphoto.toml` in the given directory and its parents.
fn find_config_in_parents(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);

    while let Some(dir) = current {
        let config_path = dir.join(".idphoto.toml");
        if config_path.exists() {
            return Some(config_path);
        }
        current = dir.parent();
    }

    None
}

/// Load and parse a TOML config file.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Failed to read config file {}: {}", path.display(), e);
            return None;
        }
    };

    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.general.standard.is_none());
        assert!(config.pipeline.workers.is_none());
        assert!(config.autofix.enabled.is_none());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: AppConfig = toml::from_str("").expect("parse empty config");
        assert!(config.pipeline.cache.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r"
[general]
recursive = true
standard = 'ICS-UAE'

[pipeline]
workers = 8
stage_timeout_ms = 5000
cache = false
min_face_confidence = 0.6
pass_threshold = 85.0

[quality]
minimum_overall = 75.0
min_width = 600
min_height = 800

[autofix]
enabled = true
quality_tolerance = 1.5
conservative_strength = 0.5

[segmentation]
tolerance = 24.0

[output]
format = 'json'
pretty = true
progress = false
fixed_dir = 'fixed'
";
        let config: AppConfig = toml::from_str(toml).expect("parse full config");

        assert_eq!(config.general.recursive, Some(true));
        assert_eq!(config.general.standard.as_deref(), Some("ICS-UAE"));
        assert_eq!(config.pipeline.workers, Some(8));
        assert_eq!(config.pipeline.cache, Some(false));
        assert_eq!(config.pipeline.pass_threshold, Some(85.0));
        assert_eq!(config.quality.min_width, Some(600));
        assert_eq!(config.autofix.enabled, Some(true));
        assert_eq!(config.autofix.conservative_strength, Some(0.5));
        assert_eq!(config.segmentation.tolerance, Some(24.0));
        assert_eq!(config.output.format, Some("json".to_string()));
        assert_eq!(config.output.fixed_dir, Some(PathBuf::from("fixed")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_configs() {
        let mut base: AppConfig = toml::from_str(
            r"
[pipeline]
workers = 2

[quality]
minimum_overall = 60.0
",
        )
        .expect("parse base");

        let override_config: AppConfig = toml::from_str(
            r"
[pipeline]
workers = 6

[autofix]
enabled = true
",
        )
        .expect("parse override");

        base.merge(override_config);

        assert_eq!(base.pipeline.workers, Some(6));
        assert_eq!(base.quality.minimum_overall, Some(60.0));
        assert_eq!(base.autofix.enabled, Some(true));
    }

    #[test]
    fn test_merge_preserves_base_when_override_is_none() {
        let mut base: AppConfig = toml::from_str(
            r"
[general]
standard = 'US'

[pipeline]
workers = 3
stage_timeout_ms = 1000
",
        )
        .expect("parse base");

        let override_config: AppConfig = toml::from_str(
            r"
[pipeline]
workers = 5
",
        )
        .expect("parse override");

        base.merge(override_config);

        assert_eq!(base.pipeline.workers, Some(5));
        assert_eq!(base.pipeline.stage_timeout_ms, Some(1000));
        assert_eq!(base.general.standard.as_deref(), Some("US"));
    }

    #[test]
    fn test_merge_empty_override_preserves_base() {
        let mut base: AppConfig = toml::from_str(
            r"
[output]
format = 'json'
",
        )
        .expect("parse base");

        base.merge(AppConfig::default());

        assert_eq!(base.output.format, Some("json".to_string()));
    }

    #[test]
    fn test_partial_section_leaves_other_fields_unset() {
        let config: AppConfig = toml::from_str(
            r"
[autofix]
quality_tolerance = 3.0
",
        )
        .expect("parse partial autofix");

        assert_eq!(config.autofix.quality_tolerance, Some(3.0));
        assert!(config.autofix.enabled.is_none());
        assert!(config.autofix.conservative_strength.is_none());
        assert!(config.pipeline.workers.is_none());
    }

    #[test]
    fn test_invalid_toml_syntax_handled() {
        let toml = r"
[pipeline
workers = 2
";
        let result: Result<AppConfig, _> = toml::from_str(toml);
        assert!(result.is_err(), "invalid TOML should return error");
    }

    #[test]
    fn test_invalid_field_type_handled() {
        let toml = r#"
[pipeline]
workers = "many"
"#;
        let result: Result<AppConfig, _> = toml::from_str(toml);
        assert!(result.is_err(), "type mismatch should return error");
    }

    #[test]
    fn test_find_config_in_parents() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join(".idphoto.toml"), "").unwrap();

        let found = find_config_in_parents(&nested).unwrap();
        assert_eq!(found, temp.path().join(".idphoto.toml"));
    }

    // === Validation Tests ===

    #[test]
    fn test_validate_workers_zero() {
        let mut config = AppConfig::default();
        config.pipeline.workers = Some(0);
        assert!(config.validate().unwrap_err().contains("pipeline.workers"));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = AppConfig::default();
        config.pipeline.pass_threshold = Some(120.0);
        assert!(config.validate().unwrap_err().contains("pipeline.pass_threshold"));

        let mut config = AppConfig::default();
        config.pipeline.min_face_confidence = Some(1.5);
        assert!(config
            .validate()
            .unwrap_err()
            .contains("pipeline.min_face_confidence"));

        let mut config = AppConfig::default();
        config.autofix.conservative_strength = Some(-0.1);
        assert!(config
            .validate()
            .unwrap_err()
            .contains("autofix.conservative_strength"));
    }

    #[test]
    fn test_validate_unknown_standard() {
        let mut config = AppConfig::default();
        config.general.standard = Some("EU".to_string());
        assert!(config.validate().unwrap_err().contains("general.standard"));

        config.general.standard = Some("ics_uae".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_output_format_invalid() {
        let mut config = AppConfig::default();
        config.output.format = Some("xml".to_string());
        assert!(config.validate().unwrap_err().contains("output.format"));
    }

    #[test]
    fn test_validate_empty_config_passes() {
        assert!(AppConfig::default().validate().is_ok());
    }
}
