//! Quality engine.
//!
//! Scores raw image quality on five independent axes and aggregates
//! repeated measurements into a graded overall score.

mod config;
mod engine;
mod score;

pub use config::{QualityConfig, QualityThresholds, QualityWeights};
pub use engine::QualityEngine;
pub use score::generate_quality_score;
