//! Rules / validation engine.
//!
//! Each [`RuleCategory`](crate::domain::RuleCategory) is a pure function over
//! [`ValidationEvidence`] and a per-call [`RuleParameters`] table.

mod engine;
mod evidence;
mod expression;
mod geometry;
mod glasses;
mod head_covering;
mod params;
mod photo_quality;
mod rule;
mod style;

pub use engine::{RulesEngine, FACE_DETECTION_RULE};
pub use evidence::{FaceEvidence, ValidationEvidence};
pub use expression::expression_score;
pub use geometry::horizontal_offset;
pub use params::{
    CountryVariation, ExpressionParameters, GeometryParameters, GlassesParameters,
    HeadCoveringParameters, QualityRuleParameters, RuleParameters, StyleParameters,
};
