//! Core domain models for contract review.
//!
//! Pure data types and the pure C1 token/language primitives. No I/O.

pub mod chunk;
pub mod report;
pub mod tokens;

pub use chunk::{Chunk, ChunkBuilder, Importance, SegmentType, OVERLAP_MARKER};
pub use report::{
    dedup_and_sort_risks, group_risk_categories, Annotation, ComplianceItem, ComplianceStatus,
    ContractProfile, DimensionScore, MissingItem, Report, ReportRiskLevel, Risk, RiskLevel,
    SignRecommendation, UNKNOWN_FIELD,
};
pub use tokens::{detect_language, estimate_tokens, Language};
