//! Field classification: primary type, semantic meaning, PII and quality.
//!
//! Every classifier is a pure function of one field's observation. The
//! [`ClassificationPipeline`] chains them in order and is the only place
//! where the optional AI-backed semantic oracle is wired in.

pub mod pii;
pub mod pipeline;
pub mod quality;
pub mod semantic;
pub mod type_inference;

pub use pii::{PiiDetection, PiiDetector};
pub use pipeline::ClassificationPipeline;
pub use quality::{QualityAnalyzer, QualityMetrics};
pub use semantic::{SemanticOracle, SemanticTypeDetector};
pub use type_inference::{infer_array_item_type, infer_type};
