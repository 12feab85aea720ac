//! Core engine for SchemaSurveyor.
//!
//! This crate infers a normalized, field-level schema from heterogeneous data
//! files, classifies every field (data type, semantic meaning, PII, quality
//! statistics), fingerprints the result and diffs successive versions.
//!
//! # Pipeline
//! 1. [`parsers`] turn a file into finalized field observations
//! 2. [`classify`] labels each field and builds a [`SchemaSnapshot`]
//! 3. [`versioning`] fingerprints snapshots and reports breaking changes
//! 4. [`ai`] optionally adds descriptions and business names
//!
//! # Guarantees
//! - Input files are opened read-only and never modified
//! - Malformed documents fail as a whole; there is no partial result
//! - Size, depth and time budgets fail distinctly from malformed input
//! - API keys are never serialized or logged

pub mod ai;
pub mod classify;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod parsers;
pub mod validation;
pub mod versioning;

// Re-export commonly used types
pub use ai::{DescriptionGenerator, FieldDescription};
pub use classify::ClassificationPipeline;
pub use config::{AiConfig, ParserConfig, SurveyConfig, XmlConfig};
pub use error::{ErrorCategory, Result, SurveyError};
pub use models::{
    ClassifiedField, FieldType, ParseResult, PiiType, SchemaSnapshot, SchemaSummary,
    SemanticType, SourceFormat,
};
pub use parsers::{parse, parse_path};
pub use validation::load_snapshot;
pub use versioning::{DiffResult, diff_snapshots, schema_hash};
