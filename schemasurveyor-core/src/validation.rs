//! JSON Schema validation for persisted schema snapshots.
//!
//! Snapshots written by `schemasurveyor analyze` are validated against an
//! embedded JSON Schema before they are deserialized, so a truncated or
//! hand-edited file is rejected with field-level messages instead of a bare
//! serde error. The stored fingerprint is recomputed and must match.
//!
//! # Example
//! ```rust
//! use schemasurveyor_core::models::{ContainerMetadata, SchemaSnapshot, SourceFormat};
//! use schemasurveyor_core::validation::load_snapshot;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let snapshot = SchemaSnapshot::new(
//!     "users.json",
//!     SourceFormat::Json,
//!     0,
//!     true,
//!     Vec::new(),
//!     ContainerMetadata::default(),
//! );
//! let json = serde_json::to_string(&snapshot)?;
//! let loaded = load_snapshot(&json)?;
//! assert_eq!(loaded.schema_hash, snapshot.schema_hash);
//! # Ok(())
//! # }
//! ```

use crate::models::{SNAPSHOT_FORMAT_VERSION, SchemaSnapshot};
use crate::{Result, SurveyError};
use jsonschema::Validator;
use serde_json::Value;
use std::sync::OnceLock;

/// Snapshot format versions this build can read
const SUPPORTED_VERSIONS: &[&str] = &[SNAPSHOT_FORMAT_VERSION];

/// Errors reported per snapshot before giving up
const MAX_REPORTED_ERRORS: usize = 10;

/// Embedded JSON Schema for the v1.0 snapshot format
const SNAPSHOT_SCHEMA_V1_0: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "SchemaSurveyor Schema Snapshot v1.0",
  "type": "object",
  "required": [
    "format_version", "snapshot_id", "created_at", "source_name",
    "source_format", "total_records", "is_array_root", "schema_hash",
    "summary", "fields"
  ],
  "properties": {
    "format_version": { "type": "string", "pattern": "^1\\.0$" },
    "snapshot_id": { "type": "string", "minLength": 1 },
    "created_at": { "type": "string", "minLength": 1 },
    "source_name": { "type": "string" },
    "source_format": {
      "enum": ["json", "mongodb", "xml", "sqlite", "geopackage", "protobuf"]
    },
    "total_records": { "type": "integer", "minimum": 0 },
    "is_array_root": { "type": "boolean" },
    "schema_hash": { "type": "string", "pattern": "^[0-9a-f]{64}$" },
    "summary": {
      "type": "object",
      "required": ["total_fields"],
      "properties": {
        "total_fields": { "type": "integer", "minimum": 0 }
      }
    },
    "fields": {
      "type": "array",
      "items": { "$ref": "#/$defs/field" }
    },
    "container": { "type": "object" }
  },
  "$defs": {
    "field_type": {
      "enum": [
        "null", "boolean", "integer", "float", "string", "array", "object",
        "binary", "mongodb_objectid", "mongodb_date", "mongodb_long",
        "mongodb_decimal", "mongodb_binary", "unknown", "mixed"
      ]
    },
    "percentage": { "type": "number", "minimum": 0, "maximum": 100 },
    "field": {
      "type": "object",
      "required": [
        "field_path", "field_name", "parent_path", "nesting_level",
        "data_type", "confidence_score", "is_pii", "pii_confidence",
        "is_array", "is_nullable", "sample_values", "null_count",
        "total_count", "null_percentage", "distinct_count",
        "cardinality_ratio"
      ],
      "properties": {
        "field_path": { "type": "string", "minLength": 1 },
        "field_name": { "type": "string" },
        "parent_path": { "type": "string" },
        "nesting_level": { "type": "integer", "minimum": 0 },
        "data_type": { "$ref": "#/$defs/field_type" },
        "confidence_score": { "$ref": "#/$defs/percentage" },
        "semantic_type": { "type": ["string", "null"] },
        "is_pii": { "type": "boolean" },
        "pii_type": { "type": ["string", "null"] },
        "pii_confidence": { "type": "number", "minimum": 0 },
        "is_array": { "type": "boolean" },
        "array_item_type": {
          "anyOf": [{ "$ref": "#/$defs/field_type" }, { "type": "null" }]
        },
        "is_nullable": { "type": "boolean" },
        "sample_values": { "type": "array" },
        "null_count": { "type": "integer", "minimum": 0 },
        "total_count": { "type": "integer", "minimum": 0 },
        "null_percentage": { "$ref": "#/$defs/percentage" },
        "distinct_count": { "type": "integer", "minimum": 0 },
        "cardinality_ratio": { "type": "number", "minimum": 0 },
        "description": { "type": "string" },
        "business_name": { "type": "string" },
        "metadata": { "type": "object" }
      }
    }
  }
}"##;

/// Compiled JSON Schema instance (initialized once)
static COMPILED_SCHEMA: OnceLock<Validator> = OnceLock::new();

fn validator() -> Result<&'static Validator> {
    if let Some(validator) = COMPILED_SCHEMA.get() {
        return Ok(validator);
    }

    let schema = schema_definition()?;
    let compiled = jsonschema::validator_for(&schema).map_err(|e| SurveyError::SnapshotValidation {
        message: format!("Schema compilation error: {e}"),
    })?;
    // A concurrent caller may have won the race; either instance is identical.
    let _ = COMPILED_SCHEMA.set(compiled);

    COMPILED_SCHEMA.get().ok_or_else(|| SurveyError::SnapshotValidation {
        message: "Snapshot validator unavailable".to_string(),
    })
}

/// Returns the embedded snapshot JSON Schema.
pub fn schema_definition() -> Result<Value> {
    serde_json::from_str(SNAPSHOT_SCHEMA_V1_0)
        .map_err(|e| SurveyError::serialization("Failed to parse embedded snapshot schema", e))
}

/// Validates a snapshot document without deserializing it.
///
/// # Errors
///
/// Returns [`SurveyError::SnapshotValidation`] for an unsupported
/// `format_version` or any schema violation.
pub fn validate_snapshot_value(value: &Value) -> Result<()> {
    validate_format_version(value)?;

    let errors: Vec<String> = validator()?
        .iter_errors(value)
        .take(MAX_REPORTED_ERRORS)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(SurveyError::SnapshotValidation {
            message: errors.join("; "),
        });
    }
    Ok(())
}

fn validate_format_version(value: &Value) -> Result<()> {
    let version = value
        .get("format_version")
        .and_then(Value::as_str)
        .ok_or_else(|| SurveyError::SnapshotValidation {
            message: "Missing required field 'format_version'".to_string(),
        })?;

    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(SurveyError::SnapshotValidation {
            message: format!(
                "Unsupported format version '{}'. Supported versions: {}",
                version,
                SUPPORTED_VERSIONS.join(", ")
            ),
        });
    }
    Ok(())
}

/// Parses, validates and deserializes a persisted snapshot.
///
/// # Errors
///
/// Returns a serialization error for invalid JSON, and
/// [`SurveyError::SnapshotValidation`] when the document violates the
/// snapshot schema or its `schema_hash` does not match its fields.
pub fn load_snapshot(json: &str) -> Result<SchemaSnapshot> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| SurveyError::serialization("Invalid snapshot JSON", e))?;
    validate_snapshot_value(&value)?;

    let snapshot: SchemaSnapshot = serde_json::from_value(value)
        .map_err(|e| SurveyError::serialization("Failed to deserialize snapshot", e))?;

    let expected = crate::versioning::schema_hash(&snapshot.fields);
    if expected != snapshot.schema_hash {
        return Err(SurveyError::SnapshotValidation {
            message: format!(
                "schema_hash {} does not match fields (expected {})",
                snapshot.schema_hash, expected
            ),
        });
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerMetadata, SourceFormat};
    use serde_json::json;

    fn snapshot_value() -> Value {
        json!({
            "format_version": "1.0",
            "snapshot_id": "0b7e3f0a-3c55-4c8e-9d1e-5f0d2b1c7a11",
            "created_at": "2026-01-15T10:30:00Z",
            "source_name": "users.json",
            "source_format": "json",
            "total_records": 2,
            "is_array_root": true,
            "schema_hash": crate::versioning::schema_hash(&[]),
            "summary": { "total_fields": 0 },
            "fields": []
        })
    }

    #[test]
    fn test_schema_definition_parses() {
        let schema = schema_definition().unwrap();
        assert_eq!(schema["title"], "SchemaSurveyor Schema Snapshot v1.0");
    }

    #[test]
    fn test_valid_snapshot_passes() {
        assert!(validate_snapshot_value(&snapshot_value()).is_ok());
    }

    #[test]
    fn test_round_trip_of_built_snapshot() {
        let snapshot = SchemaSnapshot::new(
            "users.json",
            SourceFormat::Json,
            0,
            true,
            Vec::new(),
            ContainerMetadata::default(),
        );
        let json = serde_json::to_string(&snapshot).unwrap();
        let loaded = load_snapshot(&json).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_unsupported_version() {
        let mut value = snapshot_value();
        value["format_version"] = json!("2.0");
        let err = validate_snapshot_value(&value).unwrap_err();
        assert!(err.to_string().contains("Unsupported format version '2.0'"));
    }

    #[test]
    fn test_missing_version() {
        let mut value = snapshot_value();
        value.as_object_mut().unwrap().remove("format_version");
        assert!(matches!(
            validate_snapshot_value(&value),
            Err(SurveyError::SnapshotValidation { .. })
        ));
    }

    #[test]
    fn test_schema_violation_is_reported() {
        let mut value = snapshot_value();
        value["source_format"] = json!("csv");
        value["fields"] = json!([{ "field_path": "id" }]);
        let err = validate_snapshot_value(&value).unwrap_err();
        assert!(matches!(err, SurveyError::SnapshotValidation { .. }));
    }

    #[test]
    fn test_tampered_hash_is_rejected() {
        let mut value = snapshot_value();
        value["schema_hash"] = json!("0".repeat(64));
        let err = load_snapshot(&value.to_string()).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            load_snapshot("{not json"),
            Err(SurveyError::Serialization { .. })
        ));
    }
}
