//! SQLite declared type to field type conversion.
//!
//! SQLite derives a column's affinity from substrings of its declared type,
//! so the checks below are substring matches applied in a fixed order:
//! 1. Geometry type names (GeoPackage) -> binary
//! 2. Contains "INT" -> integer
//! 3. Contains "REAL", "FLOA", "DOUB", "NUMERIC" or "DECIMAL" -> float
//! 4. Contains "CHAR", "CLOB", "TEXT" or "STRING" -> string
//! 5. Contains "BLOB" -> binary
//! 6. Contains "BOOL" -> boolean
//! 7. Anything else, including DATE and TIME types -> string

use crate::models::FieldType;

/// Geometry type names registered by GeoPackage feature tables.
const GEOMETRY_TYPES: [&str; 8] = [
    "GEOMETRY",
    "POINT",
    "LINESTRING",
    "POLYGON",
    "MULTIPOINT",
    "MULTILINESTRING",
    "MULTIPOLYGON",
    "GEOMETRYCOLLECTION",
];

/// Maps a declared column type to a field type.
///
/// Returns `None` for untyped columns, whose type must be inferred from
/// the stored values.
///
/// # Example
/// ```rust
/// use schemasurveyor_core::models::FieldType;
/// use schemasurveyor_core::parsers::sqlite::map_sqlite_type;
///
/// assert_eq!(map_sqlite_type("VARCHAR(255)"), Some(FieldType::String));
/// assert_eq!(map_sqlite_type(""), None);
/// ```
pub fn map_sqlite_type(sqlite_type: &str) -> Option<FieldType> {
    let type_upper = sqlite_type.trim().to_uppercase();
    if type_upper.is_empty() {
        return None;
    }
    let base_type = type_upper
        .split('(')
        .next()
        .unwrap_or(&type_upper)
        .trim();

    if GEOMETRY_TYPES.contains(&base_type) {
        return Some(FieldType::Binary);
    }
    if base_type.contains("INT") {
        return Some(FieldType::Integer);
    }
    if ["REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL"]
        .iter()
        .any(|t| base_type.contains(t))
    {
        return Some(FieldType::Float);
    }
    if ["CHAR", "CLOB", "TEXT", "STRING"]
        .iter()
        .any(|t| base_type.contains(t))
    {
        return Some(FieldType::String);
    }
    if base_type.contains("BLOB") {
        return Some(FieldType::Binary);
    }
    if base_type.contains("BOOL") {
        return Some(FieldType::Boolean);
    }
    Some(FieldType::String)
}

/// Type of an untyped column, picked from the value types it holds.
pub(crate) fn infer_untyped(observed: &[FieldType]) -> FieldType {
    [
        FieldType::Integer,
        FieldType::Float,
        FieldType::Boolean,
        FieldType::Binary,
    ]
    .into_iter()
    .find(|candidate| observed.contains(candidate))
    .unwrap_or(FieldType::String)
}
