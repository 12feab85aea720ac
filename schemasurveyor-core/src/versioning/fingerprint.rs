//! Deterministic schema fingerprint.

use crate::models::ClassifiedField;
use sha2::{Digest, Sha256};

/// SHA-256 over `path:type` signatures of fields sorted by path, joined with `|`.
///
/// Field order does not matter; adding, removing or retyping a field changes
/// the result.
///
/// # Example
/// ```rust
/// use schemasurveyor_core::versioning::schema_hash;
///
/// let empty = schema_hash(&[]);
/// assert_eq!(empty.len(), 64);
/// ```
pub fn schema_hash(fields: &[ClassifiedField]) -> String {
    let mut signatures: Vec<(&str, &str)> = fields
        .iter()
        .map(|field| (field.field_path.as_str(), field.data_type.as_str()))
        .collect();
    signatures.sort_unstable();

    let joined = signatures
        .iter()
        .map(|(path, data_type)| format!("{}:{}", path, data_type))
        .collect::<Vec<_>>()
        .join("|");

    let digest = Sha256::digest(joined.as_bytes());
    format!("{:x}", digest)
}
