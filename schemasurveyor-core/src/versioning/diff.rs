//! Pairwise comparison of schema snapshots.
//!
//! # Breaking Changes
//! - A removed field is always breaking; an added field never is.
//! - A modified field is breaking when its primary type changes, when it
//!   goes from nullable to non-nullable, or when its array-ness changes.
//! - Semantic type and PII changes are reported but never breaking.

use crate::models::{ClassifiedField, FieldType, PiiType, SchemaSnapshot, SemanticType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Kind of change recorded for one field path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::Added => "added",
            ChangeType::Removed => "removed",
            ChangeType::Modified => "modified",
        };
        f.write_str(name)
    }
}

/// The compared attributes of a field on one side of a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub field_path: String,
    pub field_name: String,
    pub data_type: FieldType,
    pub semantic_type: Option<SemanticType>,
    /// Nulls were observed in the samples. This is not the declared
    /// nullability carried on [`ClassifiedField::is_nullable`].
    pub is_nullable: bool,
    pub is_array: bool,
    pub array_item_type: Option<FieldType>,
    pub is_pii: bool,
    pub pii_type: Option<PiiType>,
    pub null_percentage: f64,
    pub confidence_score: f64,
}

impl From<&ClassifiedField> for FieldSummary {
    fn from(field: &ClassifiedField) -> Self {
        Self {
            field_path: field.field_path.clone(),
            field_name: field.field_name.clone(),
            data_type: field.data_type,
            semantic_type: field.semantic_type,
            is_nullable: observed_nullable(field),
            is_array: field.is_array,
            array_item_type: field.array_item_type,
            is_pii: field.is_pii,
            pii_type: field.pii_type,
            null_percentage: field.null_percentage,
            confidence_score: field.confidence_score,
        }
    }
}

/// One added, removed or modified field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub change_type: ChangeType,
    pub field_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_1_data: Option<FieldSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_2_data: Option<FieldSummary>,
    pub is_breaking: bool,
    /// Human-readable list of attribute changes, empty for added/removed
    #[serde(default)]
    pub changes: Vec<String>,
}

/// Change counts of a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub fields_added: usize,
    pub fields_removed: usize,
    pub fields_modified: usize,
    pub breaking_changes: usize,
    pub total_fields_v1: usize,
    pub total_fields_v2: usize,
}

/// Identity of one side of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionIdentity {
    pub snapshot_id: Uuid,
    pub source_name: String,
    pub created_at: DateTime<Utc>,
    pub schema_hash: String,
}

impl From<&SchemaSnapshot> for VersionIdentity {
    fn from(snapshot: &SchemaSnapshot) -> Self {
        Self {
            snapshot_id: snapshot.snapshot_id,
            source_name: snapshot.source_name.clone(),
            created_at: snapshot.created_at,
            schema_hash: snapshot.schema_hash.clone(),
        }
    }
}

/// Result of comparing two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub summary: DiffSummary,
    /// Added, then removed, then modified
    pub changes: Vec<ChangeRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_1: Option<VersionIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_2: Option<VersionIdentity>,
}

impl DiffResult {
    /// True when no field was added, removed or modified.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// True when any change is breaking.
    pub fn has_breaking_changes(&self) -> bool {
        self.summary.breaking_changes > 0
    }

    /// Changes of one kind, in recorded order.
    pub fn changes_of(&self, change_type: ChangeType) -> impl Iterator<Item = &ChangeRecord> {
        self.changes
            .iter()
            .filter(move |change| change.change_type == change_type)
    }

    /// Paths of added fields.
    pub fn added(&self) -> Vec<&str> {
        self.paths_of(ChangeType::Added)
    }

    /// Paths of removed fields.
    pub fn removed(&self) -> Vec<&str> {
        self.paths_of(ChangeType::Removed)
    }

    /// Paths of modified fields.
    pub fn modified(&self) -> Vec<&str> {
        self.paths_of(ChangeType::Modified)
    }

    fn paths_of(&self, change_type: ChangeType) -> Vec<&str> {
        self.changes_of(change_type)
            .map(|change| change.field_path.as_str())
            .collect()
    }

    /// Reorders changes by field path. The sort is stable, so a path keeps
    /// its added/removed/modified grouping.
    pub fn sorted_by_path(mut self) -> Self {
        self.changes.sort_by(|a, b| a.field_path.cmp(&b.field_path));
        self
    }
}

/// Compares two snapshots of the same source.
pub fn diff_snapshots(v1: &SchemaSnapshot, v2: &SchemaSnapshot) -> DiffResult {
    let mut result = diff_fields(&v1.fields, &v2.fields);
    result.version_1 = Some(VersionIdentity::from(v1));
    result.version_2 = Some(VersionIdentity::from(v2));

    if v1.has_same_schema(v2) {
        tracing::debug!("Schema hash unchanged: {}", v2.schema_hash);
    }
    tracing::info!(
        "Compared snapshots: {} added, {} removed, {} modified, {} breaking",
        result.summary.fields_added,
        result.summary.fields_removed,
        result.summary.fields_modified,
        result.summary.breaking_changes
    );
    result
}

/// Compares two field lists by path.
///
/// Added and modified fields follow `v2` order; removed fields follow `v1`
/// order.
pub fn diff_fields(v1: &[ClassifiedField], v2: &[ClassifiedField]) -> DiffResult {
    let v1_map: HashMap<&str, &ClassifiedField> =
        v1.iter().map(|f| (f.field_path.as_str(), f)).collect();
    let v2_map: HashMap<&str, &ClassifiedField> =
        v2.iter().map(|f| (f.field_path.as_str(), f)).collect();

    let mut changes = Vec::new();

    for field in v2 {
        if !v1_map.contains_key(field.field_path.as_str()) {
            changes.push(ChangeRecord {
                change_type: ChangeType::Added,
                field_path: field.field_path.clone(),
                version_1_data: None,
                version_2_data: Some(FieldSummary::from(field)),
                is_breaking: false,
                changes: Vec::new(),
            });
        }
    }

    for field in v1 {
        if !v2_map.contains_key(field.field_path.as_str()) {
            changes.push(ChangeRecord {
                change_type: ChangeType::Removed,
                field_path: field.field_path.clone(),
                version_1_data: Some(FieldSummary::from(field)),
                version_2_data: None,
                is_breaking: true,
                changes: Vec::new(),
            });
        }
    }

    for after in v2 {
        let Some(before) = v1_map.get(after.field_path.as_str()) else {
            continue;
        };
        let descriptions = describe_changes(before, after);
        if descriptions.is_empty() {
            continue;
        }
        changes.push(ChangeRecord {
            change_type: ChangeType::Modified,
            field_path: after.field_path.clone(),
            version_1_data: Some(FieldSummary::from(*before)),
            version_2_data: Some(FieldSummary::from(after)),
            is_breaking: is_breaking_change(before, after),
            changes: descriptions,
        });
    }

    let count = |change_type: ChangeType| {
        changes
            .iter()
            .filter(|change| change.change_type == change_type)
            .count()
    };
    let summary = DiffSummary {
        fields_added: count(ChangeType::Added),
        fields_removed: count(ChangeType::Removed),
        fields_modified: count(ChangeType::Modified),
        breaking_changes: changes.iter().filter(|change| change.is_breaking).count(),
        total_fields_v1: v1.len(),
        total_fields_v2: v2.len(),
    };

    DiffResult {
        summary,
        changes,
        version_1: None,
        version_2: None,
    }
}

/// A field counts as nullable for comparison when nulls were observed.
fn observed_nullable(field: &ClassifiedField) -> bool {
    field.null_percentage > 0.0
}

fn is_breaking_change(before: &ClassifiedField, after: &ClassifiedField) -> bool {
    before.data_type != after.data_type
        || (observed_nullable(before) && !observed_nullable(after))
        || before.is_array != after.is_array
}

fn describe_changes(before: &ClassifiedField, after: &ClassifiedField) -> Vec<String> {
    let mut changes = Vec::new();

    if before.data_type != after.data_type {
        changes.push(format!(
            "Type changed: {} -> {}",
            before.data_type, after.data_type
        ));
    }
    if before.semantic_type != after.semantic_type {
        changes.push(format!(
            "Semantic type changed: {} -> {}",
            display_semantic(before.semantic_type),
            display_semantic(after.semantic_type)
        ));
    }
    let (was_nullable, is_nullable) = (observed_nullable(before), observed_nullable(after));
    if was_nullable != is_nullable {
        changes.push(format!(
            "Nullability changed: {} -> {}",
            was_nullable, is_nullable
        ));
    }
    if before.is_array != after.is_array {
        changes.push(format!(
            "Array status changed: {} -> {}",
            before.is_array, after.is_array
        ));
    }
    if before.is_pii != after.is_pii {
        changes.push(format!(
            "PII status changed: {} -> {}",
            before.is_pii, after.is_pii
        ));
    }
    changes
}

fn display_semantic(semantic: Option<SemanticType>) -> String {
    semantic.map_or_else(|| "none".to_string(), |s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerMetadata, FieldMetadata, SourceFormat};

    fn classified(path: &str, data_type: FieldType) -> ClassifiedField {
        ClassifiedField {
            field_path: path.to_string(),
            field_name: path.rsplit('.').next().unwrap_or(path).to_string(),
            parent_path: String::new(),
            nesting_level: 0,
            data_type,
            confidence_score: 100.0,
            semantic_type: None,
            is_pii: false,
            pii_type: None,
            pii_confidence: 0.0,
            is_array: false,
            array_item_type: None,
            is_nullable: false,
            sample_values: Vec::new(),
            null_count: 0,
            total_count: 10,
            null_percentage: 0.0,
            distinct_count: 10,
            cardinality_ratio: 1.0,
            numeric_stats: None,
            description: None,
            business_name: None,
            metadata: FieldMetadata::default(),
        }
    }

    fn nullable(mut field: ClassifiedField) -> ClassifiedField {
        field.null_count = 2;
        field.null_percentage = 20.0;
        field.is_nullable = true;
        field
    }

    #[test]
    fn test_added_removed_modified() {
        let v1 = vec![
            classified("id", FieldType::Integer),
            classified("legacy", FieldType::String),
            classified("age", FieldType::Integer),
        ];
        let v2 = vec![
            classified("id", FieldType::Integer),
            classified("age", FieldType::String),
            classified("email", FieldType::String),
        ];

        let diff = diff_fields(&v1, &v2);
        assert_eq!(diff.added(), vec!["email"]);
        assert_eq!(diff.removed(), vec!["legacy"]);
        assert_eq!(diff.modified(), vec!["age"]);

        let kinds: Vec<ChangeType> = diff.changes.iter().map(|c| c.change_type).collect();
        assert_eq!(
            kinds,
            vec![ChangeType::Added, ChangeType::Removed, ChangeType::Modified]
        );

        assert_eq!(diff.summary.fields_added, 1);
        assert_eq!(diff.summary.fields_removed, 1);
        assert_eq!(diff.summary.fields_modified, 1);
        assert_eq!(diff.summary.breaking_changes, 2);
        assert_eq!(diff.summary.total_fields_v1, 3);
        assert_eq!(diff.summary.total_fields_v2, 3);

        let age = diff.changes_of(ChangeType::Modified).next().unwrap();
        assert!(age.is_breaking);
        assert_eq!(age.changes, vec!["Type changed: integer -> string"]);
        assert!(!diff.changes[0].is_breaking);
        assert!(diff.changes[1].is_breaking);
    }

    #[test]
    fn test_diff_is_symmetric() {
        let v1 = vec![classified("a", FieldType::String), classified("b", FieldType::Integer)];
        let v2 = vec![classified("b", FieldType::Integer), classified("c", FieldType::Float)];

        let forward = diff_fields(&v1, &v2);
        let backward = diff_fields(&v2, &v1);
        assert_eq!(forward.added(), backward.removed());
        assert_eq!(forward.removed(), backward.added());
    }

    #[test]
    fn test_nullable_to_required_is_breaking() {
        let v1 = vec![nullable(classified("name", FieldType::String))];
        let v2 = vec![classified("name", FieldType::String)];

        let diff = diff_fields(&v1, &v2);
        let change = &diff.changes[0];
        assert_eq!(change.change_type, ChangeType::Modified);
        assert!(change.is_breaking);
        assert_eq!(change.changes, vec!["Nullability changed: true -> false"]);

        let relaxed = diff_fields(&v2, &v1);
        assert!(!relaxed.changes[0].is_breaking);
    }

    #[test]
    fn test_declared_nullability_alone_is_not_compared() {
        let mut before = classified("nickname", FieldType::String);
        before.is_nullable = true;
        let after = classified("nickname", FieldType::String);

        let diff = diff_fields(&[before], &[after]);
        assert!(diff.is_empty());
        assert!(!diff.has_breaking_changes());
    }

    #[test]
    fn test_semantic_change_is_not_breaking() {
        let mut before = classified("contact", FieldType::String);
        before.semantic_type = Some(SemanticType::Email);
        let mut after = before.clone();
        after.semantic_type = Some(SemanticType::Phone);

        let diff = diff_fields(&[before], &[after]);
        assert_eq!(diff.summary.fields_modified, 1);
        assert!(!diff.has_breaking_changes());
        assert_eq!(
            diff.changes[0].changes,
            vec!["Semantic type changed: email -> phone"]
        );
    }

    #[test]
    fn test_array_change_is_breaking() {
        let before = classified("tags", FieldType::String);
        let mut after = before.clone();
        after.is_array = true;
        let diff = diff_fields(&[before], &[after]);
        assert!(diff.changes[0].is_breaking);
    }

    #[test]
    fn test_statistics_changes_are_ignored() {
        let before = classified("score", FieldType::Float);
        let mut after = before.clone();
        after.distinct_count = 3;
        after.confidence_score = 80.0;
        assert!(diff_fields(&[before], &[after]).is_empty());
    }

    #[test]
    fn test_sorted_by_path_and_identity() {
        let v1 = SchemaSnapshot::new(
            "users.json",
            SourceFormat::Json,
            10,
            true,
            vec![classified("zeta", FieldType::String), classified("id", FieldType::Integer)],
            ContainerMetadata::default(),
        );
        let v2 = SchemaSnapshot::new(
            "users.json",
            SourceFormat::Json,
            12,
            true,
            vec![classified("id", FieldType::Integer), classified("alpha", FieldType::String)],
            ContainerMetadata::default(),
        );

        let diff = diff_snapshots(&v1, &v2);
        assert_eq!(diff.version_1.as_ref().unwrap().snapshot_id, v1.snapshot_id);
        assert_eq!(diff.version_2.as_ref().unwrap().schema_hash, v2.schema_hash);

        let sorted = diff.sorted_by_path();
        let paths: Vec<&str> = sorted.changes.iter().map(|c| c.field_path.as_str()).collect();
        assert_eq!(paths, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_serialized_shape() {
        let diff = diff_fields(&[], &[classified("id", FieldType::Integer)]);
        let value = serde_json::to_value(&diff).unwrap();
        assert_eq!(value["summary"]["fields_added"], 1);
        assert_eq!(value["changes"][0]["change_type"], "added");
        assert!(value["changes"][0].get("version_1_data").is_none());
        assert_eq!(value["changes"][0]["version_2_data"]["data_type"], "integer");
    }
}
