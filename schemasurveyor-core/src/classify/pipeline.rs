//! Classification pipeline: type, semantic, PII, then quality.

use super::pii::PiiDetector;
use super::quality::QualityAnalyzer;
use super::semantic::{SemanticOracle, SemanticTypeDetector};
use super::type_inference::{infer_array_item_type, infer_type};
use crate::Result;
use crate::models::{ClassifiedField, ParseResult, ParsedField, SchemaSnapshot, SemanticType};
use std::sync::Arc;

/// Applies every classifier to the fields of a parse result.
pub struct ClassificationPipeline {
    semantic: SemanticTypeDetector,
    pii: PiiDetector,
    quality: QualityAnalyzer,
    oracle: Option<Arc<dyn SemanticOracle>>,
}

impl std::fmt::Debug for ClassificationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationPipeline")
            .field("oracle", &self.oracle.is_some())
            .finish_non_exhaustive()
    }
}

impl ClassificationPipeline {
    /// Creates a pipeline using only local classifiers.
    pub fn new() -> Result<Self> {
        Ok(Self {
            semantic: SemanticTypeDetector::new()?,
            pii: PiiDetector::new()?,
            quality: QualityAnalyzer::new(),
            oracle: None,
        })
    }

    /// Consults `oracle` for fields the pattern detector cannot label.
    pub fn with_oracle(mut self, oracle: Arc<dyn SemanticOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Classifies one field with local classifiers only.
    pub fn classify_field(&self, field: ParsedField) -> ClassifiedField {
        let (data_type, _) = infer_type(&field.type_counts);
        let semantic = self
            .semantic
            .detect(&field.field_name, &field.sample_values, data_type);
        self.finish(field, semantic)
    }

    /// Classifies one field, falling back to the oracle when configured.
    pub async fn classify_field_async(&self, field: ParsedField) -> ClassifiedField {
        let Some(oracle) = &self.oracle else {
            return self.classify_field(field);
        };
        let (data_type, _) = infer_type(&field.type_counts);
        let semantic = self
            .semantic
            .detect_with_oracle(
                &field.field_name,
                &field.sample_values,
                data_type,
                oracle.as_ref(),
            )
            .await;
        self.finish(field, semantic)
    }

    fn finish(&self, field: ParsedField, semantic_type: Option<SemanticType>) -> ClassifiedField {
        let (data_type, confidence_score) = infer_type(&field.type_counts);
        let pii = self.pii.detect_pii(
            &field.field_path,
            &field.field_name,
            semantic_type,
            &field.sample_values,
        );
        let quality = self
            .quality
            .analyze_field(&field.sample_values, data_type, field.total_count);
        let array_item_type = field
            .is_array
            .then(|| infer_array_item_type(&field.array_item_types));

        ClassifiedField {
            is_nullable: field.is_nullable || field.null_percentage > 0.0,
            field_path: field.field_path,
            field_name: field.field_name,
            parent_path: field.parent_path,
            nesting_level: field.nesting_level,
            data_type,
            confidence_score,
            semantic_type,
            is_pii: pii.is_pii,
            pii_type: pii.pii_type,
            pii_confidence: pii.confidence,
            is_array: field.is_array,
            array_item_type,
            sample_values: field.sample_values,
            null_count: field.null_count,
            total_count: field.total_count,
            null_percentage: field.null_percentage,
            distinct_count: quality.distinct_count,
            cardinality_ratio: quality.cardinality_ratio,
            numeric_stats: quality.numeric_stats,
            description: None,
            business_name: None,
            metadata: field.metadata,
        }
    }

    /// Classifies a full parse result into a fingerprinted snapshot.
    pub async fn build_snapshot(
        &self,
        source_name: impl Into<String>,
        result: ParseResult,
    ) -> SchemaSnapshot {
        let start_time = std::time::Instant::now();
        let field_count = result.fields.len();

        let mut fields = Vec::with_capacity(field_count);
        for field in result.fields {
            fields.push(self.classify_field_async(field).await);
        }

        let snapshot = SchemaSnapshot::new(
            source_name,
            result.format,
            result.total_records,
            result.is_array_root,
            fields,
            result.container,
        );
        tracing::info!(
            "Classified {} fields in {:.2}s ({} PII, hash {})",
            field_count,
            start_time.elapsed().as_secs_f64(),
            snapshot.summary.pii_fields,
            snapshot.schema_hash
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldMetadata, FieldType, PiiType, SourceFormat};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn parsed(path: &str, counts: &[(FieldType, u64)], samples: Vec<serde_json::Value>) -> ParsedField {
        let total: u64 = counts.iter().map(|(_, c)| c).sum();
        let nulls = counts
            .iter()
            .find(|(t, _)| *t == FieldType::Null)
            .map_or(0, |(_, c)| *c);
        ParsedField {
            field_path: path.to_string(),
            field_name: path.rsplit('.').next().unwrap_or(path).to_string(),
            parent_path: String::new(),
            nesting_level: 0,
            type_counts: counts.iter().copied().collect::<BTreeMap<_, _>>(),
            is_array: false,
            array_item_types: Vec::new(),
            sample_values: samples,
            null_count: nulls,
            total_count: total,
            null_percentage: nulls as f64 / total as f64 * 100.0,
            is_nullable: nulls > 0,
            metadata: FieldMetadata::default(),
        }
    }

    #[test]
    fn test_classify_email_field() {
        let pipeline = ClassificationPipeline::new().unwrap();
        let field = parsed(
            "email_address",
            &[(FieldType::String, 3), (FieldType::Null, 1)],
            vec![json!("a@b.com"), json!("c@d.org"), json!("e@f.net")],
        );

        let classified = pipeline.classify_field(field);
        assert_eq!(classified.data_type, FieldType::String);
        assert_eq!(classified.semantic_type, Some(SemanticType::Email));
        assert!(classified.is_pii);
        assert_eq!(classified.pii_type, Some(PiiType::Email));
        assert!(classified.is_nullable);
        assert!((classified.null_percentage - 25.0).abs() < 1e-9);
        assert_eq!(classified.distinct_count, 3);
    }

    #[test]
    fn test_numeric_field_gets_stats() {
        let pipeline = ClassificationPipeline::new().unwrap();
        let field = parsed(
            "amount",
            &[(FieldType::Integer, 2), (FieldType::Float, 1)],
            vec![json!(1), json!(2), json!(3.5)],
        );
        let classified = pipeline.classify_field(field);
        assert_eq!(classified.data_type, FieldType::Float);
        assert_eq!(classified.semantic_type, Some(SemanticType::Currency));
        assert!(classified.numeric_stats.is_some());
        assert!(!classified.is_nullable);
    }

    #[tokio::test]
    async fn test_build_snapshot() {
        let pipeline = ClassificationPipeline::new().unwrap();
        let result = ParseResult {
            format: SourceFormat::Json,
            total_records: 2,
            is_array_root: true,
            fields: vec![
                parsed("id", &[(FieldType::Integer, 2)], vec![json!(1), json!(2)]),
                parsed("name", &[(FieldType::String, 2)], vec![json!("a"), json!("b")]),
            ],
            container: Default::default(),
        };

        let snapshot = pipeline.build_snapshot("users.json", result).await;
        assert_eq!(snapshot.fields.len(), 2);
        assert_eq!(snapshot.summary.total_fields, 2);
        assert_eq!(snapshot.schema_hash.len(), 64);
        assert_eq!(snapshot.source_format, SourceFormat::Json);
        assert_eq!(snapshot.fields[0].field_path, "id");
    }
}
