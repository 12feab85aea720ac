//! Semantic type detection from sample values and field names.
//!
//! String fields are matched against an ordered list of value patterns,
//! most specific first, so that a nine digit national ID is never counted as
//! a ZIP code or phone number. Numeric fields carry no useful value shape and
//! are classified by field-name keywords only. When neither applies, an
//! optional [`SemanticOracle`] may be consulted; otherwise field-name hints
//! are the last resort.

use crate::models::{FieldType, SemanticType};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;

/// Number of samples inspected for value patterns.
const SAMPLES_CHECKED: usize = 10;

/// Share of string samples that must agree on a label.
const MATCH_THRESHOLD: f64 = 0.7;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.fZ",
];

const CURRENCY_KEYWORDS: &[&str] = &[
    "price", "cost", "amount", "balance", "revenue", "total", "payment",
];
const COUNT_KEYWORDS: &[&str] = &["count", "quantity", "qty", "number_of"];

/// External classifier consulted when no pattern or keyword matches.
///
/// Implementations must swallow their own failures and answer `None`.
#[async_trait]
pub trait SemanticOracle: Send + Sync {
    /// Returns a semantic label for the field, or `None` if unsure.
    async fn classify(
        &self,
        field_name: &str,
        sample_values: &[Value],
        data_type: FieldType,
    ) -> Option<SemanticType>;
}

/// Pattern-based semantic classifier.
#[derive(Debug)]
pub struct SemanticTypeDetector {
    email: Regex,
    ssn: Regex,
    credit_card: Regex,
    uuid: Regex,
    zip_code: Regex,
    phone: Regex,
    url: Regex,
    identifier: Regex,
}

impl SemanticTypeDetector {
    /// Compiles the detector's patterns.
    pub fn new() -> crate::Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                crate::SurveyError::configuration(format!(
                    "Invalid semantic pattern '{}': {}",
                    pattern, e
                ))
            })
        };

        Ok(Self {
            email: compile(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")?,
            ssn: compile(r"^(?:\d{3}-\d{2}-\d{4}|\d{9})$")?,
            credit_card: compile(
                r"^(?:\*{12}\d{4}|\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}|\d{4})$",
            )?,
            uuid: compile(
                r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
            )?,
            zip_code: compile(r"^\d{5}(?:-\d{4})?$")?,
            phone: compile(r"^\+?1?[\s.-]?\(?[0-9]{3}\)?[\s.-]?[0-9]{3}[\s.-]?[0-9]{4}$")?,
            url: compile(r"^https?://\S+$")?,
            identifier: compile(r"^[a-zA-Z0-9_-]+$")?,
        })
    }

    /// Detects a semantic type without consulting an oracle.
    pub fn detect(
        &self,
        field_name: &str,
        sample_values: &[Value],
        data_type: FieldType,
    ) -> Option<SemanticType> {
        if sample_values.is_empty() {
            return detect_from_field_name(field_name, data_type);
        }
        self.detect_from_values(field_name, sample_values, data_type)
            .or_else(|| detect_from_field_name(field_name, data_type))
    }

    /// Detects a semantic type, asking `oracle` when patterns are inconclusive.
    ///
    /// The oracle's answer is final: a `None` from the oracle is not followed
    /// by field-name hints.
    pub async fn detect_with_oracle(
        &self,
        field_name: &str,
        sample_values: &[Value],
        data_type: FieldType,
        oracle: &dyn SemanticOracle,
    ) -> Option<SemanticType> {
        if sample_values.is_empty() {
            return detect_from_field_name(field_name, data_type);
        }
        if let Some(semantic) = self.detect_from_values(field_name, sample_values, data_type) {
            return Some(semantic);
        }
        oracle.classify(field_name, sample_values, data_type).await
    }

    fn detect_from_values(
        &self,
        field_name: &str,
        sample_values: &[Value],
        data_type: FieldType,
    ) -> Option<SemanticType> {
        match data_type {
            FieldType::String => self.detect_string(field_name, sample_values),
            FieldType::Integer | FieldType::Float => detect_number(field_name),
            _ => None,
        }
    }

    fn detect_string(&self, field_name: &str, sample_values: &[Value]) -> Option<SemanticType> {
        let strings: Vec<&str> = sample_values
            .iter()
            .take(SAMPLES_CHECKED)
            .filter_map(Value::as_str)
            .collect();
        if strings.is_empty() {
            return None;
        }

        let mut votes: Vec<(SemanticType, usize)> = Vec::new();
        for value in &strings {
            if let Some(label) = self.classify_value(field_name, value) {
                match votes.iter_mut().find(|(l, _)| *l == label) {
                    Some((_, count)) => *count += 1,
                    None => votes.push((label, 1)),
                }
            }
        }

        let (label, count) = votes.into_iter().max_by_key(|(_, count)| *count)?;
        (count as f64 / strings.len() as f64 >= MATCH_THRESHOLD).then_some(label)
    }

    fn classify_value(&self, field_name: &str, value: &str) -> Option<SemanticType> {
        if self.email.is_match(value) {
            Some(SemanticType::Email)
        } else if self.ssn.is_match(value) {
            Some(SemanticType::Ssn)
        } else if self.credit_card.is_match(value) {
            Some(SemanticType::CreditCard)
        } else if self.uuid.is_match(value) {
            Some(SemanticType::Uuid)
        } else if self.zip_code.is_match(value) {
            Some(SemanticType::ZipCode)
        } else if self.phone.is_match(value) {
            Some(SemanticType::Phone)
        } else if self.url.is_match(value) {
            Some(SemanticType::Url)
        } else if is_date(value) {
            Some(SemanticType::Date)
        } else if is_currency(value) {
            Some(SemanticType::Currency)
        } else if is_identifier_name(field_name) && self.identifier.is_match(value) {
            Some(SemanticType::Identifier)
        } else {
            None
        }
    }
}

fn is_date(value: &str) -> bool {
    DATE_FORMATS
        .iter()
        .any(|fmt| NaiveDate::parse_from_str(value, fmt).is_ok())
        || DATETIME_FORMATS
            .iter()
            .any(|fmt| NaiveDateTime::parse_from_str(value, fmt).is_ok())
}

fn is_currency(value: &str) -> bool {
    value.starts_with(['$', '€', '£', '¥']) && value.chars().any(|c| c.is_ascii_digit())
}

fn has_id_suffix(field_name: &str) -> bool {
    field_name.ends_with("_id") || field_name.ends_with("Id") || field_name == "id"
}

fn is_identifier_name(field_name: &str) -> bool {
    has_id_suffix(field_name) || field_name.to_lowercase().contains("identifier")
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn detect_number(field_name: &str) -> Option<SemanticType> {
    let lower = field_name.to_lowercase();
    if contains_any(&lower, CURRENCY_KEYWORDS) {
        Some(SemanticType::Currency)
    } else if has_id_suffix(field_name) {
        Some(SemanticType::Identifier)
    } else if contains_any(&lower, COUNT_KEYWORDS) {
        Some(SemanticType::Count)
    } else {
        None
    }
}

/// Field-name hints, used when values are absent or inconclusive.
pub fn detect_from_field_name(field_name: &str, data_type: FieldType) -> Option<SemanticType> {
    let lower = field_name.to_lowercase();

    let hint = if lower.contains("email") {
        Some(SemanticType::Email)
    } else if contains_any(&lower, &["ssn", "social_security"]) {
        Some(SemanticType::Ssn)
    } else if lower.contains("credit_card") || (lower.contains("card") && lower.contains("last")) {
        Some(SemanticType::CreditCard)
    } else if contains_any(&lower, &["phone", "mobile", "tel"]) {
        Some(SemanticType::Phone)
    } else if contains_any(&lower, &["url", "link", "website"]) {
        Some(SemanticType::Url)
    } else if contains_any(&lower, &["date", "time"]) || lower.ends_with("_at") {
        Some(SemanticType::Date)
    } else if contains_any(&lower, &["zip", "postal"]) {
        Some(SemanticType::ZipCode)
    } else if has_id_suffix(field_name) {
        Some(SemanticType::Identifier)
    } else if contains_any(&lower, &["name", "title", "label"]) {
        Some(SemanticType::Name)
    } else if contains_any(&lower, &["status", "type", "category", "tier", "level"]) {
        Some(SemanticType::Category)
    } else {
        None
    };
    if hint.is_some() {
        return hint;
    }

    if data_type.is_numeric() {
        if contains_any(&lower, &["price", "cost", "amount", "balance", "revenue", "total"]) {
            return Some(SemanticType::Currency);
        }
        if contains_any(&lower, &["count", "quantity", "qty"]) {
            return Some(SemanticType::Count);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn detector() -> SemanticTypeDetector {
        SemanticTypeDetector::new().unwrap()
    }

    fn strings(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| json!(v)).collect()
    }

    #[test]
    fn test_email_detection() {
        let samples = strings(&["a@b.com", "c@d.org", "e@f.net"]);
        assert_eq!(
            detector().detect("email_address", &samples, FieldType::String),
            Some(SemanticType::Email)
        );
    }

    #[test]
    fn test_ssn_checked_before_zip_and_phone() {
        let samples = strings(&["123-45-6789", "987654321"]);
        assert_eq!(
            detector().detect("tax_ref", &samples, FieldType::String),
            Some(SemanticType::Ssn)
        );
    }

    #[test]
    fn test_pattern_checks() {
        let d = detector();
        let cases = [
            (vec!["4111 1111 1111 1111", "5500-0000-0000-0004"], SemanticType::CreditCard),
            (
                vec!["550e8400-e29b-41d4-a716-446655440000", "6BA7B810-9DAD-11D1-80B4-00C04FD430C8"],
                SemanticType::Uuid,
            ),
            (vec!["12345", "90210-1234"], SemanticType::ZipCode),
            (vec!["(555) 123-4567", "+1 555.123.4567"], SemanticType::Phone),
            (vec!["https://example.com", "http://a.b/c?d=1"], SemanticType::Url),
            (vec!["2024-01-15", "2024-01-15T10:30:00", "12/31/2023"], SemanticType::Date),
            (vec!["$12.50", "€3", "£100"], SemanticType::Currency),
        ];
        for (values, expected) in cases {
            assert_eq!(
                d.detect("value", &strings(&values), FieldType::String),
                Some(expected),
                "samples {:?}",
                values
            );
        }
    }

    #[test]
    fn test_identifier_requires_id_name() {
        let d = detector();
        let samples = strings(&["abc_1", "xyz-22", "Q9"]);
        assert_eq!(
            d.detect("customer_id", &samples, FieldType::String),
            Some(SemanticType::Identifier)
        );
        assert_eq!(d.detect("reference_code", &samples, FieldType::String), None);
    }

    #[test]
    fn test_threshold_not_met_falls_back_to_name() {
        let samples = strings(&["a@b.com", "nope", "still nope"]);
        assert_eq!(
            detector().detect("contact_email", &samples, FieldType::String),
            Some(SemanticType::Email)
        );
        assert_eq!(detector().detect("notes", &samples, FieldType::String), None);
    }

    #[test]
    fn test_numeric_keyword_heuristics() {
        let d = detector();
        let samples = vec![json!(1), json!(2)];
        assert_eq!(
            d.detect("unit_price", &samples, FieldType::Float),
            Some(SemanticType::Currency)
        );
        assert_eq!(
            d.detect("orderId", &samples, FieldType::Integer),
            Some(SemanticType::Identifier)
        );
        assert_eq!(
            d.detect("item_qty", &samples, FieldType::Integer),
            Some(SemanticType::Count)
        );
    }

    #[test]
    fn test_field_name_only_without_samples() {
        let d = detector();
        assert_eq!(
            d.detect("created_at", &[], FieldType::String),
            Some(SemanticType::Date)
        );
        assert_eq!(
            d.detect("account_status", &[], FieldType::String),
            Some(SemanticType::Category)
        );
        assert_eq!(d.detect("payload", &[], FieldType::Object), None);
    }

    struct CountingOracle {
        calls: AtomicUsize,
        answer: Option<SemanticType>,
    }

    #[async_trait]
    impl SemanticOracle for CountingOracle {
        async fn classify(&self, _: &str, _: &[Value], _: FieldType) -> Option<SemanticType> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    #[tokio::test]
    async fn test_oracle_consulted_only_when_patterns_fail() {
        let d = detector();
        let oracle = CountingOracle {
            calls: AtomicUsize::new(0),
            answer: Some(SemanticType::City),
        };

        let emails = strings(&["a@b.com", "c@d.org"]);
        let hit = d
            .detect_with_oracle("email", &emails, FieldType::String, &oracle)
            .await;
        assert_eq!(hit, Some(SemanticType::Email));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);

        let towns = strings(&["Springfield", "Shelbyville"]);
        let hit = d
            .detect_with_oracle("town", &towns, FieldType::String, &oracle)
            .await;
        assert_eq!(hit, Some(SemanticType::City));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oracle_failure_yields_none() {
        let d = detector();
        let oracle = CountingOracle {
            calls: AtomicUsize::new(0),
            answer: None,
        };
        let samples = strings(&["Springfield"]);
        let hit = d
            .detect_with_oracle("city_label", &samples, FieldType::String, &oracle)
            .await;
        assert_eq!(hit, None);
    }
}
