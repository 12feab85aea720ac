//! Deterministic PII classification.
//!
//! Detection runs in three stages: semantic type (email, phone), field-name
//! indicators, then value shape. Value checks only recognize US social
//! security numbers and 16-digit Luhn-valid card numbers.

use crate::models::{PiiType, SemanticType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field-name fragments and the PII category they imply, checked in order.
const PII_INDICATORS: &[(&str, PiiType)] = &[
    ("email", PiiType::Email),
    ("phone", PiiType::Phone),
    ("mobile", PiiType::Phone),
    ("ssn", PiiType::Ssn),
    ("social_security", PiiType::Ssn),
    ("credit_card", PiiType::CreditCard),
    ("passport", PiiType::Passport),
    ("driver_license", PiiType::DriversLicense),
    ("address", PiiType::Address),
    ("ip_address", PiiType::IpAddress),
];

/// Share of samples that must match a value pattern.
const VALUE_MATCH_THRESHOLD: f64 = 0.5;

/// Outcome of PII detection for one field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PiiDetection {
    pub is_pii: bool,
    pub pii_type: Option<PiiType>,
    /// 100 for semantic or name matches, the matching sample share otherwise
    pub confidence: f64,
}

impl PiiDetection {
    fn none() -> Self {
        Self {
            is_pii: false,
            pii_type: None,
            confidence: 0.0,
        }
    }

    fn certain(pii_type: PiiType) -> Self {
        Self {
            is_pii: true,
            pii_type: Some(pii_type),
            confidence: 100.0,
        }
    }
}

/// PII detector with precompiled value patterns.
#[derive(Debug)]
pub struct PiiDetector {
    ssn: Regex,
    card: Regex,
}

impl PiiDetector {
    /// Compiles the detector's patterns.
    pub fn new() -> crate::Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                crate::SurveyError::configuration(format!("Invalid PII pattern: {}", e))
            })
        };
        Ok(Self {
            ssn: compile(r"^\d{3}-\d{2}-\d{4}$")?,
            card: compile(r"^\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}$")?,
        })
    }

    /// Classifies a field.
    ///
    /// `field_path` is accepted for symmetry with the other classifiers; only
    /// the leaf name carries indicator fragments.
    pub fn detect_pii(
        &self,
        field_path: &str,
        field_name: &str,
        semantic_type: Option<SemanticType>,
        sample_values: &[Value],
    ) -> PiiDetection {
        match semantic_type {
            Some(SemanticType::Email) => return PiiDetection::certain(PiiType::Email),
            Some(SemanticType::Phone) => return PiiDetection::certain(PiiType::Phone),
            _ => {}
        }

        let lower = field_name.to_lowercase();
        if let Some((_, pii_type)) = PII_INDICATORS
            .iter()
            .find(|(indicator, _)| lower.contains(indicator))
        {
            return PiiDetection::certain(*pii_type);
        }

        if sample_values.is_empty() {
            return PiiDetection::none();
        }

        let total = sample_values.len() as f64;
        let share = |predicate: &dyn Fn(&str) -> bool| {
            let matches = sample_values
                .iter()
                .filter_map(Value::as_str)
                .filter(|v| predicate(v))
                .count();
            matches as f64 / total
        };

        let ssn_share = share(&|v| self.ssn.is_match(v));
        if ssn_share >= VALUE_MATCH_THRESHOLD {
            return PiiDetection {
                is_pii: true,
                pii_type: Some(PiiType::Ssn),
                confidence: ssn_share * 100.0,
            };
        }

        let card_share = share(&|v| self.is_credit_card(v));
        if card_share >= VALUE_MATCH_THRESHOLD {
            return PiiDetection {
                is_pii: true,
                pii_type: Some(PiiType::CreditCard),
                confidence: card_share * 100.0,
            };
        }

        tracing::trace!(field = field_path, "No PII indicators found");
        PiiDetection::none()
    }

    fn is_credit_card(&self, value: &str) -> bool {
        if !self.card.is_match(value) {
            return false;
        }
        let digits: Vec<u32> = value.chars().filter_map(|c| c.to_digit(10)).collect();
        luhn_valid(&digits)
    }
}

/// Luhn checksum over a digit sequence.
fn luhn_valid(digits: &[u32]) -> bool {
    let checksum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    checksum % 10 == 0
}
