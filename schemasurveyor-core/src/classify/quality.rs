//! Quality statistics over sampled values.
//!
//! Every statistic here is computed from the bounded sample set retained by
//! the parser, not from the full population. Distinct counts, cardinality and
//! the numeric distribution are therefore estimates; null and total counts
//! come from the full observation and are exact for the sampled records.

use crate::models::{FieldType, NumericStats};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Quality metrics for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub distinct_count: u64,
    /// `distinct_count / total_count`, clamped to `[0, 1]`
    pub cardinality_ratio: f64,
    pub numeric_stats: Option<NumericStats>,
}

/// Computes quality metrics from samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct QualityAnalyzer;

impl QualityAnalyzer {
    /// Creates a new analyzer.
    pub fn new() -> Self {
        Self
    }

    /// Analyzes a field's samples.
    ///
    /// `total_count` is the number of observations of the field, used as the
    /// cardinality denominator.
    pub fn analyze_field(
        &self,
        sample_values: &[Value],
        data_type: FieldType,
        total_count: u64,
    ) -> QualityMetrics {
        let distinct: HashSet<String> = sample_values
            .iter()
            .filter(|v| !v.is_null())
            .map(Value::to_string)
            .collect();
        let distinct_count = distinct.len() as u64;

        let cardinality_ratio = if total_count == 0 {
            0.0
        } else {
            (distinct_count as f64 / total_count as f64).clamp(0.0, 1.0)
        };

        let numeric_stats = if data_type.is_numeric() {
            let numbers: Vec<f64> = sample_values.iter().filter_map(numeric_value).collect();
            numeric_stats(numbers)
        } else {
            None
        };

        QualityMetrics {
            distinct_count,
            cardinality_ratio,
            numeric_stats,
        }
    }
}

/// Coerces a sample to a number, accepting numeric strings.
fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// Distribution statistics; population standard deviation, linearly
/// interpolated percentiles.
pub fn numeric_stats(mut values: Vec<f64>) -> Option<NumericStats> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    let median = percentile(&values, 0.5);

    Some(NumericStats {
        min_value: values[0],
        max_value: values[values.len() - 1],
        mean_value: mean,
        median_value: median,
        std_dev: variance.sqrt(),
        percentile_25: percentile(&values, 0.25),
        percentile_50: median,
        percentile_75: percentile(&values, 0.75),
    })
}

/// Percentile of sorted, non-empty data by linear interpolation between the
/// closest ranks.
fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    let rank = fraction * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
