//! Primary type inference from an observed type multiset.

use crate::models::FieldType;
use std::collections::BTreeMap;

/// Infers the primary type and a confidence score in `[0, 100]`.
///
/// The null tag is ignored whenever any other tag was observed. Integer and
/// float observations together widen to float. Ties between equally frequent
/// tags resolve to the tag that sorts first.
pub fn infer_type(type_counts: &BTreeMap<FieldType, u64>) -> (FieldType, f64) {
    let observed: Vec<(FieldType, u64)> = type_counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(tag, count)| (*tag, *count))
        .collect();

    if observed.is_empty() {
        return (FieldType::Unknown, 0.0);
    }

    let has_non_null = observed.iter().any(|(tag, _)| *tag != FieldType::Null);
    let considered: Vec<(FieldType, u64)> = observed
        .into_iter()
        .filter(|(tag, _)| !has_non_null || *tag != FieldType::Null)
        .collect();
    let total: u64 = considered.iter().map(|(_, count)| count).sum();

    let count_of = |wanted: FieldType| {
        considered
            .iter()
            .find(|(tag, _)| *tag == wanted)
            .map_or(0, |(_, count)| *count)
    };
    let integers = count_of(FieldType::Integer);
    let floats = count_of(FieldType::Float);
    if integers > 0 && floats > 0 {
        return (FieldType::Float, percentage(integers + floats, total));
    }

    let mut best = considered[0];
    for candidate in &considered[1..] {
        if candidate.1 > best.1 {
            best = *candidate;
        }
    }
    (best.0, percentage(best.1, total))
}

/// Collapses the item types seen inside an array field.
pub fn infer_array_item_type(item_types: &[FieldType]) -> FieldType {
    match item_types.split_first() {
        None => FieldType::Unknown,
        Some((first, rest)) if rest.iter().all(|t| t == first) => *first,
        Some(_) => FieldType::Mixed,
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
