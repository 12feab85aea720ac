//! Per-path observation accumulators.
//!
//! A [`FieldMap`] owns one [`FieldBuilder`] per field path for the duration
//! of a single parse. Builders remember the order in which their path was
//! first seen so the finalized field list follows document order.

use crate::models::{FieldMetadata, FieldType, ParsedField};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Accumulates observations for a single field path.
#[derive(Debug, Clone)]
pub(crate) struct FieldBuilder {
    field_path: String,
    field_name: String,
    parent_path: String,
    nesting_level: usize,
    first_seen_position: usize,
    max_sample_values: usize,
    type_counts: BTreeMap<FieldType, u64>,
    samples: Vec<Value>,
    null_count: u64,
    total_count: u64,
    is_array: bool,
    array_item_types: BTreeSet<FieldType>,
    declared_nullable: bool,
    pub(crate) metadata: FieldMetadata,
}

impl FieldBuilder {
    /// Records one observation of a type tag with an optional sample.
    pub(crate) fn observe(&mut self, tag: FieldType, sample: Option<Value>) {
        self.total_count = self.total_count.saturating_add(1);
        let count = self.type_counts.entry(tag).or_insert(0);
        *count = count.saturating_add(1);
        if tag == FieldType::Null {
            self.null_count = self.null_count.saturating_add(1);
        }
        if let Some(sample) = sample {
            self.add_sample(sample);
        }
    }

    /// Records a decoded JSON value, sampling scalars.
    pub(crate) fn observe_value(&mut self, value: &Value, array_sample_items: usize) {
        let tag = FieldType::of_value(value);
        match value {
            Value::Array(items) => {
                self.is_array = true;
                for item in items.iter().take(array_sample_items) {
                    self.array_item_types.insert(FieldType::of_value(item));
                }
                self.observe(tag, None);
            }
            Value::Object(_) | Value::Null => self.observe(tag, None),
            _ => self.observe(tag, Some(value.clone())),
        }
    }

    /// Adds a sample if it is new and capacity remains.
    pub(crate) fn add_sample(&mut self, sample: Value) {
        if sample.is_null() || self.samples.len() >= self.max_sample_values {
            return;
        }
        if !self.samples.contains(&sample) {
            self.samples.push(sample);
        }
    }

    /// Flags the field as repeating.
    pub(crate) fn mark_array(&mut self, item_type: Option<FieldType>) {
        self.is_array = true;
        if let Some(item_type) = item_type {
            self.array_item_types.insert(item_type);
        }
    }

    /// Flags the field as nullable regardless of observed nulls.
    pub(crate) fn mark_nullable(&mut self) {
        self.declared_nullable = true;
    }

    /// Records `count` observations of one tag at once, for sources that
    /// report per-column totals instead of individual values.
    pub(crate) fn observe_many(&mut self, tag: FieldType, count: u64) {
        if count == 0 {
            return;
        }
        self.total_count = self.total_count.saturating_add(count);
        let entry = self.type_counts.entry(tag).or_insert(0);
        *entry = entry.saturating_add(count);
        if tag == FieldType::Null {
            self.null_count = self.null_count.saturating_add(count);
        }
    }

    /// Records a type declared by the source schema when no values exist.
    ///
    /// The declaration counts as one type observation without contributing
    /// to `total_count`.
    pub(crate) fn declare_type(&mut self, tag: FieldType) {
        if self.type_counts.values().all(|count| *count == 0) {
            self.type_counts.insert(tag, 1);
        }
    }

    /// Finalizes the observation.
    pub(crate) fn finish(self) -> ParsedField {
        let null_percentage = if self.total_count > 0 {
            self.null_count as f64 / self.total_count as f64 * 100.0
        } else {
            0.0
        };
        ParsedField {
            field_path: self.field_path,
            field_name: self.field_name,
            parent_path: self.parent_path,
            nesting_level: self.nesting_level,
            type_counts: self.type_counts,
            is_array: self.is_array,
            array_item_types: self.array_item_types.into_iter().collect(),
            sample_values: self.samples,
            null_count: self.null_count,
            total_count: self.total_count,
            null_percentage,
            is_nullable: self.declared_nullable || self.null_count > 0,
            metadata: self.metadata,
        }
    }
}

/// Insertion-ordered collection of field builders for one parse.
#[derive(Debug)]
pub(crate) struct FieldMap {
    fields: HashMap<String, FieldBuilder>,
    next_position: usize,
    max_sample_values: usize,
}

impl FieldMap {
    pub(crate) fn new(max_sample_values: usize) -> Self {
        Self {
            fields: HashMap::new(),
            next_position: 0,
            max_sample_values,
        }
    }

    /// Returns the builder for `field_path`, creating it on first encounter.
    pub(crate) fn entry(
        &mut self,
        field_path: &str,
        field_name: &str,
        parent_path: &str,
        nesting_level: usize,
    ) -> &mut FieldBuilder {
        self.fields
            .entry(field_path.to_string())
            .or_insert_with(|| {
                let position = self.next_position;
                self.next_position = self.next_position.saturating_add(1);
                FieldBuilder {
                    field_path: field_path.to_string(),
                    field_name: field_name.to_string(),
                    parent_path: parent_path.to_string(),
                    nesting_level,
                    first_seen_position: position,
                    max_sample_values: self.max_sample_values,
                    type_counts: BTreeMap::new(),
                    samples: Vec::new(),
                    null_count: 0,
                    total_count: 0,
                    is_array: false,
                    array_item_types: BTreeSet::new(),
                    declared_nullable: false,
                    metadata: FieldMetadata::default(),
                }
            })
    }

    pub(crate) fn get_mut(&mut self, field_path: &str) -> Option<&mut FieldBuilder> {
        self.fields.get_mut(field_path)
    }

    pub(crate) fn len(&self) -> usize {
        self.fields.len()
    }

    /// Finalizes every builder in first-seen order.
    pub(crate) fn finish(self) -> Vec<ParsedField> {
        let mut builders: Vec<FieldBuilder> = self.fields.into_values().collect();
        builders.sort_by_key(|b| b.first_seen_position);
        builders.into_iter().map(FieldBuilder::finish).collect()
    }
}
