//! Time-bounded LRU cache of generated descriptions.

use crate::models::{FieldType, SemanticType};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// A generated description and business-friendly name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    pub description: String,
    pub business_name: String,
}

#[derive(Debug)]
struct Entry {
    value: FieldDescription,
    model: String,
    /// `None` when the TTL reaches past the clock's range
    expires_at: Option<Instant>,
    tick: u64,
}

/// Outcome of [`DescriptionCache::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The least recently used entry was dropped to make room
    Evicted,
}

/// Description cache keyed by (path, type, semantic type).
///
/// Entries are tagged with the model that produced them. A lookup under a
/// different model, or after the TTL, removes the entry and misses.
#[derive(Debug)]
pub struct DescriptionCache {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<String, Entry>,
    recency: BTreeMap<u64, String>,
    next_tick: u64,
}

impl DescriptionCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
        }
    }

    /// Builds the lookup key for a field.
    pub fn key(
        field_path: &str,
        data_type: FieldType,
        semantic_type: Option<SemanticType>,
    ) -> String {
        format!(
            "{}:{}:{}",
            field_path,
            data_type,
            semantic_type.map(|s| s.as_str()).unwrap_or("none")
        )
    }

    /// Returns a live entry produced by `model`, marking it most recently used.
    pub fn get(&mut self, key: &str, model: &str) -> Option<FieldDescription> {
        let now = Instant::now();
        let (stale, old_tick) = {
            let entry = self.entries.get(key)?;
            (
                entry.expires_at.is_some_and(|at| at <= now) || entry.model != model,
                entry.tick,
            )
        };

        if stale {
            self.remove(key);
            return None;
        }

        let tick = self.bump();
        self.recency.remove(&old_tick);
        self.recency.insert(tick, key.to_string());
        let entry = self.entries.get_mut(key)?;
        entry.tick = tick;
        Some(entry.value.clone())
    }

    /// Stores `value`, evicting the least recently used entry when full.
    pub fn insert(&mut self, key: String, value: FieldDescription, model: &str) -> InsertOutcome {
        self.remove(&key);

        let mut outcome = InsertOutcome::Inserted;
        if self.entries.len() >= self.capacity
            && let Some((_, oldest)) = self.recency.pop_first()
        {
            self.entries.remove(&oldest);
            outcome = InsertOutcome::Evicted;
        }

        let tick = self.bump();
        self.recency.insert(tick, key.clone());
        self.entries.insert(
            key,
            Entry {
                value,
                model: model.to_string(),
                expires_at: Instant::now().checked_add(self.ttl),
                tick,
            },
        );
        outcome
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.recency.remove(&entry.tick);
        }
    }

    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }
}
