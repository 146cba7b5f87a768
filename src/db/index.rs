//! GeoCell index: geohash keys mapped to ordered buckets of records.
//!
//! This is the only mutable storage in the registry. It performs no
//! validation; callers hand it records that already passed the write-side
//! checks in `compute::validation`.

use geocell_types::{Record, RecordId};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Result of a single bucket write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Replaced,
}

/// Ordered records stored under one geohash.
///
/// Iteration order is insertion order; replacing a record keeps its slot.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    records: Vec<Record>,
    /// id -> slot in `records`
    positions: FxHashMap<RecordId, usize>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the record with the same id in place, or append it.
    pub fn put_or_replace(&mut self, record: Record) -> WriteOutcome {
        match self.positions.get(&record.id) {
            Some(&slot) => {
                self.records[slot] = record;
                WriteOutcome::Replaced
            }
            None => {
                self.positions.insert(record.id, self.records.len());
                self.records.push(record);
                WriteOutcome::Inserted
            }
        }
    }

    /// Remove a record, shifting later records down to keep relative order.
    pub(crate) fn remove(&mut self, id: RecordId) -> Option<Record> {
        let slot = self.positions.remove(&id)?;
        let removed = self.records.remove(slot);
        for record in &self.records[slot..] {
            if let Some(pos) = self.positions.get_mut(&record.id) {
                *pos -= 1;
            }
        }
        Some(removed)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.positions.get(&id).map(|&slot| &self.records[slot])
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Authoritative mapping from geohash to bucket.
#[derive(Debug, Default)]
pub struct GeoCellIndex {
    buckets: FxHashMap<String, Bucket>,
    /// id -> geohashes currently holding a record with that id
    locations: FxHashMap<RecordId, BTreeSet<String>>,
    record_count: usize,
}

impl GeoCellIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` into the bucket for `geohash`, replacing any record
    /// with the same id in that bucket.
    pub fn put_or_replace(&mut self, geohash: &str, record: Record) -> WriteOutcome {
        let id = record.id;
        let outcome = self
            .buckets
            .entry(geohash.to_string())
            .or_default()
            .put_or_replace(record);

        if outcome == WriteOutcome::Inserted {
            self.record_count += 1;
            self.locations
                .entry(id)
                .or_default()
                .insert(geohash.to_string());
        }

        outcome
    }

    /// Records stored under `geohash`, empty when it was never written.
    pub fn bucket_of(&self, geohash: &str) -> &[Record] {
        self.buckets
            .get(geohash)
            .map(Bucket::records)
            .unwrap_or(&[])
    }

    pub fn bucket(&self, geohash: &str) -> Option<&Bucket> {
        self.buckets.get(geohash)
    }

    /// Drop the record `id` from `geohash`. Empty buckets are released.
    pub(crate) fn remove(&mut self, geohash: &str, id: RecordId) -> Option<Record> {
        let bucket = self.buckets.get_mut(geohash)?;
        let removed = bucket.remove(id)?;
        if bucket.is_empty() {
            self.buckets.remove(geohash);
        }

        self.record_count -= 1;
        if let Some(cells) = self.locations.get_mut(&id) {
            cells.remove(geohash);
            if cells.is_empty() {
                self.locations.remove(&id);
            }
        }

        Some(removed)
    }

    /// Geohashes holding a record with `id`, in lexical order.
    pub fn locations_of(&self, id: RecordId) -> Vec<String> {
        self.locations
            .get(&id)
            .map(|cells| cells.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All geohashes with at least one record, in lexical order.
    pub fn geohashes(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.buckets.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    pub fn contains_bucket(&self, geohash: &str) -> bool {
        self.buckets.contains_key(geohash)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }
}
