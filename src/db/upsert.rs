//! Validated, all-or-nothing upserts across one or more geohash buckets.
//!
//! An upsert runs in three phases: `validate` (pure, no lock), `check_capacity`
//! (against the locked index, still no mutation) and `apply`. Only `apply`
//! mutates, and it cannot fail, so a rejected upsert never leaves partial state.

use super::index::{GeoCellIndex, WriteOutcome};
use crate::compute::validation::{
    validate_entity, validate_geohash_set, validate_height_range, validate_time_window,
};
use crate::config::{Config, IdScope};
use crate::error::{RegistryError, Result};
use geocell_types::{DataUpdated, Record, RecordId};
use serde::{Deserialize, Serialize};

/// One insert-or-replace call, as received from the caller.
///
/// This is also the unit written to the append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertRequest {
    pub geohashes: Vec<String>,
    pub min_height: i64,
    pub max_height: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub url: String,
    pub entity: u8,
    pub id: RecordId,
}

impl UpsertRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new<S: AsRef<str>>(
        geohashes: &[S],
        min_height: i64,
        max_height: i64,
        start_time: i64,
        end_time: i64,
        url: impl Into<String>,
        entity: u8,
        id: RecordId,
    ) -> Self {
        Self {
            geohashes: geohashes.iter().map(|g| g.as_ref().to_string()).collect(),
            min_height,
            max_height,
            start_time,
            end_time,
            url: url.into(),
            entity,
            id,
        }
    }

    /// Check every field invariant and build one record per distinct geohash.
    pub fn validate(&self, config: &Config) -> Result<ValidatedUpsert> {
        let geohashes = validate_geohash_set(&self.geohashes, config.geohash_policy)?;
        validate_height_range(self.min_height, self.max_height)?;
        validate_time_window(self.start_time, self.end_time)?;
        let entity = validate_entity(self.entity)?;

        let records = geohashes
            .into_iter()
            .map(|geohash| Record {
                id: self.id,
                geohash,
                min_height: self.min_height,
                max_height: self.max_height,
                start_time: self.start_time,
                end_time: self.end_time,
                url: self.url.clone(),
                entity,
            })
            .collect();

        Ok(ValidatedUpsert {
            id: self.id,
            records,
        })
    }
}

/// An upsert whose fields passed validation; one record per target bucket.
#[derive(Debug, Clone)]
pub struct ValidatedUpsert {
    id: RecordId,
    records: Vec<Record>,
}

impl ValidatedUpsert {
    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    fn targets(&self, geohash: &str) -> bool {
        self.records.iter().any(|r| r.geohash == geohash)
    }

    /// Geohashes that would lose their copy of this id under global scoping.
    fn evictions(&self, index: &GeoCellIndex, scope: IdScope) -> Vec<String> {
        match scope {
            IdScope::PerBucket => Vec::new(),
            IdScope::Global => index
                .locations_of(self.id)
                .into_iter()
                .filter(|geohash| !self.targets(geohash))
                .collect(),
        }
    }

    /// Reject the write if any bucket would exceed the configured capacity.
    pub fn check_capacity(&self, index: &GeoCellIndex, config: &Config) -> Result<()> {
        if let Some(limit) = config.max_records_per_bucket {
            for record in &self.records {
                let (len, present) = index
                    .bucket(&record.geohash)
                    .map(|b| (b.len(), b.contains(self.id)))
                    .unwrap_or((0, false));
                if !present && len >= limit {
                    return Err(RegistryError::WriteFailure(format!(
                        "bucket '{}' is full ({} records)",
                        record.geohash, limit
                    )));
                }
            }
        }

        if let Some(limit) = config.max_buckets {
            let new_buckets = self
                .records
                .iter()
                .filter(|r| !index.contains_bucket(&r.geohash))
                .count();
            if new_buckets > 0 && index.bucket_count() + new_buckets > limit {
                return Err(RegistryError::WriteFailure(format!(
                    "bucket limit of {} reached ({} in use, {} requested)",
                    limit,
                    index.bucket_count(),
                    new_buckets
                )));
            }
        }

        Ok(())
    }

    /// Apply every bucket write. Infallible once capacity was checked.
    pub fn apply(self, index: &mut GeoCellIndex, scope: IdScope) -> UpsertReceipt {
        let id = self.id;
        for geohash in self.evictions(index, scope) {
            index.remove(&geohash, id);
        }

        let outcomes = self
            .records
            .into_iter()
            .map(|record| {
                let geohash = record.geohash.clone();
                let outcome = index.put_or_replace(&geohash, record);
                (geohash, outcome)
            })
            .collect();

        UpsertReceipt { id, outcomes }
    }
}

/// Success marker for a committed upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertReceipt {
    pub id: RecordId,
    /// Per-geohash outcome in request order, duplicates collapsed.
    pub outcomes: Vec<(String, WriteOutcome)>,
}

impl UpsertReceipt {
    pub fn inserted(&self) -> usize {
        self.count(WriteOutcome::Inserted)
    }

    pub fn replaced(&self) -> usize {
        self.count(WriteOutcome::Replaced)
    }

    fn count(&self, outcome: WriteOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }

    /// Events announcing this write, one per geohash.
    pub fn events(&self) -> Vec<DataUpdated> {
        self.outcomes
            .iter()
            .map(|(geohash, outcome)| DataUpdated {
                geohash: geohash.clone(),
                id: self.id,
                replaced: *outcome == WriteOutcome::Replaced,
            })
            .collect()
    }
}
