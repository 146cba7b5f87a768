//! Core registry implementation.
//!
//! This module defines the `Registry` type: the upsert and query services
//! over a `GeoCellIndex`, event delivery, and persistence wiring.

use crate::compute::query;
use crate::config::{Config, RegistryStats};
use crate::error::{RegistryError, Result};
#[cfg(feature = "aof")]
use crate::storage::{LogEntry, PersistenceLog};
use geocell_types::{QueryResult, QueryWindow, Record, RecordId};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

mod events;
mod index;
mod upsert;

pub use events::{DataListener, SubscriptionId};
pub use index::{Bucket, GeoCellIndex, WriteOutcome};
pub use upsert::{UpsertReceipt, UpsertRequest, ValidatedUpsert};

use events::EventBus;

const MEMORY_PATH: &str = ":memory:";

/// Geohash-keyed registry of height- and time-scoped polygon records.
///
/// Cheap to clone; clones share state. All buckets sit behind one
/// reader-writer lock: an upsert holds the write lock from capacity check to
/// apply, so readers only ever see fully committed upserts.
///
/// # Examples
///
/// ```rust
/// use geocell::Registry;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = Registry::memory()?;
/// let t = 1_700_000_000;
///
/// registry.upsert_polygon_data(&["s2fd125", "s2fd126"], 90, 200, t, t + 86_400, "example1.com", 1, 1)?;
///
/// let result = registry.get_data("s2fd125", 100, 200, t, t + 172_800)?;
/// assert_eq!(result.urls, vec!["example1.com"]);
/// assert_eq!(result.entity_numbers, vec![1]);
/// assert_eq!(result.ids, vec![1]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Registry {
    pub(crate) inner: Arc<RwLock<RegistryInner>>,
    events: Arc<EventBus>,
    closed: Arc<AtomicBool>,
    queries: Arc<AtomicU64>,
}

pub(crate) struct RegistryInner {
    pub index: GeoCellIndex,
    pub config: Config,
    #[cfg(feature = "aof")]
    pub log: Option<PersistenceLog>,
    pub upserts: u64,
}

impl RegistryInner {
    fn new(config: Config) -> Self {
        Self {
            index: GeoCellIndex::new(),
            config,
            #[cfg(feature = "aof")]
            log: None,
            upserts: 0,
        }
    }

    /// Capacity check, log append, then apply. Nothing mutates on error.
    fn commit(
        &mut self,
        request: &UpsertRequest,
        validated: ValidatedUpsert,
    ) -> Result<UpsertReceipt> {
        validated.check_capacity(&self.index, &self.config)?;

        #[cfg(feature = "aof")]
        if let Some(log) = self.log.as_mut() {
            log.append(&LogEntry::Upsert(request.clone()))
                .map_err(|e| {
                    if e.is_write_failure() {
                        e
                    } else {
                        RegistryError::WriteFailure(e.to_string())
                    }
                })?;
        }
        #[cfg(not(feature = "aof"))]
        let _ = request;

        let receipt = validated.apply(&mut self.index, self.config.id_scope);
        self.upserts += 1;
        Ok(receipt)
    }

    /// Rebuild the index from `log`.
    ///
    /// The log must have been written under the configured id scope. Logged
    /// geohashes are only held to the `Opaque` rules, since they were
    /// accepted when committed.
    #[cfg(feature = "aof")]
    fn replay(&mut self, mut log: PersistenceLog) -> Result<()> {
        let entries = log.replay()?;
        if log.id_scope() != self.config.id_scope {
            return Err(RegistryError::Config(format!(
                "log {:?} was written with {:?} id scope but {:?} is configured",
                log.path(),
                log.id_scope(),
                self.config.id_scope
            )));
        }

        let replay_config = self
            .config
            .clone()
            .with_geohash_policy(crate::config::GeohashPolicy::Opaque);
        let count = entries.len();
        for entry in entries {
            match entry {
                LogEntry::Upsert(request) => {
                    let validated = request.validate(&replay_config)?;
                    validated.apply(&mut self.index, self.config.id_scope);
                    self.upserts += 1;
                }
            }
        }

        log::debug!(
            "Recovered {} upserts into {} buckets from {:?}",
            count,
            self.index.bucket_count(),
            log.path()
        );
        self.log = Some(log);
        Ok(())
    }
}

impl Registry {
    /// Open or create a registry backed by the log at `path`. Use ":memory:"
    /// for a registry without persistence.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, Config::default())
    }

    pub fn builder() -> crate::builder::RegistryBuilder {
        crate::builder::RegistryBuilder::new()
    }

    /// Open or create a registry with custom configuration, replaying any
    /// existing log.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        config.validate().map_err(RegistryError::Config)?;
        let path = path.as_ref();

        #[cfg_attr(not(feature = "aof"), allow(unused_mut))]
        let mut inner = RegistryInner::new(config);

        if path.to_str() != Some(MEMORY_PATH) {
            #[cfg(feature = "aof")]
            {
                let log = PersistenceLog::open(
                    path,
                    inner.config.sync_policy,
                    inner.config.sync_mode,
                    inner.config.id_scope,
                )?;
                inner.replay(log)?;
            }
            #[cfg(not(feature = "aof"))]
            return Err(RegistryError::Config(format!(
                "cannot persist to {:?}: built without the `aof` feature",
                path
            )));
        }

        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
            events: Arc::new(EventBus::default()),
            closed: Arc::new(AtomicBool::new(false)),
            queries: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Create an in-memory registry with default configuration.
    pub fn memory() -> Result<Self> {
        Self::open(MEMORY_PATH)
    }

    /// Create an in-memory registry with custom configuration.
    pub fn memory_with_config(config: Config) -> Result<Self> {
        Self::open_with_config(MEMORY_PATH, config)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RegistryError::RegistryClosed);
        }
        Ok(())
    }

    /// Insert or replace record `id` in every named geohash bucket, atomically.
    ///
    /// Fails with `Validation` when `min_height > max_height`,
    /// `start_time >= end_time`, `entity` is unrecognized, or the geohash set
    /// is empty or holds a malformed key. Fails with `WriteFailure` when a
    /// bucket is full or the log append fails. Either way no bucket changes.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_polygon_data<S: AsRef<str>>(
        &self,
        geohashes: &[S],
        min_height: i64,
        max_height: i64,
        start_time: i64,
        end_time: i64,
        url: &str,
        entity: u8,
        id: RecordId,
    ) -> Result<UpsertReceipt> {
        let request = UpsertRequest::new(
            geohashes, min_height, max_height, start_time, end_time, url, entity, id,
        );
        self.upsert(&request)
    }

    /// Single-geohash form of `upsert_polygon_data`.
    #[allow(clippy::too_many_arguments)]
    pub fn input_data(
        &self,
        geohash: &str,
        min_height: i64,
        max_height: i64,
        start_time: i64,
        end_time: i64,
        url: &str,
        entity: u8,
        id: RecordId,
    ) -> Result<UpsertReceipt> {
        self.upsert_polygon_data(
            &[geohash], min_height, max_height, start_time, end_time, url, entity, id,
        )
    }

    /// Apply a prepared upsert request.
    ///
    /// Events are delivered in commit order. If another writer is delivering
    /// events when this call commits, that writer delivers these too and this
    /// call returns without waiting for them.
    pub fn upsert(&self, request: &UpsertRequest) -> Result<UpsertReceipt> {
        self.ensure_open()?;

        let receipt = {
            let mut inner = self.inner.write();
            let validated = request.validate(&inner.config)?;
            let receipt = inner.commit(request, validated)?;
            self.events.enqueue(receipt.events());
            receipt
        };

        self.events.drain();
        Ok(receipt)
    }

    /// Records under `geohash` overlapping the height and time window, as
    /// parallel `urls`, `entity_numbers` and `ids` sequences in bucket order.
    ///
    /// The window is not validated; an inverted window is a legal query.
    /// An unknown geohash yields empty sequences.
    pub fn get_data(
        &self,
        geohash: &str,
        min_height: i64,
        max_height: i64,
        start_time: i64,
        end_time: i64,
    ) -> Result<QueryResult> {
        let window = QueryWindow::new(min_height, max_height, start_time, end_time);
        self.query(geohash, &window)
    }

    /// `get_data` with a prepared window.
    pub fn query(&self, geohash: &str, window: &QueryWindow) -> Result<QueryResult> {
        self.ensure_open()?;
        Self::check_query_key(geohash)?;

        let inner = self.inner.read();
        let result = query::project(inner.index.bucket_of(geohash), window);
        self.queries.fetch_add(1, Ordering::Relaxed);
        Ok(result)
    }

    /// Query several geohashes against one consistent state.
    ///
    /// All buckets are read under a single read lock, so a multi-geohash
    /// upsert is either visible in every result or in none.
    pub fn query_many<S: AsRef<str>>(
        &self,
        geohashes: &[S],
        window: &QueryWindow,
    ) -> Result<Vec<QueryResult>> {
        self.ensure_open()?;
        for geohash in geohashes {
            Self::check_query_key(geohash.as_ref())?;
        }

        let inner = self.inner.read();
        let results = geohashes
            .iter()
            .map(|geohash| query::project(inner.index.bucket_of(geohash.as_ref()), window))
            .collect();
        self.queries
            .fetch_add(geohashes.len() as u64, Ordering::Relaxed);
        Ok(results)
    }

    /// Full records under `geohash` overlapping `window`, in bucket order.
    pub fn get_records(&self, geohash: &str, window: &QueryWindow) -> Result<Vec<Record>> {
        self.ensure_open()?;
        Self::check_query_key(geohash)?;

        let inner = self.inner.read();
        let records = query::matching(inner.index.bucket_of(geohash), window)
            .cloned()
            .collect();
        self.queries.fetch_add(1, Ordering::Relaxed);
        Ok(records)
    }

    /// Number of records under `geohash` overlapping `window`.
    pub fn count(&self, geohash: &str, window: &QueryWindow) -> Result<usize> {
        self.ensure_open()?;
        Self::check_query_key(geohash)?;

        let matched = query::count(self.inner.read().index.bucket_of(geohash), window);
        self.queries.fetch_add(1, Ordering::Relaxed);
        Ok(matched)
    }

    fn check_query_key(geohash: &str) -> Result<()> {
        if geohash.is_empty() {
            return Err(RegistryError::Validation("geohash cannot be empty".into()));
        }
        Ok(())
    }

    /// Copy of the ordered bucket for `geohash`; empty when never written.
    pub fn bucket_of(&self, geohash: &str) -> Result<Vec<Record>> {
        self.ensure_open()?;
        Ok(self.inner.read().index.bucket_of(geohash).to_vec())
    }

    /// The record `id` stored under `geohash`, if any.
    pub fn get_record(&self, geohash: &str, id: RecordId) -> Result<Option<Record>> {
        self.ensure_open()?;
        Ok(self
            .inner
            .read()
            .index
            .bucket(geohash)
            .and_then(|bucket| bucket.get(id))
            .cloned())
    }

    /// Geohashes holding a record with `id`, in lexical order.
    pub fn locations_of(&self, id: RecordId) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.inner.read().index.locations_of(id))
    }

    /// Every non-empty geohash, in lexical order.
    pub fn geohashes(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.inner.read().index.geohashes())
    }

    /// Register a listener for `DataUpdated` events.
    pub fn subscribe<L>(&self, listener: L) -> SubscriptionId
    where
        L: DataListener + 'static,
    {
        self.events.subscribe(Arc::new(listener))
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn config(&self) -> Config {
        self.inner.read().config.clone()
    }

    /// Flush and fsync the log. A no-op in memory.
    pub fn sync(&self) -> Result<()> {
        self.ensure_open()?;
        #[cfg(feature = "aof")]
        if let Some(log) = self.inner.write().log.as_mut() {
            log.sync()?;
        }
        Ok(())
    }

    /// Close the registry. Later calls fail with `RegistryClosed`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        #[cfg(feature = "aof")]
        if let Some(log) = self.inner.write().log.as_mut() {
            log.sync()?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.read();

        #[cfg(feature = "aof")]
        let log_bytes = inner.log.as_ref().map(|log| log.size()).unwrap_or(0);
        #[cfg(not(feature = "aof"))]
        let log_bytes = 0;

        RegistryStats {
            bucket_count: inner.index.bucket_count(),
            record_count: inner.index.record_count(),
            upserts: inner.upserts,
            queries: self.queries.load(Ordering::Relaxed),
            log_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::mpsc;
    use std::thread;

    const T: i64 = 1_700_000_000;
    const DAY: i64 = 86_400;

    #[test]
    fn test_repeated_upsert_replaces() {
        let registry = Registry::memory().unwrap();
        registry
            .input_data("s2fd123", 100, 200, T, T + DAY, "first", 1, 1)
            .unwrap();
        let receipt = registry
            .input_data("s2fd123", 120, 180, T, T + DAY, "second", 2, 1)
            .unwrap();
        assert_eq!(receipt.replaced(), 1);

        let bucket = registry.bucket_of("s2fd123").unwrap();
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket[0].url, "second");
        assert_eq!(bucket[0].entity.get(), 2);
        assert_eq!(bucket[0].min_height, 120);
    }

    #[test]
    fn test_overlap_query() {
        let registry = Registry::memory().unwrap();
        registry
            .input_data("s2fd123", 100, 200, T, T + DAY, "r", 1, 1)
            .unwrap();

        let hit = registry
            .get_data("s2fd123", 150, 160, T, T + 3_600)
            .unwrap();
        assert_eq!(hit.ids, vec![1]);

        let miss = registry
            .get_data("s2fd123", 300, 400, T, T + 3_600)
            .unwrap();
        assert!(miss.is_empty());

        let touch = registry.get_data("s2fd123", 0, 100, T, T + 1).unwrap();
        assert_eq!(touch.ids, vec![1]);
    }

    #[test]
    fn test_failed_upsert_leaves_state() {
        let registry = Registry::memory().unwrap();
        registry.input_data("g1", 100, 200, T, T + 1, "u", 1, 1).unwrap();
        let before = registry.bucket_of("g1").unwrap();

        let err = registry
            .upsert_polygon_data(&["g1"], 200, 100, T, T + 1, "u", 1, 1)
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(registry.bucket_of("g1").unwrap(), before);
        assert_eq!(registry.stats().upserts, 1);
    }

    #[test]
    fn test_events_after_commit_only() {
        let registry = Registry::memory().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = registry.subscribe(move |e: &geocell_types::DataUpdated| {
            sink.lock().push((e.geohash.clone(), e.id, e.replaced));
        });

        registry
            .upsert_polygon_data(&["g1", "g2"], 0, 10, T, T + 1, "u", 1, 7)
            .unwrap();
        let _ = registry.input_data("g1", 10, 0, T, T + 1, "u", 1, 8);
        registry.input_data("g1", 0, 10, T, T + 1, "v", 1, 7).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                ("g1".to_string(), 7, false),
                ("g2".to_string(), 7, false),
                ("g1".to_string(), 7, true),
            ]
        );

        assert!(registry.unsubscribe(sub));
        registry.input_data("g3", 0, 10, T, T + 1, "u", 1, 1).unwrap();
        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn test_events_follow_commit_order_across_writers() {
        let registry = Registry::memory().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (stalled_tx, stalled_rx) = mpsc::channel::<()>();
        let (resume_tx, resume_rx) = mpsc::channel::<()>();
        let stalled_tx = Mutex::new(Some(stalled_tx));
        let resume_rx = Mutex::new(resume_rx);

        let sink = Arc::clone(&seen);
        registry.subscribe(move |e: &geocell_types::DataUpdated| {
            sink.lock().push((e.id, e.replaced));
            // hold the first writer inside delivery of its insert
            if let Some(tx) = stalled_tx.lock().take() {
                tx.send(()).unwrap();
                resume_rx.lock().recv().unwrap();
            }
        });

        let first = {
            let registry = registry.clone();
            thread::spawn(move || {
                registry
                    .input_data("g1", 0, 10, T, T + 1, "first", 1, 1)
                    .unwrap();
            })
        };

        stalled_rx.recv().unwrap();
        let receipt = registry
            .input_data("g1", 0, 10, T, T + 1, "second", 1, 1)
            .unwrap();
        assert_eq!(receipt.replaced(), 1);
        resume_tx.send(()).unwrap();
        first.join().unwrap();

        assert_eq!(*seen.lock(), vec![(1, false), (1, true)]);
    }

    #[test]
    fn test_listener_can_upsert() {
        let registry = Registry::memory().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let writer = registry.clone();
        let sink = Arc::clone(&seen);
        registry.subscribe(move |e: &geocell_types::DataUpdated| {
            sink.lock().push((e.geohash.clone(), e.id));
            if e.geohash == "g1" {
                writer.input_data("mirror", 0, 10, T, T + 1, "m", 1, e.id).unwrap();
            }
        });

        registry.input_data("g1", 0, 10, T, T + 1, "u", 1, 5).unwrap();
        assert_eq!(
            *seen.lock(),
            vec![("g1".to_string(), 5), ("mirror".to_string(), 5)]
        );
    }

    #[cfg(feature = "aof")]
    #[test]
    fn test_log_append_failure_is_write_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = Registry::open(dir.path().join("failing.aof")).unwrap();
        registry.input_data("g1", 0, 10, T, T + 1, "u", 1, 1).unwrap();

        let delivered = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&delivered);
        registry.subscribe(move |_: &geocell_types::DataUpdated| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        let before = registry.bucket_of("g1").unwrap();
        let stats = registry.stats();
        if let Some(log) = registry.inner.write().log.as_mut() {
            log.set_max_frame_len(256);
        }

        let url = "x".repeat(1024);
        let err = registry
            .upsert_polygon_data(&["g1", "g2"], 0, 10, T, T + 1, &url, 2, 2)
            .unwrap_err();
        assert!(err.is_write_failure());

        assert_eq!(registry.bucket_of("g1").unwrap(), before);
        assert!(registry.bucket_of("g2").unwrap().is_empty());
        assert_eq!(registry.stats().log_bytes, stats.log_bytes);
        assert_eq!(registry.stats().upserts, stats.upserts);
        assert_eq!(delivered.load(Ordering::Relaxed), 0);

        registry.input_data("g1", 0, 10, T, T + 1, "v", 1, 3).unwrap();
        assert_eq!(delivered.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_listener_can_read_registry() {
        let registry = Registry::memory().unwrap();
        let observed = Arc::new(Mutex::new(None));
        let reader = registry.clone();
        let sink = Arc::clone(&observed);
        registry.subscribe(move |e: &geocell_types::DataUpdated| {
            let result = reader
                .query(&e.geohash, &QueryWindow::unbounded())
                .unwrap();
            *sink.lock() = Some(result.ids);
        });

        registry.input_data("g1", 0, 10, T, T + 1, "u", 1, 4).unwrap();
        assert_eq!(*observed.lock(), Some(vec![4]));
    }

    #[test]
    fn test_empty_geohash_query_fails() {
        let registry = Registry::memory().unwrap();
        assert!(registry.get_data("", 0, 1, 0, 1).unwrap_err().is_validation());
    }

    #[test]
    fn test_closed_registry() {
        let registry = Registry::memory().unwrap();
        registry.close().unwrap();
        assert!(registry.is_closed());

        assert!(matches!(
            registry.input_data("g1", 0, 1, 0, 1, "u", 1, 1),
            Err(RegistryError::RegistryClosed)
        ));
        assert!(matches!(
            registry.get_data("g1", 0, 1, 0, 1),
            Err(RegistryError::RegistryClosed)
        ));
        assert!(registry.close().is_ok());
    }

    #[test]
    fn test_stats() {
        let registry = Registry::memory().unwrap();
        registry
            .upsert_polygon_data(&["g1", "g2"], 0, 10, T, T + 1, "u", 1, 1)
            .unwrap();
        registry.input_data("g1", 0, 10, T, T + 1, "u", 1, 2).unwrap();
        registry.get_data("g1", 0, 10, T, T + 1).unwrap();
        registry.count("g2", &QueryWindow::unbounded()).unwrap();

        let stats = registry.stats();
        assert_eq!(stats.bucket_count, 2);
        assert_eq!(stats.record_count, 3);
        assert_eq!(stats.upserts, 2);
        assert_eq!(stats.queries, 2);
        assert_eq!(stats.log_bytes, 0);
    }
}
