//! Embedded geohash-keyed registry of height- and time-scoped polygon records.
//!
//! ## Features
//! - **Upserts**: insert-or-replace by id, applied atomically across any
//!   number of geohash buckets
//! - **Overlap queries**: closed-interval height and time overlap within one
//!   geohash, projected into parallel `urls`/`entity_numbers`/`ids` sequences
//! - **Events**: typed `DataUpdated` notifications after each committed write
//! - **Persistence**: append-only log replayed on open (`aof` feature)
//!
//! ```rust
//! use geocell::Registry;
//!
//! let registry = Registry::memory()?;
//! let t = 1_700_000_000;
//!
//! registry.input_data("s2fd123", 100, 200, t, t + 86_400, "example.com", 1, 7)?;
//!
//! let hit = registry.get_data("s2fd123", 150, 160, t, t + 3_600)?;
//! assert_eq!(hit.ids, vec![7]);
//!
//! let miss = registry.get_data("s2fd123", 300, 400, t, t + 3_600)?;
//! assert!(miss.is_empty());
//! # Ok::<(), geocell::RegistryError>(())
//! ```

pub mod builder;
pub mod compute;
pub mod config;
pub mod db;
pub mod error;
pub mod global;
pub mod storage;

pub use builder::RegistryBuilder;
pub use db::Registry;
pub use error::{RegistryError, Result};

pub use config::{Config, GeohashPolicy, IdScope, RegistryStats, SyncMode, SyncPolicy};

pub use db::{
    Bucket, DataListener, GeoCellIndex, SubscriptionId, UpsertReceipt, UpsertRequest,
    WriteOutcome,
};

pub use geocell_types::{DataUpdated, EntityCode, QueryResult, QueryWindow, Record, RecordId};

#[cfg(feature = "aof")]
pub use storage::{LogEntry, PersistenceLog};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{Registry, RegistryBuilder, RegistryError, Result};

    pub use crate::{Config, GeohashPolicy, IdScope, SyncPolicy};

    pub use crate::{DataListener, DataUpdated, SubscriptionId};

    pub use crate::{EntityCode, QueryResult, QueryWindow, Record, UpsertReceipt};
}
