//! Durable storage for committed upserts.
//!
//! The registry keeps all buckets in memory; with the `aof` feature every
//! committed upsert is also appended to a log that is replayed on open.

#[cfg(feature = "aof")]
mod aof;

#[cfg(feature = "aof")]
pub use aof::{LogEntry, PersistenceLog};
