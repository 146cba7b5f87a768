//! # geocell-types
//!
//! Value types shared by the geocell registry and its callers.
//!
//! - **Records**: `Record`, `EntityCode`
//! - **Queries**: `QueryWindow`, `QueryResult`
//! - **Events**: `DataUpdated`
//!
//! All types are serializable with Serde.
//!
//! ## Examples
//!
//! ```rust
//! use geocell_types::record::{EntityCode, Record};
//!
//! let record = Record {
//!     id: 1,
//!     geohash: "s2fd125".into(),
//!     min_height: 90,
//!     max_height: 200,
//!     start_time: 1_700_000_000,
//!     end_time: 1_700_086_400,
//!     url: "example1.com".into(),
//!     entity: EntityCode::new(1).unwrap(),
//! };
//! assert_eq!(record.duration_secs(), 86_400);
//! ```

pub mod event;
pub mod query;
pub mod record;

pub use event::DataUpdated;
pub use query::{QueryResult, QueryWindow};
pub use record::{EntityCode, Record, RecordId};
