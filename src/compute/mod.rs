//! Compute layer for query processing and validation.
//!
//! This module keeps the overlap algorithm and the write-side invariant
//! checks separate from bucket storage:
//! - `query`: closed-interval overlap filtering and result projection
//! - `validation`: record invariants enforced before any write

pub mod query;
pub mod validation;
