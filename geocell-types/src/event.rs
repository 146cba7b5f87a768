use crate::record::RecordId;
use serde::{Deserialize, Serialize};

/// Emitted once per geohash after an upsert commits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataUpdated {
    pub geohash: String,
    pub id: RecordId,
    /// True when an existing record with this id was replaced in place.
    pub replaced: bool,
}
