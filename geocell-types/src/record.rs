use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied record identifier; the replace-vs-insert key.
pub type RecordId = u64;

/// Classification code attached to every record.
///
/// Codes form a closed set (`EntityCode::MIN..=EntityCode::MAX`); anything
/// outside it is rejected at construction and on deserialization.
///
/// # Examples
///
/// ```
/// use geocell_types::record::EntityCode;
///
/// let code = EntityCode::new(2).unwrap();
/// assert_eq!(code.get(), 2);
///
/// assert!(EntityCode::new(0).is_err());
/// assert!(EntityCode::new(4).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct EntityCode(u8);

impl EntityCode {
    /// Smallest recognized code.
    pub const MIN: u8 = 1;
    /// Largest recognized code.
    pub const MAX: u8 = 3;

    pub fn new(code: u8) -> Result<Self, InvalidEntityCode> {
        if Self::is_valid(code) {
            Ok(Self(code))
        } else {
            Err(InvalidEntityCode(code))
        }
    }

    /// Whether `code` belongs to the recognized set.
    pub const fn is_valid(code: u8) -> bool {
        code >= Self::MIN && code <= Self::MAX
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// Iterate over every recognized code in ascending order.
    pub fn all() -> impl Iterator<Item = EntityCode> {
        (Self::MIN..=Self::MAX).map(EntityCode)
    }
}

impl TryFrom<u8> for EntityCode {
    type Error = InvalidEntityCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::new(code)
    }
}

impl From<EntityCode> for u8 {
    fn from(code: EntityCode) -> Self {
        code.0
    }
}

impl fmt::Display for EntityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returned when a code falls outside the recognized entity set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidEntityCode(pub u8);

impl fmt::Display for InvalidEntityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entity code {} outside recognized range [{}, {}]",
            self.0,
            EntityCode::MIN,
            EntityCode::MAX
        )
    }
}

impl std::error::Error for InvalidEntityCode {}

/// A polygon record scoped to one geohash cell, a vertical extent and a
/// validity window.
///
/// Heights are meters, times are Unix seconds. A well-formed record has
/// `min_height <= max_height` and `start_time < end_time`; the registry
/// enforces this on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub geohash: String,
    pub min_height: i64,
    pub max_height: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub url: String,
    pub entity: EntityCode,
}

impl Record {
    /// Vertical extent in meters.
    pub fn height_span(&self) -> i64 {
        self.max_height.saturating_sub(self.min_height)
    }

    /// Length of the validity window in seconds.
    pub fn duration_secs(&self) -> i64 {
        self.end_time.saturating_sub(self.start_time)
    }

    /// Copy of this record placed under another geohash.
    pub fn with_geohash(&self, geohash: impl Into<String>) -> Self {
        Self {
            geohash: geohash.into(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record {
            id: 7,
            geohash: "g1".into(),
            min_height: 100,
            max_height: 200,
            start_time: 1_000,
            end_time: 2_000,
            url: "u".into(),
            entity: EntityCode::new(1).unwrap(),
        }
    }

    #[test]
    fn test_entity_code_bounds() {
        assert!(EntityCode::new(1).is_ok());
        assert!(EntityCode::new(3).is_ok());
        assert_eq!(EntityCode::new(0), Err(InvalidEntityCode(0)));
        assert_eq!(EntityCode::new(255), Err(InvalidEntityCode(255)));
        assert_eq!(EntityCode::all().count(), 3);
    }

    #[test]
    fn test_entity_code_rejected_on_deserialize() {
        let ok: EntityCode = serde_json::from_str("2").unwrap();
        assert_eq!(ok.get(), 2);
        assert!(serde_json::from_str::<EntityCode>("9").is_err());
    }

    #[test]
    fn test_record_json_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["minHeight"], 100);
        assert_eq!(json["endTime"], 2_000);
        assert_eq!(json["entity"], 1);
    }

    #[test]
    fn test_with_geohash_copies_fields() {
        let copy = sample().with_geohash("g2");
        assert_eq!(copy.geohash, "g2");
        assert_eq!(copy.id, 7);
        assert_eq!(copy.height_span(), 100);
        assert_eq!(copy.duration_secs(), 1_000);
    }
}
