//! Write-side validation of record fields.
//!
//! Every check here runs before the registry takes any mutation step, so a
//! rejected upsert never leaves partial state. Query windows are deliberately
//! not validated.

use crate::config::GeohashPolicy;
use crate::error::{RegistryError, Result};
use geocell_types::EntityCode;
use rustc_hash::FxHashSet;

/// Validates a vertical extent in meters.
///
/// # Examples
///
/// ```
/// use geocell::compute::validation::validate_height_range;
///
/// assert!(validate_height_range(100, 200).is_ok());
/// assert!(validate_height_range(150, 150).is_ok());
/// assert!(validate_height_range(200, 100).is_err());
/// ```
pub fn validate_height_range(min_height: i64, max_height: i64) -> Result<()> {
    if min_height > max_height {
        return Err(RegistryError::Validation(format!(
            "min height {} exceeds max height {}",
            min_height, max_height
        )));
    }
    Ok(())
}

/// Validates a validity window in Unix seconds. The window must not be empty.
///
/// # Examples
///
/// ```
/// use geocell::compute::validation::validate_time_window;
///
/// assert!(validate_time_window(0, 1).is_ok());
/// assert!(validate_time_window(5, 5).is_err());
/// assert!(validate_time_window(10, 5).is_err());
/// ```
pub fn validate_time_window(start_time: i64, end_time: i64) -> Result<()> {
    if start_time >= end_time {
        return Err(RegistryError::Validation(format!(
            "start time {} must be before end time {}",
            start_time, end_time
        )));
    }
    Ok(())
}

/// Validates an entity code against the recognized set.
pub fn validate_entity(code: u8) -> Result<EntityCode> {
    EntityCode::new(code).map_err(|e| RegistryError::Validation(e.to_string()))
}

/// Validates a set of geohash keys and collapses duplicates.
///
/// The returned keys keep the order of first occurrence.
///
/// # Examples
///
/// ```
/// use geocell::compute::validation::validate_geohash_set;
/// use geocell::config::GeohashPolicy;
///
/// let keys = validate_geohash_set(&["g1", "g2", "g1"], GeohashPolicy::Opaque).unwrap();
/// assert_eq!(keys, vec!["g1".to_string(), "g2".to_string()]);
///
/// let empty: [&str; 0] = [];
/// assert!(validate_geohash_set(&empty, GeohashPolicy::Opaque).is_err());
/// ```
pub fn validate_geohash_set<S: AsRef<str>>(
    geohashes: &[S],
    policy: GeohashPolicy,
) -> Result<Vec<String>> {
    if geohashes.is_empty() {
        return Err(RegistryError::Validation(
            "geohash set cannot be empty".into(),
        ));
    }

    let mut seen = FxHashSet::default();
    let mut unique = Vec::with_capacity(geohashes.len());

    for (idx, geohash) in geohashes.iter().enumerate() {
        let geohash = geohash.as_ref();
        policy.check(geohash).map_err(|e| match e {
            RegistryError::Validation(reason) => {
                RegistryError::Validation(format!("geohash at index {}: {}", idx, reason))
            }
            other => other,
        })?;

        if seen.insert(geohash) {
            unique.push(geohash.to_string());
        }
    }

    Ok(unique)
}
