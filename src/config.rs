//! Configuration for the geocell registry.
//!
//! `Config` controls id scoping, geohash acceptance, capacity limits and the
//! durability of the append-only log. It round-trips through JSON (and TOML
//! with the `toml` feature).
use crate::error::{RegistryError, Result};
use serde::de::Error;
use serde::{Deserialize, Serialize};

/// Longest geohash key accepted under any policy.
pub const MAX_GEOHASH_LEN: usize = 64;

/// How far `id` uniqueness reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdScope {
    /// Ids are unique within one geohash bucket. The same id may appear in
    /// several buckets as independent records.
    #[default]
    PerBucket,
    /// An id names one polygon across the whole index. Upserting it places
    /// copies in exactly the named geohashes and drops copies elsewhere.
    Global,
}

/// Which geohash keys are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GeohashPolicy {
    /// Any non-empty key without NUL bytes up to `MAX_GEOHASH_LEN` bytes.
    #[default]
    Opaque,
    /// Additionally requires a decodable base32 geohash.
    Strict,
}

impl GeohashPolicy {
    /// Checks a geohash key against this policy.
    ///
    /// # Examples
    ///
    /// ```
    /// use geocell::config::GeohashPolicy;
    ///
    /// assert!(GeohashPolicy::Opaque.check("nonexistent").is_ok());
    /// assert!(GeohashPolicy::Strict.check("s2fd123").is_ok());
    /// assert!(GeohashPolicy::Strict.check("nonexistent").is_err());
    /// assert!(GeohashPolicy::Opaque.check("").is_err());
    /// ```
    pub fn check(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(RegistryError::Validation("geohash cannot be empty".into()));
        }

        if key.len() > MAX_GEOHASH_LEN {
            return Err(RegistryError::Validation(format!(
                "geohash exceeds {} bytes: {}",
                MAX_GEOHASH_LEN,
                key.len()
            )));
        }

        if key.contains('\0') {
            return Err(RegistryError::Validation(
                "geohash cannot contain null bytes".into(),
            ));
        }

        if *self == GeohashPolicy::Strict {
            geohash::decode(key).map_err(|e| {
                RegistryError::Validation(format!("malformed geohash '{}': {}", key, e))
            })?;
        }

        Ok(())
    }
}

/// Synchronization policy for the append-only log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    Never,
    #[default]
    EverySecond,
    Always,
}

/// File synchronization strategy (fsync vs fdatasync).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    All,
    Data,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub id_scope: IdScope,

    #[serde(default)]
    pub geohash_policy: GeohashPolicy,

    /// Upper bound on records held by a single bucket
    #[serde(default)]
    pub max_records_per_bucket: Option<usize>,

    /// Upper bound on distinct geohash buckets
    #[serde(default)]
    pub max_buckets: Option<usize>,

    #[serde(default)]
    pub sync_policy: SyncPolicy,

    #[serde(default)]
    pub sync_mode: SyncMode,
}

impl Config {
    pub fn with_id_scope(mut self, scope: IdScope) -> Self {
        self.id_scope = scope;
        self
    }

    pub fn with_geohash_policy(mut self, policy: GeohashPolicy) -> Self {
        self.geohash_policy = policy;
        self
    }

    pub fn with_max_records_per_bucket(mut self, limit: usize) -> Self {
        assert!(limit > 0, "Bucket capacity must be greater than zero");

        if limit > 10_000_000 {
            log::warn!(
                "Bucket capacity of {} is very large; a full bucket scan happens on every query.",
                limit
            );
        }

        self.max_records_per_bucket = Some(limit);
        self
    }

    pub fn with_max_buckets(mut self, limit: usize) -> Self {
        assert!(limit > 0, "Bucket limit must be greater than zero");
        self.max_buckets = Some(limit);
        self
    }

    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_records_per_bucket == Some(0) {
            return Err("Bucket capacity must be greater than zero".to_string());
        }

        if self.max_buckets == Some(0) {
            return Err("Bucket limit must be greater than zero".to_string());
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id_scope: IdScope::default(),
            geohash_policy: GeohashPolicy::default(),
            max_records_per_bucket: None,
            max_buckets: None,
            sync_policy: SyncPolicy::default(),
            sync_mode: SyncMode::default(),
        }
    }
}

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Number of geohash buckets holding at least one record
    pub bucket_count: usize,
    /// Total records across all buckets
    pub record_count: usize,
    /// Committed upsert calls
    pub upserts: u64,
    /// Answered queries
    pub queries: u64,
    /// Bytes in the append-only log, zero when in memory
    pub log_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.id_scope, IdScope::PerBucket);
        assert_eq!(config.geohash_policy, GeohashPolicy::Opaque);
        assert_eq!(config.sync_policy, SyncPolicy::EverySecond);
        assert_eq!(config.sync_mode, SyncMode::All);
        assert!(config.max_records_per_bucket.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default()
            .with_id_scope(IdScope::Global)
            .with_geohash_policy(GeohashPolicy::Strict)
            .with_max_records_per_bucket(16)
            .with_sync_policy(SyncPolicy::Always);

        let json = config.to_json().unwrap();
        let deserialized = Config::from_json(&json).unwrap();

        assert_eq!(deserialized.id_scope, IdScope::Global);
        assert_eq!(deserialized.geohash_policy, GeohashPolicy::Strict);
        assert_eq!(deserialized.max_records_per_bucket, Some(16));
        assert_eq!(deserialized.sync_policy, SyncPolicy::Always);
    }

    #[test]
    fn test_config_rejects_unknown_and_zero() {
        assert!(Config::from_json(r#"{"bogus": 1}"#).is_err());
        assert!(Config::from_json(r#"{"max_buckets": 0}"#).is_err());

        let partial = Config::from_json(r#"{"id_scope": "global"}"#).unwrap();
        assert_eq!(partial.id_scope, IdScope::Global);
        assert_eq!(partial.sync_policy, SyncPolicy::EverySecond);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_toml() {
        let config = Config::from_toml("geohash_policy = \"strict\"\n").unwrap();
        assert_eq!(config.geohash_policy, GeohashPolicy::Strict);
        let text = config.to_toml().unwrap();
        assert!(text.contains("strict"));
    }

    #[test]
    fn test_geohash_policy_limits() {
        let long = "s".repeat(MAX_GEOHASH_LEN + 1);
        assert!(GeohashPolicy::Opaque.check(&long).is_err());
        assert!(GeohashPolicy::Opaque.check("a\0b").is_err());
        assert!(GeohashPolicy::Opaque.check("g1").is_ok());
        // 'a', 'i', 'l' and 'o' are outside the geohash alphabet
        assert!(GeohashPolicy::Strict.check("ail").is_err());
        assert!(GeohashPolicy::Strict.check("s2fd125").is_ok());
    }
}
