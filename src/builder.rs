//! Registry builder for flexible configuration
//!
//! This module provides a builder pattern for creating registries with a
//! custom log path and configuration.

use crate::config::{Config, GeohashPolicy, IdScope};
use crate::db::Registry;
use crate::error::Result;
use std::path::PathBuf;

/// Builder for registry configuration with optional persistence.
#[derive(Debug)]
pub struct RegistryBuilder {
    path: Option<PathBuf>,
    config: Config,
    in_memory: bool,
}

impl RegistryBuilder {
    /// Create a new builder with default in-memory configuration.
    pub fn new() -> Self {
        Self {
            path: None,
            config: Config::default(),
            in_memory: true,
        }
    }

    /// Set the path of the append-only log.
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self.in_memory = false;
        self
    }

    /// Configure for in-memory storage with no persistence.
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self.path = None;
        self
    }

    /// Set the registry configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn id_scope(mut self, scope: IdScope) -> Self {
        self.config = self.config.with_id_scope(scope);
        self
    }

    pub fn geohash_policy(mut self, policy: GeohashPolicy) -> Self {
        self.config = self.config.with_geohash_policy(policy);
        self
    }

    /// Build the registry, replaying the log when a path was given.
    pub fn build(self) -> Result<Registry> {
        match self.path {
            Some(path) if !self.in_memory => Registry::open_with_config(path, self.config),
            _ => Registry::memory_with_config(self.config),
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
