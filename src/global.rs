//! Process-wide registry.
//!
//! Some hosts want one registry per process rather than threading a handle
//! through every call site. The instance must be initialized explicitly
//! before use and lives until the process exits.

use crate::builder::RegistryBuilder;
use crate::db::Registry;
use crate::error::{RegistryError, Result};
use once_cell::sync::OnceCell;

static GLOBAL: OnceCell<Registry> = OnceCell::new();

/// Install `registry` as the process-wide instance.
///
/// Fails with `RegistryError::Config` if an instance is already installed.
pub fn install(registry: Registry) -> Result<&'static Registry> {
    GLOBAL
        .set(registry)
        .map_err(|_| RegistryError::Config("global registry already initialized".into()))?;
    GLOBAL
        .get()
        .ok_or_else(|| RegistryError::Config("global registry missing after install".into()))
}

/// Build a registry from `builder` and install it as the process-wide instance.
pub fn init(builder: RegistryBuilder) -> Result<&'static Registry> {
    if GLOBAL.get().is_some() {
        return Err(RegistryError::Config(
            "global registry already initialized".into(),
        ));
    }
    install(builder.build()?)
}

/// The process-wide instance, if initialized.
pub fn get() -> Option<&'static Registry> {
    GLOBAL.get()
}
