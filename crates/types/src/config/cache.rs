//! Top-level cache configuration.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ConfigError, GcConfig};

const fn default_sync_on_commit() -> bool {
    true
}

/// Configuration for opening a target cache.
///
/// # Example
///
/// ```no_run
/// # use synccache_types::config::CacheConfig;
/// let config = CacheConfig::builder()
///     .path("/var/lib/app/targets.db".into())
///     .build()
///     .expect("valid cache config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CacheConfig {
    /// Location of the durable store image. `None` keeps the cache in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Whether every commit is fsynced before it becomes visible.
    #[serde(default = "default_sync_on_commit")]
    pub sync_on_commit: bool,
    /// Collection-pass policy.
    #[serde(default)]
    pub gc: GcConfig,
}

#[bon::bon]
impl CacheConfig {
    /// Creates a new cache configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `path` is set but empty, or if
    /// the nested [`GcConfig`] is invalid.
    #[builder]
    pub fn new(
        path: Option<PathBuf>,
        #[builder(default = default_sync_on_commit())] sync_on_commit: bool,
        #[builder(default)] gc: GcConfig,
    ) -> Result<Self, ConfigError> {
        let config = Self { path, sync_on_commit, gc };
        config.validate()?;
        Ok(config)
    }
}

impl CacheConfig {
    /// Validates the configuration values, including the nested GC policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_ref().is_some_and(|path| path.as_os_str().is_empty()) {
            return Err(ConfigError::Validation {
                message: "path must not be empty when set".to_string(),
            });
        }
        self.gc.validate()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { path: None, sync_on_commit: default_sync_on_commit(), gc: GcConfig::default() }
    }
}
