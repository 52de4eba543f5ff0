//! Collection-pass configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

const fn default_percentile_to_collect() -> u8 {
    10
}

const fn default_maximum_sequence_numbers_to_collect() -> usize {
    1000
}

/// Policy for one collection pass over the target cache.
///
/// The pass removes the oldest `percentile_to_collect` percent of sequence
/// numbers (targets plus orphaned documents), but never more than
/// `maximum_sequence_numbers_to_collect` of them.
///
/// # Example
///
/// ```no_run
/// # use synccache_types::config::GcConfig;
/// let config = GcConfig::builder()
///     .percentile_to_collect(20)
///     .build()
///     .expect("valid gc config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GcConfig {
    /// Percentage of sequence numbers to collect per pass (1-100).
    #[serde(default = "default_percentile_to_collect")]
    pub percentile_to_collect: u8,
    /// Upper bound on sequence numbers collected per pass. Must be >= 1.
    #[serde(default = "default_maximum_sequence_numbers_to_collect")]
    pub maximum_sequence_numbers_to_collect: usize,
}

#[bon::bon]
impl GcConfig {
    /// Creates a new collection configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if:
    /// - `percentile_to_collect` is outside 1-100
    /// - `maximum_sequence_numbers_to_collect` is zero
    #[builder]
    pub fn new(
        #[builder(default = default_percentile_to_collect())] percentile_to_collect: u8,
        #[builder(default = default_maximum_sequence_numbers_to_collect())]
        maximum_sequence_numbers_to_collect: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self { percentile_to_collect, maximum_sequence_numbers_to_collect };
        config.validate()?;
        Ok(config)
    }
}

impl GcConfig {
    /// Validates the configuration values.
    ///
    /// Call after deserialization to ensure values are within valid ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.percentile_to_collect == 0 || self.percentile_to_collect > 100 {
            return Err(ConfigError::Validation {
                message: format!(
                    "percentile_to_collect must be 1-100, got {}",
                    self.percentile_to_collect
                ),
            });
        }
        if self.maximum_sequence_numbers_to_collect == 0 {
            return Err(ConfigError::Validation {
                message: "maximum_sequence_numbers_to_collect must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            percentile_to_collect: default_percentile_to_collect(),
            maximum_sequence_numbers_to_collect: default_maximum_sequence_numbers_to_collect(),
        }
    }
}
