use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Record schema validation settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ValidationConfig {
    /// Whether records are validated against their stream's JSON schema.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum number of validations running concurrently. Records arriving while the pool is
    /// saturated are not validated.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Maximum number of distinct error messages kept per stream.
    #[serde(default = "default_max_errors_per_stream")]
    pub max_errors_per_stream: usize,
}

impl ValidationConfig {
    pub const DEFAULT_ENABLED: bool = true;

    pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

    pub const DEFAULT_MAX_ERRORS_PER_STREAM: usize = 10;

    /// Validates the schema validation settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.max_in_flight == 0 {
            return Err(ValidationError::invalid(
                "validation.max_in_flight",
                "must be greater than 0 when validation is enabled",
            ));
        }

        Ok(())
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_in_flight: default_max_in_flight(),
            max_errors_per_stream: default_max_errors_per_stream(),
        }
    }
}

fn default_enabled() -> bool {
    ValidationConfig::DEFAULT_ENABLED
}

fn default_max_in_flight() -> usize {
    ValidationConfig::DEFAULT_MAX_IN_FLIGHT
}

fn default_max_errors_per_stream() -> usize {
    ValidationConfig::DEFAULT_MAX_ERRORS_PER_STREAM
}
