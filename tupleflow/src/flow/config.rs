//! Flow configuration.

use crate::errors::InvalidOptionError;
use crate::fields::DEFAULT_DEDUP_SUFFIX;
use crate::observability::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for one flow assembly session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    /// Suffix appended to colliding join field names until they are unique.
    #[serde(default = "default_dedup_suffix")]
    pub dedup_suffix: String,
    /// Log every scope as it is installed.
    #[serde(default)]
    pub debug_scopes: bool,
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_dedup_suffix() -> String {
    DEFAULT_DEDUP_SUFFIX.to_string()
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            dedup_suffix: default_dedup_suffix(),
            debug_scopes: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl FlowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the join dedup suffix.
    #[must_use]
    pub fn with_dedup_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.dedup_suffix = suffix.into();
        self
    }

    /// Enables scope logging.
    #[must_use]
    pub fn with_debug_scopes(mut self, enabled: bool) -> Self {
        self.debug_scopes = enabled;
        self
    }

    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, InvalidOptionError> {
        serde_json::from_str(json)
            .map_err(|e| InvalidOptionError::new(format!("invalid flow configuration: {e}")))
    }

    /// Reads and parses a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InvalidOptionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            InvalidOptionError::new(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }
}
