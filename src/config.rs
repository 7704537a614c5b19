//! Scan configuration
//!
//! ```
//! use spooltag::config::{KeyOrder, ScanConfig};
//!
//! let config = ScanConfig::from_json_str(r#"{"key_order": "key_a_first"}"#)?;
//! assert_eq!(config.key_order, KeyOrder::KeyAFirst);
//! assert_eq!(config.cache_capacity, 64);
//! # Ok::<(), spooltag::config::ConfigError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CACHE_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Which key slot the authenticator tries first for each sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyOrder {
    /// Start with whichever slot last succeeded in the current scan
    #[default]
    Adaptive,
    /// Always try KeyA, then KeyB
    KeyAFirst,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Maximum number of UIDs whose key sets are memoized
    pub cache_capacity: usize,
    pub key_order: KeyOrder,
    /// Technology label recorded on raw captures
    pub technology: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            key_order: KeyOrder::default(),
            technology: "MifareClassic".to_string(),
        }
    }
}

impl ScanConfig {
    /// Parse and validate a JSON config; missing fields take defaults
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: ScanConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "cache_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.technology.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "technology",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
