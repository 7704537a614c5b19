//! Unified error type for the public API
//!
//! Scans themselves never fail; these errors come from the fallible helpers
//! around them (UID parsing, strict key derivation, configuration loading)
//! and from callers that want to lift a recorded problem into an error.
//!
//! # Example
//!
//! ```
//! use spooltag::{keys::TagUid, SpoolTagError};
//!
//! fn parse(uid: &str) -> Result<TagUid, SpoolTagError> {
//!     Ok(TagUid::from_hex(uid)?)
//! }
//!
//! assert!(parse("75886B1D").is_ok());
//! assert!(parse("not hex").unwrap_err().is_key_error());
//! ```

use thiserror::Error;

/// Unified error type for all spooltag operations
///
/// # Error Categories
///
/// - **Key**: UID validation or derivation errors
/// - **Transport**: errors reported by a tag session
/// - **Decode**: a field could not be decoded from its block
/// - **Config**: configuration parsing or validation errors
#[derive(Debug, Error)]
pub enum SpoolTagError {
    /// UID validation or key derivation error
    #[error("Key error: {0}")]
    Key(#[from] crate::keys::KeyDerivationError),

    /// Tag transport error
    #[error("Transport error: {0}")]
    Transport(#[from] crate::session::TransportError),

    /// Field decoding error
    #[error("Decode error: {0}")]
    Decode(#[from] crate::interpret::DecodeFieldError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl SpoolTagError {
    /// Returns true if scanning again may succeed
    ///
    /// A tag that left the field or timed out can simply be presented again.
    pub fn is_retryable(&self) -> bool {
        use crate::session::TransportError;
        matches!(
            self,
            Self::Transport(TransportError::TagLost | TransportError::Timeout)
        )
    }

    /// Returns a suggestion for resolving this error
    pub fn suggestion(&self) -> Option<&str> {
        use crate::keys::KeyDerivationError;
        use crate::session::TransportError;
        match self {
            Self::Transport(TransportError::TagLost) => {
                Some("Hold the spool against the reader until the scan completes")
            }
            Self::Transport(TransportError::Timeout) => Some("Reposition the tag and scan again"),
            Self::Key(KeyDerivationError::InvalidUid { .. }) => {
                Some("The UID read from the tag is truncated; scan again")
            }
            _ => None,
        }
    }

    pub fn is_key_error(&self) -> bool {
        matches!(self, Self::Key(_))
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
