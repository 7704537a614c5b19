//! spooltag Prelude
//!
//! The prelude module provides a convenient way to import commonly used types and traits.
//!
//! # Example
//!
//! ```rust
//! use spooltag::prelude::*;
//! use std::sync::Arc;
//!
//! let pipeline = ScanPipeline::new(Arc::new(KeyDerivationCache::new(8)), ScanConfig::default());
//! let mut tag = MemoryTag::new(vec![0x04, 0xa1, 0xb2, 0xc3, 0xd4, 0xe5, 0xf6]);
//! let report = pipeline.run(&mut tag, &mut NoopObserver);
//! assert!(report.result.filament().is_some());
//! ```

// Keys and caching
pub use crate::cache::{CacheStats, KeyDerivationCache};
pub use crate::keys::{derive, try_derive, DerivedKeySet, KeyType, SectorKey, SectorKeyPair, TagUid};

// Transport boundary
pub use crate::session::{MemoryTag, TagSession, TransportError};

// Scanning
pub use crate::auth::{AuthenticationOutcome, RawBlockTable, SectorAuthenticator};
pub use crate::config::{KeyOrder, ScanConfig};
pub use crate::observer::{EventLog, NoopObserver, ScanEvent, ScanObserver, ScanPhase};
pub use crate::pipeline::{
    DecryptedScanResult, RawEncryptedRecord, ScanPipeline, ScanReport, ScanResult,
};

// Decoding
pub use crate::filament::{FilamentColor, FilamentInfo, ProductionDate};
pub use crate::interpret::{BlockInterpreter, DecodeFieldError};
pub use crate::palette::{ColorPalette, TablePalette};

pub use crate::error::SpoolTagError;
