pub mod auth;
pub mod cache;
pub mod config;
mod error;
pub mod filament;
pub mod interpret;
pub mod keys;
pub mod observer;
pub mod palette;
pub mod pipeline;
pub mod prelude;
pub mod session;

pub use auth::{AuthenticationOutcome, RawBlockTable, SectorAuthenticator};
pub use cache::{CacheStats, KeyDerivationCache};
pub use config::{KeyOrder, ScanConfig};
pub use error::SpoolTagError;
pub use filament::{FilamentColor, FilamentInfo, ProductionDate};
pub use interpret::{BlockInterpreter, DecodeFieldError};
pub use keys::{DerivedKeySet, KeyType, SectorKey, SectorKeyPair, TagUid};
pub use observer::{EventLog, NoopObserver, ScanEvent, ScanObserver, ScanPhase};
pub use palette::{ColorPalette, TablePalette};
pub use pipeline::{DecryptedScanResult, RawEncryptedRecord, ScanPipeline, ScanReport, ScanResult};
pub use session::{MemoryTag, TagSession, TransportError};
