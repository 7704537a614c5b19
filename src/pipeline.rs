//! End-to-end tag scan
//!
//! ```
//! use spooltag::{KeyDerivationCache, MemoryTag, NoopObserver, ScanConfig, ScanPipeline};
//! use std::sync::Arc;
//!
//! let cache = Arc::new(KeyDerivationCache::new(16));
//! let pipeline = ScanPipeline::new(cache, ScanConfig::default());
//!
//! let mut tag = MemoryTag::new(vec![0x75, 0x88, 0x6b, 0x1d]);
//! let report = pipeline.run(&mut tag, &mut NoopObserver);
//! assert!(report.result.is_success());
//! assert_eq!(report.raw.data.len(), 1024);
//! ```

use crate::auth::{AuthenticationOutcome, RawBlockTable, SectorAuthenticator};
use crate::cache::KeyDerivationCache;
use crate::config::ScanConfig;
use crate::filament::FilamentInfo;
use crate::interpret::BlockInterpreter;
use crate::keys::{KeyType, TagUid};
use crate::observer::{ScanEvent, ScanObserver, ScanPhase};
use crate::palette::{ColorPalette, TablePalette};
use crate::session::{TagSession, BLOCK_COUNT, BLOCK_LEN, DUMP_LEN};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Byte-level capture of a scan, kept for diagnostics and export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEncryptedRecord {
    pub scan_id: Uuid,
    pub uid: TagUid,
    /// 64 blocks × 16 bytes; blocks that were not read are zero
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Indices of the blocks present in `data`
    pub captured_blocks: Vec<u8>,
    pub technology: String,
    pub scan_duration: Duration,
    pub captured_at: DateTime<Utc>,
}

impl RawEncryptedRecord {
    pub fn block(&self, block: u8) -> Option<&[u8]> {
        if !self.captured_blocks.contains(&block) {
            return None;
        }
        let start = usize::from(block) * BLOCK_LEN;
        self.data.get(start..start + BLOCK_LEN)
    }
}

/// Authentication bookkeeping plus the captured payload blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedScanResult {
    pub scan_id: Uuid,
    pub uid: TagUid,
    pub blocks: RawBlockTable,
    pub authenticated_sectors: Vec<u8>,
    pub failed_sectors: Vec<u8>,
    pub key_types: BTreeMap<u8, KeyType>,
    pub outcomes: Vec<AuthenticationOutcome>,
    /// Transport and decode problems, in the order they occurred
    pub errors: Vec<String>,
}

/// Outcome of one scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanResult {
    /// At least one block was captured and interpreted
    Success {
        decrypted: DecryptedScanResult,
        filament: FilamentInfo,
    },
    /// No sector accepted a derived key
    AuthenticationFailed { decrypted: DecryptedScanResult },
    /// Sectors opened but no block could be read
    ParsingFailed {
        decrypted: DecryptedScanResult,
        reason: String,
    },
}

impl ScanResult {
    pub fn decrypted(&self) -> &DecryptedScanResult {
        match self {
            ScanResult::Success { decrypted, .. }
            | ScanResult::AuthenticationFailed { decrypted }
            | ScanResult::ParsingFailed { decrypted, .. } => decrypted,
        }
    }

    pub fn filament(&self) -> Option<&FilamentInfo> {
        match self {
            ScanResult::Success { filament, .. } => Some(filament),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScanResult::Success { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScanResult::Success { .. } => "success",
            ScanResult::AuthenticationFailed { .. } => "authentication_failed",
            ScanResult::ParsingFailed { .. } => "parsing_failed",
        }
    }
}

/// Everything one scan produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub raw: RawEncryptedRecord,
    pub result: ScanResult,
}

/// Runs UID → keys → authentication → interpretation
pub struct ScanPipeline {
    cache: Arc<KeyDerivationCache>,
    config: ScanConfig,
    palette: Arc<dyn ColorPalette + Send + Sync>,
}

impl ScanPipeline {
    pub fn new(cache: Arc<KeyDerivationCache>, config: ScanConfig) -> Self {
        Self {
            cache,
            config,
            palette: Arc::new(TablePalette::default()),
        }
    }

    /// Replace the palette used to name colors
    pub fn with_palette(mut self, palette: Arc<dyn ColorPalette + Send + Sync>) -> Self {
        self.palette = palette;
        self
    }

    pub fn cache(&self) -> &Arc<KeyDerivationCache> {
        &self.cache
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan the tag in `session`
    ///
    /// Never fails: transport problems end up in the result's error list and
    /// the result kind tells whether anything could be authenticated.
    pub fn run<S>(&self, session: &mut S, observer: &mut dyn ScanObserver) -> ScanReport
    where
        S: TagSession + ?Sized,
    {
        let started = Instant::now();
        let scan_id = Uuid::new_v4();
        let mut errors = Vec::new();

        observer.on_event(&ScanEvent::Phase {
            phase: ScanPhase::ReadingUid,
        });
        let uid = match session.uid() {
            Ok(bytes) => TagUid::new(bytes),
            Err(e) => {
                warn!(error = %e, "could not read tag UID");
                errors.push(format!("uid: {e}"));
                TagUid::default()
            }
        };

        observer.on_event(&ScanEvent::Phase {
            phase: ScanPhase::ResolvingKeys,
        });
        let keys = self.cache.get_or_derive(uid.as_bytes());
        if keys.is_empty() && !uid.is_empty() {
            errors.push(format!(
                "uid: {} bytes is too short to derive keys",
                uid.len()
            ));
        }

        observer.on_event(&ScanEvent::Phase {
            phase: ScanPhase::Authenticating,
        });
        let sectors =
            SectorAuthenticator::new(self.config.key_order).authenticate_all(&keys, session, observer);
        errors.extend(sectors.errors.iter().cloned());

        let raw = self.raw_record(scan_id, &uid, &sectors.blocks, session.technology(), started);

        let mut decrypted = DecryptedScanResult {
            scan_id,
            uid: uid.clone(),
            authenticated_sectors: sectors.authenticated_sectors(),
            failed_sectors: sectors.failed_sectors(),
            key_types: sectors.key_types(),
            outcomes: sectors.outcomes,
            blocks: sectors.blocks,
            errors,
        };

        let result = if decrypted.authenticated_sectors.is_empty() {
            warn!(uid = %uid, "no sector authenticated");
            ScanResult::AuthenticationFailed { decrypted }
        } else if decrypted.blocks.is_empty() {
            warn!(uid = %uid, "sectors authenticated but no block could be read");
            ScanResult::ParsingFailed {
                decrypted,
                reason: "no data block could be read".to_string(),
            }
        } else {
            observer.on_event(&ScanEvent::Phase {
                phase: ScanPhase::Interpreting,
            });
            let interpreter = BlockInterpreter::new(self.palette.as_ref());
            let (filament, decode_errors) = interpreter.interpret(&uid, &decrypted.blocks);
            decrypted.errors.extend(decode_errors);
            ScanResult::Success {
                decrypted,
                filament,
            }
        };

        observer.on_event(&ScanEvent::Phase {
            phase: ScanPhase::Finished,
        });
        info!(
            uid = %uid,
            result = result.kind(),
            authenticated = result.decrypted().authenticated_sectors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan finished"
        );

        ScanReport { raw, result }
    }

    fn raw_record(
        &self,
        scan_id: Uuid,
        uid: &TagUid,
        blocks: &RawBlockTable,
        technology: &str,
        started: Instant,
    ) -> RawEncryptedRecord {
        let mut data = vec![0u8; DUMP_LEN];
        for (block, bytes) in blocks {
            let start = usize::from(*block) * BLOCK_LEN;
            if usize::from(*block) < BLOCK_COUNT {
                data[start..start + BLOCK_LEN].copy_from_slice(bytes);
            }
        }
        if technology != self.config.technology {
            warn!(
                session = technology,
                configured = %self.config.technology,
                "session technology differs from configured label"
            );
        }
        RawEncryptedRecord {
            scan_id,
            uid: uid.clone(),
            data,
            captured_blocks: blocks.keys().copied().collect(),
            technology: self.config.technology.clone(),
            scan_duration: started.elapsed(),
            captured_at: Utc::now(),
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode_upper(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
