//! Sector authentication and block capture
//!
//! Sectors are processed strictly in order, one command in flight at a time.
//! A sector that rejects both derived keys, or whose commands fail in the
//! transport, is recorded as failed and the loop moves on; nothing here aborts
//! a scan.

use crate::config::KeyOrder;
use crate::keys::{DerivedKeySet, KeyType, SECTOR_COUNT};
use crate::observer::{ScanEvent, ScanObserver};
use crate::session::{data_blocks, Block, TagSession, TransportError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Payload blocks captured from authenticated sectors, keyed by block index
pub type RawBlockTable = BTreeMap<u8, Block>;

/// What happened when authenticating one sector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationOutcome {
    pub sector: u8,
    /// Key slot that opened the sector
    pub key_type: Option<KeyType>,
    pub elapsed: Duration,
    /// Both keys were rejected or the transport failed
    pub failed: bool,
    /// Authenticate commands issued for this sector
    pub attempts: u8,
    pub transport_error: Option<String>,
}

impl AuthenticationOutcome {
    fn failed(sector: u8, elapsed: Duration, attempts: u8, err: Option<&TransportError>) -> Self {
        Self {
            sector,
            key_type: None,
            elapsed,
            failed: true,
            attempts,
            transport_error: err.map(ToString::to_string),
        }
    }
}

/// Result of walking all sectors of one tag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectorScan {
    pub blocks: RawBlockTable,
    pub outcomes: Vec<AuthenticationOutcome>,
    /// Block read failures inside authenticated sectors
    pub errors: Vec<String>,
}

impl SectorScan {
    pub fn authenticated_sectors(&self) -> Vec<u8> {
        self.outcomes
            .iter()
            .filter(|o| !o.failed)
            .map(|o| o.sector)
            .collect()
    }

    pub fn failed_sectors(&self) -> Vec<u8> {
        self.outcomes
            .iter()
            .filter(|o| o.failed)
            .map(|o| o.sector)
            .collect()
    }

    pub fn key_types(&self) -> BTreeMap<u8, KeyType> {
        self.outcomes
            .iter()
            .filter_map(|o| o.key_type.map(|k| (o.sector, k)))
            .collect()
    }

    /// Total authenticate commands issued
    pub fn total_attempts(&self) -> usize {
        self.outcomes.iter().map(|o| usize::from(o.attempts)).sum()
    }
}

/// Authenticates every sector of a tag with its derived keys
#[derive(Debug, Clone, Copy, Default)]
pub struct SectorAuthenticator {
    key_order: KeyOrder,
}

impl SectorAuthenticator {
    pub fn new(key_order: KeyOrder) -> Self {
        Self { key_order }
    }

    /// Authenticate sectors 0–15 and read the payload blocks of each one
    /// that opens
    ///
    /// With [`KeyOrder::Adaptive`] each sector is first tried with the key slot
    /// that last succeeded, since a tag is normally provisioned uniformly.
    pub fn authenticate_all<S>(
        &self,
        keys: &DerivedKeySet,
        session: &mut S,
        observer: &mut dyn ScanObserver,
    ) -> SectorScan
    where
        S: TagSession + ?Sized,
    {
        let mut scan = SectorScan::default();
        let mut preferred = KeyType::A;
        let mut lost: Option<TransportError> = None;

        for sector in 0..SECTOR_COUNT as u8 {
            let started = Instant::now();

            let pair = match (keys.sector(sector), &lost) {
                (Some(pair), None) => pair,
                (_, lost) => {
                    scan.outcomes.push(AuthenticationOutcome::failed(
                        sector,
                        started.elapsed(),
                        0,
                        lost.as_ref(),
                    ));
                    observer.on_event(&ScanEvent::SectorFailed { sector });
                    continue;
                }
            };

            let first = match self.key_order {
                KeyOrder::Adaptive => preferred,
                KeyOrder::KeyAFirst => KeyType::A,
            };

            let mut attempts = 0u8;
            let mut opened = None;
            let mut last_error = None;
            for key_type in [first, first.other()] {
                attempts += 1;
                match session.authenticate(sector, key_type, pair.key(key_type)) {
                    Ok(true) => {
                        opened = Some(key_type);
                        break;
                    }
                    Ok(false) => {
                        debug!(sector, key_type = %key_type, "key rejected");
                    }
                    Err(e) => {
                        warn!(sector, key_type = %key_type, error = %e, "authenticate failed in transport");
                        let fatal = e.is_session_fatal();
                        last_error = Some(e);
                        if fatal {
                            break;
                        }
                    }
                }
            }

            let Some(key_type) = opened else {
                if let Some(e) = last_error.as_ref().filter(|e| e.is_session_fatal()) {
                    lost = Some(e.clone());
                }
                scan.outcomes.push(AuthenticationOutcome::failed(
                    sector,
                    started.elapsed(),
                    attempts,
                    last_error.as_ref(),
                ));
                observer.on_event(&ScanEvent::SectorFailed { sector });
                continue;
            };

            preferred = key_type;
            let mut blocks_read = 0u8;
            for block in data_blocks(sector) {
                match session.read_block(block) {
                    Ok(data) => {
                        scan.blocks.insert(block, data);
                        blocks_read += 1;
                    }
                    Err(e) => {
                        warn!(sector, block, error = %e, "block read failed");
                        scan.errors.push(format!("block {block}: read failed: {e}"));
                        if e.is_session_fatal() {
                            lost = Some(e);
                            break;
                        }
                    }
                }
            }

            scan.outcomes.push(AuthenticationOutcome {
                sector,
                key_type: Some(key_type),
                elapsed: started.elapsed(),
                failed: false,
                attempts,
                transport_error: None,
            });
            observer.on_event(&ScanEvent::SectorAuthenticated {
                sector,
                key_type,
                blocks_read,
            });
        }

        debug!(
            authenticated = scan.authenticated_sectors().len(),
            attempts = scan.total_attempts(),
            "sector pass complete"
        );
        scan
    }
}
