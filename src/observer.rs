//! Scan progress reporting
//!
//! The pipeline is synchronous; callers that drive a UI pass an observer and
//! forward events to whatever runtime they use.

use crate::keys::KeyType;
use serde::Serialize;

/// Phase of a scan, in the order they occur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    ReadingUid,
    ResolvingKeys,
    Authenticating,
    Interpreting,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Phase {
        phase: ScanPhase,
    },
    SectorAuthenticated {
        sector: u8,
        key_type: KeyType,
        blocks_read: u8,
    },
    SectorFailed {
        sector: u8,
    },
}

pub trait ScanObserver {
    fn on_event(&mut self, event: &ScanEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ScanObserver for NoopObserver {
    fn on_event(&mut self, _event: &ScanEvent) {}
}

/// Records events in order
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    pub events: Vec<ScanEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phases(&self) -> Vec<ScanPhase> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Phase { phase } => Some(*phase),
                _ => None,
            })
            .collect()
    }
}

impl ScanObserver for EventLog {
    fn on_event(&mut self, event: &ScanEvent) {
        self.events.push(event.clone());
    }
}
