//! Tag transport boundary
//!
//! The core never talks to a reader directly. Platforms implement
//! [`TagSession`] over their NFC stack; [`MemoryTag`] replays a captured dump
//! with the card's access rules so scans can be exercised without hardware.

use crate::keys::{self, KeyType, SectorKey, KEY_LEN, SECTOR_COUNT};
use thiserror::Error;

/// Bytes per block
pub const BLOCK_LEN: usize = 16;

/// Blocks per sector on a 1K card (three data blocks and the trailer)
pub const BLOCKS_PER_SECTOR: usize = 4;

/// Total blocks on a 1K card
pub const BLOCK_COUNT: usize = SECTOR_COUNT * BLOCKS_PER_SECTOR;

/// Size of a full card dump
pub const DUMP_LEN: usize = BLOCK_COUNT * BLOCK_LEN;

/// Default transport access bits for a trailer (`FF 07 80 69`)
const DEFAULT_ACCESS_BITS: [u8; 4] = [0xff, 0x07, 0x80, 0x69];

/// Factory default key of blank cards
pub const FACTORY_KEY: SectorKey = SectorKey::new([0xff; KEY_LEN]);

pub type Block = [u8; BLOCK_LEN];

/// Sector that holds `block`
pub fn sector_of(block: u8) -> u8 {
    block / BLOCKS_PER_SECTOR as u8
}

/// Index of the trailer block of `sector`
pub fn trailer_block(sector: u8) -> u8 {
    sector * BLOCKS_PER_SECTOR as u8 + (BLOCKS_PER_SECTOR as u8 - 1)
}

pub fn is_trailer(block: u8) -> bool {
    usize::from(block) % BLOCKS_PER_SECTOR == BLOCKS_PER_SECTOR - 1
}

/// Payload blocks of `sector`, trailer excluded
pub fn data_blocks(sector: u8) -> impl Iterator<Item = u8> {
    let first = sector * BLOCKS_PER_SECTOR as u8;
    first..trailer_block(sector)
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Tag lost: the card left the field")]
    TagLost,
    #[error("Transport timed out")]
    Timeout,
    #[error("Block {block} read before its sector was authenticated")]
    NotAuthenticated { block: u8 },
    #[error("Block {block} is out of range")]
    InvalidBlock { block: u8 },
    #[error("Transport I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether further commands in the same session are pointless
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, TransportError::TagLost)
    }
}

/// A connected tag accepting one command at a time
pub trait TagSession {
    /// Hardware UID of the tag in the field
    fn uid(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Authenticate `sector` with `key` in slot `key_type`
    ///
    /// `Ok(false)` means the card rejected the key.
    fn authenticate(
        &mut self,
        sector: u8,
        key_type: KeyType,
        key: &SectorKey,
    ) -> Result<bool, TransportError>;

    /// Read one 16-byte block of the currently authenticated sector
    fn read_block(&mut self, block: u8) -> Result<Block, TransportError>;

    /// Technology label recorded on captures
    fn technology(&self) -> &str {
        "MifareClassic"
    }
}

/// In-memory MIFARE Classic 1K card
///
/// Keys are checked against the trailer blocks, exactly as the card does, and
/// reads are only allowed in the last authenticated sector.
#[derive(Debug, Clone)]
pub struct MemoryTag {
    uid: Vec<u8>,
    blocks: Vec<Block>,
    authenticated: Option<u8>,
    commands: usize,
    lost_after: Option<usize>,
    auth_attempts: usize,
}

impl MemoryTag {
    /// Blank card for `uid` whose trailers carry the keys derived from it
    ///
    /// UIDs too short to derive from get factory-default trailers.
    pub fn new(uid: impl Into<Vec<u8>>) -> Self {
        let uid = uid.into();
        let mut tag = Self {
            blocks: vec![[0u8; BLOCK_LEN]; BLOCK_COUNT],
            uid,
            authenticated: None,
            commands: 0,
            lost_after: None,
            auth_attempts: 0,
        };
        tag.write_manufacturer_block();
        tag.with_derived_trailers()
    }

    /// Card holding `dump` verbatim, trailers included
    ///
    /// Dumps shorter than 1024 bytes are zero-filled; longer ones truncated.
    pub fn from_dump(uid: impl Into<Vec<u8>>, dump: &[u8]) -> Self {
        let mut blocks = vec![[0u8; BLOCK_LEN]; BLOCK_COUNT];
        for (slot, chunk) in blocks.iter_mut().zip(dump.chunks(BLOCK_LEN)) {
            slot[..chunk.len()].copy_from_slice(chunk);
        }
        Self {
            uid: uid.into(),
            blocks,
            authenticated: None,
            commands: 0,
            lost_after: None,
            auth_attempts: 0,
        }
    }

    /// Overwrite every trailer with the keys derived from this card's UID
    pub fn with_derived_trailers(mut self) -> Self {
        let derived = keys::derive(&self.uid);
        for sector in 0..SECTOR_COUNT as u8 {
            let (a, b) = derived
                .sector(sector)
                .map(|p| (p.key_a, p.key_b))
                .unwrap_or((FACTORY_KEY, FACTORY_KEY));
            self.set_sector_keys(sector, a, b);
        }
        self
    }

    fn trailer_mut(&mut self, sector: u8) -> Option<&mut Block> {
        if usize::from(sector) >= SECTOR_COUNT {
            return None;
        }
        self.blocks.get_mut(usize::from(trailer_block(sector)))
    }

    /// Replace the keys stored in the trailer of `sector`; out-of-range sectors are ignored
    pub fn set_sector_keys(&mut self, sector: u8, key_a: SectorKey, key_b: SectorKey) {
        let Some(trailer) = self.trailer_mut(sector) else {
            return;
        };
        trailer[..KEY_LEN].copy_from_slice(key_a.as_bytes());
        trailer[KEY_LEN..KEY_LEN + 4].copy_from_slice(&DEFAULT_ACCESS_BITS);
        trailer[KEY_LEN + 4..].copy_from_slice(key_b.as_bytes());
    }

    /// Builder form of [`set_sector_keys`](Self::set_sector_keys)
    pub fn with_sector_keys(mut self, sector: u8, key_a: SectorKey, key_b: SectorKey) -> Self {
        self.set_sector_keys(sector, key_a, key_b);
        self
    }

    /// Make one key slot of `sector` reject the derived key
    pub fn with_rejected_key(mut self, sector: u8, key_type: KeyType) -> Self {
        let range = match key_type {
            KeyType::A => 0..KEY_LEN,
            KeyType::B => KEY_LEN + 4..BLOCK_LEN,
        };
        if let Some(trailer) = self.trailer_mut(sector) {
            for byte in &mut trailer[range] {
                *byte ^= 0x5a;
            }
        }
        self
    }

    /// Make both key slots of every sector in `sectors` reject derived keys
    pub fn with_locked_sectors(mut self, sectors: impl IntoIterator<Item = u8>) -> Self {
        for sector in sectors {
            self = self
                .with_rejected_key(sector, KeyType::A)
                .with_rejected_key(sector, KeyType::B);
        }
        self
    }

    /// Store `data` in a payload block
    pub fn with_block(mut self, block: u8, data: Block) -> Self {
        if let Some(slot) = self.blocks.get_mut(usize::from(block)) {
            *slot = data;
        }
        self
    }

    /// Simulate the card leaving the field after `commands` commands
    pub fn lose_after(mut self, commands: usize) -> Self {
        self.lost_after = Some(commands);
        self
    }

    /// Number of authenticate commands received so far
    pub fn auth_attempts(&self) -> usize {
        self.auth_attempts
    }

    /// Full 1024-byte image of the card, trailers included
    pub fn dump(&self) -> Vec<u8> {
        self.blocks.concat()
    }

    fn write_manufacturer_block(&mut self) {
        let block0 = &mut self.blocks[0];
        let n = self.uid.len().min(BLOCK_LEN);
        block0[..n].copy_from_slice(&self.uid[..n]);
        if self.uid.len() == 4 {
            // BCC of a single-size UID
            block0[4] = self.uid.iter().fold(0, |acc, b| acc ^ b);
        }
    }

    fn step(&mut self) -> Result<(), TransportError> {
        self.commands += 1;
        match self.lost_after {
            Some(limit) if self.commands > limit => {
                self.authenticated = None;
                Err(TransportError::TagLost)
            }
            _ => Ok(()),
        }
    }
}

impl TagSession for MemoryTag {
    fn uid(&mut self) -> Result<Vec<u8>, TransportError> {
        self.step()?;
        Ok(self.uid.clone())
    }

    fn authenticate(
        &mut self,
        sector: u8,
        key_type: KeyType,
        key: &SectorKey,
    ) -> Result<bool, TransportError> {
        self.step()?;
        self.auth_attempts += 1;
        if usize::from(sector) >= SECTOR_COUNT {
            return Err(TransportError::InvalidBlock {
                block: sector.saturating_mul(BLOCKS_PER_SECTOR as u8),
            });
        }
        let trailer = &self.blocks[usize::from(trailer_block(sector))];
        let stored = match key_type {
            KeyType::A => &trailer[..KEY_LEN],
            KeyType::B => &trailer[KEY_LEN + 4..],
        };
        if stored == key.as_bytes() {
            self.authenticated = Some(sector);
            Ok(true)
        } else {
            self.authenticated = None;
            Ok(false)
        }
    }

    fn read_block(&mut self, block: u8) -> Result<Block, TransportError> {
        self.step()?;
        let data = self
            .blocks
            .get(usize::from(block))
            .copied()
            .ok_or(TransportError::InvalidBlock { block })?;
        if self.authenticated != Some(sector_of(block)) {
            return Err(TransportError::NotAuthenticated { block });
        }
        Ok(data)
    }
}
