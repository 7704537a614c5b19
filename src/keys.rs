//! UID-derived sector keys
//!
//! Filament tags are MIFARE Classic 1K cards whose sector keys are not stored
//! anywhere: they are recomputed from the card UID with HKDF-SHA256 (RFC 5869)
//! keyed by a fixed vendor salt. KeyA and KeyB use different `info` labels and
//! each expansion yields 96 bytes, which is cut into sixteen 6-byte keys, one
//! per sector starting at sector 0.
//!
//! # Example
//!
//! ```
//! use spooltag::keys::{derive, KeyType};
//!
//! let keys = derive(&[0x75, 0x88, 0x6b, 0x1d]);
//! assert_eq!(keys.len(), 16);
//! assert_eq!(keys.sector(0).unwrap().key(KeyType::A).to_hex(), "6e5b0ec6ef7c");
//! ```

use hkdf::Hkdf;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

/// Number of sectors on a MIFARE Classic 1K card
pub const SECTOR_COUNT: usize = 16;

/// Length of a MIFARE Classic sector key in bytes
pub const KEY_LEN: usize = 6;

/// Shortest UID accepted for derivation (single-size NUID)
pub const MIN_UID_LEN: usize = 4;

/// HKDF salt shared by every tag of this vendor
const MASTER_SALT: [u8; 16] = [
    0x9a, 0x75, 0x9c, 0xf2, 0xc4, 0xf7, 0xca, 0xff, 0x22, 0x2c, 0xb9, 0x76, 0x9b, 0x41, 0xbc, 0x96,
];

const INFO_KEY_A: &[u8] = b"RFID-A\0";
const INFO_KEY_B: &[u8] = b"RFID-B\0";

const OKM_LEN: usize = SECTOR_COUNT * KEY_LEN;

#[derive(Debug, Error, PartialEq)]
pub enum KeyDerivationError {
    #[error("Invalid tag UID: {len} bytes, at least {min} required")]
    InvalidUid { len: usize, min: usize },

    #[error("HKDF expand failed: {0}")]
    Expand(String),

    #[error("Invalid hex UID: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Hardware UID of one physical tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagUid(Vec<u8>);

impl TagUid {
    /// Wrap raw UID bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        TagUid(bytes.into())
    }

    /// Parse a hex UID, tolerating `:`, space and `-` separators (`"75:88:6B:1D"`)
    pub fn from_hex(s: &str) -> Result<Self, KeyDerivationError> {
        let cleaned: String = s
            .chars()
            .filter(|c| !matches!(c, ':' | ' ' | '-'))
            .collect();
        Ok(TagUid(hex::decode(cleaned)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the UID is long enough to derive keys from
    pub fn is_valid(&self) -> bool {
        self.0.len() >= MIN_UID_LEN
    }

    /// Upper-case hex without separators
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl fmt::Display for TagUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<&[u8]> for TagUid {
    fn from(bytes: &[u8]) -> Self {
        TagUid(bytes.to_vec())
    }
}

impl Serialize for TagUid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TagUid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TagUid::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// MIFARE Classic key slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    A,
    B,
}

impl KeyType {
    /// The other key slot
    pub fn other(self) -> Self {
        match self {
            KeyType::A => KeyType::B,
            KeyType::B => KeyType::A,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::A => f.write_str("A"),
            KeyType::B => f.write_str("B"),
        }
    }
}

/// A 6-byte sector key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectorKey([u8; KEY_LEN]);

impl SectorKey {
    pub const fn new(bytes: [u8; KEY_LEN]) -> Self {
        SectorKey(bytes)
    }

    /// Build a key from a slice, which must be exactly 6 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; KEY_LEN] = bytes.try_into().ok()?;
        Some(SectorKey(array))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; KEY_LEN]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// Keys are credentials; keep them out of casual debug output.
impl fmt::Debug for SectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SectorKey({:02x}****)", self.0[0])
    }
}

impl Serialize for SectorKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SectorKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        SectorKey::from_slice(&bytes)
            .ok_or_else(|| serde::de::Error::custom(format!("key must be {KEY_LEN} bytes")))
    }
}

/// KeyA/KeyB candidates for one sector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorKeyPair {
    pub sector: u8,
    pub key_a: SectorKey,
    pub key_b: SectorKey,
}

impl SectorKeyPair {
    pub fn key(&self, key_type: KeyType) -> &SectorKey {
        match key_type {
            KeyType::A => &self.key_a,
            KeyType::B => &self.key_b,
        }
    }
}

/// The sixteen key pairs of one tag, indexed by sector
///
/// Empty when derived from an invalid UID; otherwise always exactly
/// [`SECTOR_COUNT`] entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DerivedKeySet {
    pairs: Vec<SectorKeyPair>,
}

impl DerivedKeySet {
    /// An empty set, used when no keys could be derived
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn sector(&self, sector: u8) -> Option<&SectorKeyPair> {
        self.pairs.get(usize::from(sector))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectorKeyPair> {
        self.pairs.iter()
    }

    /// Every key in the set, KeyA and KeyB interleaved by sector
    pub fn all_keys(&self) -> impl Iterator<Item = &SectorKey> {
        self.pairs.iter().flat_map(|p| [&p.key_a, &p.key_b])
    }
}

/// Derive the sector keys for `uid`
///
/// UIDs shorter than [`MIN_UID_LEN`] yield an empty set so that a bad read
/// degrades into an authentication failure instead of an error.
pub fn derive(uid: &[u8]) -> DerivedKeySet {
    try_derive(uid).unwrap_or_default()
}

/// Derive the sector keys for `uid`, reporting why derivation is impossible
pub fn try_derive(uid: &[u8]) -> Result<DerivedKeySet, KeyDerivationError> {
    if uid.len() < MIN_UID_LEN {
        return Err(KeyDerivationError::InvalidUid {
            len: uid.len(),
            min: MIN_UID_LEN,
        });
    }

    let hk = Hkdf::<Sha256>::new(Some(&MASTER_SALT), uid);
    let mut okm_a = [0u8; OKM_LEN];
    let mut okm_b = [0u8; OKM_LEN];
    hk.expand(INFO_KEY_A, &mut okm_a)
        .map_err(|e| KeyDerivationError::Expand(e.to_string()))?;
    hk.expand(INFO_KEY_B, &mut okm_b)
        .map_err(|e| KeyDerivationError::Expand(e.to_string()))?;

    let pairs = okm_a
        .chunks_exact(KEY_LEN)
        .zip(okm_b.chunks_exact(KEY_LEN))
        .enumerate()
        .filter_map(|(sector, (a, b))| {
            Some(SectorKeyPair {
                sector: sector as u8,
                key_a: SectorKey::from_slice(a)?,
                key_b: SectorKey::from_slice(b)?,
            })
        })
        .collect();

    Ok(DerivedKeySet { pairs })
}
