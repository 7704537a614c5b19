//! Block layout decoding
//!
//! Each field lives at a fixed offset of a fixed block. A block that was not
//! captured (its sector failed to authenticate) or holds garbage only costs
//! the fields stored in it; every other field is still decoded.
//!
//! | Block | Bytes | Field |
//! |---|---|---|
//! | 1 | 0–7, 8–15 | material variant id, material id (ASCII) |
//! | 2 | 0–15 | filament type (UTF-8) |
//! | 4 | 0–15 | detailed filament type (UTF-8) |
//! | 5 | 0–3, 4–5, 8–15 | RGBA, spool weight u16, diameter f64 |
//! | 6 | 0–11 | drying temp, drying time, bed type, bed temp, max/min nozzle (u16) |
//! | 8 | 12–15 | nozzle diameter f32 |
//! | 9 | 0–15 | tray UID (UTF-8) |
//! | 10 | 4–5 | spool width, hundredths of a mm |
//! | 12 | 0–15 | production date `YYYY_MM_DD_HH_MM` |
//! | 14 | 4–7 | filament length u32, meters |
//! | 16 | 0–7 | multi-color: format id, count, second color ABGR |
//! | 13, 17 | | kept verbatim |
//!
//! All integers and floats are little-endian.

use crate::auth::RawBlockTable;
use crate::filament::{FilamentColor, FilamentInfo, ProductionDate};
use crate::keys::TagUid;
use crate::palette::{color_name, ColorPalette, TablePalette};
use crate::session::Block;
use thiserror::Error;
use tracing::debug;

pub const BLOCK_MATERIAL: u8 = 1;
pub const BLOCK_FILAMENT_TYPE: u8 = 2;
pub const BLOCK_DETAILED_TYPE: u8 = 4;
pub const BLOCK_COLOR_WEIGHT_DIAMETER: u8 = 5;
pub const BLOCK_TEMPERATURES: u8 = 6;
pub const BLOCK_NOZZLE: u8 = 8;
pub const BLOCK_TRAY_UID: u8 = 9;
pub const BLOCK_SPOOL_WIDTH: u8 = 10;
pub const BLOCK_PRODUCTION_DATE: u8 = 12;
pub const BLOCK_FILAMENT_LENGTH: u8 = 14;
pub const BLOCK_MULTI_COLOR: u8 = 16;

/// Blocks captured for research but not decoded
pub const RESERVED_BLOCKS: [u8; 2] = [13, 17];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeFieldError {
    #[error("{field}: block {block} not read")]
    MissingBlock { field: &'static str, block: u8 },

    #[error("{field}: block {block} is not valid text: {reason}")]
    InvalidText {
        field: &'static str,
        block: u8,
        reason: String,
    },

    #[error("{field}: block {block} holds invalid value {value}")]
    InvalidValue {
        field: &'static str,
        block: u8,
        value: String,
    },
}

fn u16_at(block: &Block, offset: usize) -> u16 {
    u16::from_le_bytes([block[offset], block[offset + 1]])
}

fn u32_at(block: &Block, offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&block[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn f32_at(block: &Block, offset: usize) -> f32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&block[offset..offset + 4]);
    f32::from_le_bytes(bytes)
}

fn f64_at(block: &Block, offset: usize) -> f64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&block[offset..offset + 8]);
    f64::from_le_bytes(bytes)
}

/// NUL-padded UTF-8 text; `None` for a blank field
fn padded_text(bytes: &[u8]) -> Result<Option<String>, std::str::Utf8Error> {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    let text = std::str::from_utf8(&bytes[..end])?.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

/// Decoder from captured blocks to [`FilamentInfo`]
pub struct BlockInterpreter<'p> {
    palette: &'p dyn ColorPalette,
}

static DEFAULT_PALETTE: TablePalette = TablePalette::new(crate::palette::DEFAULT_COLORS);

impl Default for BlockInterpreter<'static> {
    fn default() -> Self {
        Self::new(&DEFAULT_PALETTE)
    }
}

impl<'p> BlockInterpreter<'p> {
    pub fn new(palette: &'p dyn ColorPalette) -> Self {
        Self { palette }
    }

    /// Decode every field the table covers; errors are returned as text
    pub fn interpret(&self, uid: &TagUid, blocks: &RawBlockTable) -> (FilamentInfo, Vec<String>) {
        let (info, errors) = self.decode(uid, blocks);
        (info, errors.iter().map(ToString::to_string).collect())
    }

    /// Decode every field the table covers, keeping structured errors
    pub fn decode(
        &self,
        uid: &TagUid,
        blocks: &RawBlockTable,
    ) -> (FilamentInfo, Vec<DecodeFieldError>) {
        let mut decoder = Decoder {
            blocks,
            errors: Vec::new(),
        };
        let mut info = FilamentInfo::empty(uid.clone());

        if let Some(b) = decoder.block("material", BLOCK_MATERIAL) {
            info.material_variant_id = decoder.ascii("material variant id", BLOCK_MATERIAL, &b[..8]);
            info.material_id = decoder.ascii("material id", BLOCK_MATERIAL, &b[8..]);
        }

        if let Some(b) = decoder.block("filament type", BLOCK_FILAMENT_TYPE) {
            info.filament_type = decoder.text("filament type", BLOCK_FILAMENT_TYPE, &b);
        }

        if let Some(b) = decoder.block("detailed filament type", BLOCK_DETAILED_TYPE) {
            info.detailed_filament_type =
                decoder.text("detailed filament type", BLOCK_DETAILED_TYPE, &b);
        }

        self.decode_color_block(&mut decoder, &mut info);

        if let Some(b) = decoder.block("temperatures", BLOCK_TEMPERATURES) {
            info.drying_temp_c = Some(u16_at(&b, 0));
            info.drying_time_h = Some(u16_at(&b, 2));
            info.bed_temp_type = Some(u16_at(&b, 4));
            info.bed_temp_c = Some(u16_at(&b, 6));
            info.max_nozzle_temp_c = Some(u16_at(&b, 8));
            info.min_nozzle_temp_c = Some(u16_at(&b, 10));
        }

        if let Some(b) = decoder.block("nozzle diameter", BLOCK_NOZZLE) {
            let nozzle = f32_at(&b, 12);
            if nozzle.is_finite() && nozzle > 0.0 {
                info.nozzle_diameter_mm = Some(nozzle);
            } else {
                decoder.invalid("nozzle diameter", BLOCK_NOZZLE, nozzle);
            }
        }

        // Text comparison only: blank or binary tray blocks must never match
        // each other as if they were the same reel.
        if let Some(b) = decoder.block("tray UID", BLOCK_TRAY_UID) {
            info.tray_uid = decoder.text("tray UID", BLOCK_TRAY_UID, &b);
        }

        if let Some(b) = decoder.block("spool width", BLOCK_SPOOL_WIDTH) {
            info.spool_width_mm = Some(f32::from(u16_at(&b, 4)) / 100.0);
        }

        if let Some(b) = decoder.block("production date", BLOCK_PRODUCTION_DATE) {
            if let Some(raw) = decoder.text("production date", BLOCK_PRODUCTION_DATE, &b) {
                let date = ProductionDate::parse(&raw);
                if date.parsed.is_none() {
                    decoder.invalid("production date", BLOCK_PRODUCTION_DATE, &raw);
                }
                info.production_date = Some(date);
            }
        }

        if let Some(b) = decoder.block("filament length", BLOCK_FILAMENT_LENGTH) {
            info.filament_length_m = Some(u32_at(&b, 4));
        }

        if let Some(b) = blocks.get(&BLOCK_MULTI_COLOR) {
            info.secondary_colors = self.secondary_colors(b);
        }

        for block in RESERVED_BLOCKS {
            if let Some(b) = blocks.get(&block) {
                info.reserved_blocks.insert(block, hex::encode_upper(b));
            }
        }

        debug!(
            uid = %uid,
            blocks = blocks.len(),
            errors = decoder.errors.len(),
            "interpreted tag"
        );
        (info, decoder.errors)
    }

    fn decode_color_block(&self, decoder: &mut Decoder<'_>, info: &mut FilamentInfo) {
        const BLOCK: u8 = BLOCK_COLOR_WEIGHT_DIAMETER;
        let Some(b) = decoder.block("color", BLOCK) else {
            decoder.missing("spool weight", BLOCK);
            decoder.missing("filament diameter", BLOCK);
            return;
        };

        let rgba = [b[0], b[1], b[2], b[3]];
        info.color = Some(FilamentColor::new(rgba, color_name(self.palette, rgba)));
        info.spool_weight_g = Some(u16_at(&b, 4));

        let diameter = f64_at(&b, 8);
        if diameter.is_finite() && diameter > 0.0 {
            info.filament_diameter_mm = Some(diameter);
        } else {
            decoder.invalid("filament diameter", BLOCK, diameter);
        }
    }

    fn secondary_colors(&self, b: &Block) -> Vec<FilamentColor> {
        let count = u16_at(b, 2);
        if count < 2 {
            return Vec::new();
        }
        // stored as ABGR
        let rgba = [b[7], b[6], b[5], b[4]];
        vec![FilamentColor::new(rgba, color_name(self.palette, rgba))]
    }
}

struct Decoder<'a> {
    blocks: &'a RawBlockTable,
    errors: Vec<DecodeFieldError>,
}

impl Decoder<'_> {
    fn block(&mut self, field: &'static str, block: u8) -> Option<Block> {
        let found = self.blocks.get(&block).copied();
        if found.is_none() {
            self.missing(field, block);
        }
        found
    }

    fn missing(&mut self, field: &'static str, block: u8) {
        self.errors
            .push(DecodeFieldError::MissingBlock { field, block });
    }

    fn invalid(&mut self, field: &'static str, block: u8, value: impl ToString) {
        self.errors.push(DecodeFieldError::InvalidValue {
            field,
            block,
            value: value.to_string(),
        });
    }

    fn text(&mut self, field: &'static str, block: u8, bytes: &[u8]) -> Option<String> {
        match padded_text(bytes) {
            Ok(text) => text,
            Err(e) => {
                self.errors.push(DecodeFieldError::InvalidText {
                    field,
                    block,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn ascii(&mut self, field: &'static str, block: u8, bytes: &[u8]) -> Option<String> {
        let text = self.text(field, block, bytes)?;
        if text.is_ascii() {
            Some(text)
        } else {
            self.errors.push(DecodeFieldError::InvalidText {
                field,
                block,
                reason: "non-ASCII characters".to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_block(s: &str) -> Block {
        let mut b = [0u8; 16];
        b[..s.len()].copy_from_slice(s.as_bytes());
        b
    }

    fn color_block(rgba: [u8; 4], weight: u16, diameter: f64) -> Block {
        let mut b = [0u8; 16];
        b[..4].copy_from_slice(&rgba);
        b[4..6].copy_from_slice(&weight.to_le_bytes());
        b[8..16].copy_from_slice(&diameter.to_le_bytes());
        b
    }

    fn uid() -> TagUid {
        TagUid::new(vec![0x75, 0x88, 0x6b, 0x1d])
    }

    fn interpret(blocks: &RawBlockTable) -> (FilamentInfo, Vec<String>) {
        BlockInterpreter::default().interpret(&uid(), blocks)
    }

    #[test]
    fn test_diameter_reads_full_double() {
        let mut blocks = RawBlockTable::new();
        blocks.insert(5, color_block([0, 0xAE, 0x42, 0xFF], 250, 1.75));
        let (info, _) = interpret(&blocks);
        assert_eq!(info.filament_diameter_mm, Some(1.75));
        assert_eq!(info.spool_weight_g, Some(250));
        assert_eq!(info.color.unwrap().name, "Bambu Green");
    }

    #[test]
    fn test_zero_diameter_is_an_error() {
        let mut blocks = RawBlockTable::new();
        blocks.insert(5, color_block([0, 0, 0, 0xFF], 1000, 0.0));
        let (info, errors) = interpret(&blocks);
        assert_eq!(info.filament_diameter_mm, None);
        assert!(errors.iter().any(|e| e.starts_with("filament diameter")));
        assert_eq!(info.spool_weight_g, Some(1000));
    }

    #[test]
    fn test_transparent_overrides_palette() {
        let mut blocks = RawBlockTable::new();
        blocks.insert(5, color_block([0xFF, 0xFF, 0xFF, 0x00], 250, 1.75));
        let (info, _) = interpret(&blocks);
        let color = info.color.unwrap();
        assert_eq!(color.name, "Clear/Transparent");
        assert!(color.transparent);
        assert_eq!(color.hex, "#FFFFFF00");
    }

    #[test]
    fn test_temperature_block_order() {
        let mut b = [0u8; 16];
        for (i, v) in [55u16, 8, 1, 60, 230, 190].iter().enumerate() {
            b[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
        }
        let mut blocks = RawBlockTable::new();
        blocks.insert(6, b);
        let (info, _) = interpret(&blocks);
        assert_eq!(info.drying_temp_c, Some(55));
        assert_eq!(info.drying_time_h, Some(8));
        assert_eq!(info.bed_temp_type, Some(1));
        assert_eq!(info.bed_temp_c, Some(60));
        assert_eq!(info.max_nozzle_temp_c, Some(230));
        assert_eq!(info.min_nozzle_temp_c, Some(190));
    }

    #[test]
    fn test_material_block_split() {
        let mut b = [0u8; 16];
        b[..6].copy_from_slice(b"A00-G1");
        b[8..13].copy_from_slice(b"GFA00");
        let mut blocks = RawBlockTable::new();
        blocks.insert(1, b);
        let (info, _) = interpret(&blocks);
        assert_eq!(info.material_variant_id.as_deref(), Some("A00-G1"));
        assert_eq!(info.material_id.as_deref(), Some("GFA00"));
    }

    #[test]
    fn test_tray_uid_is_text() {
        let mut blocks = RawBlockTable::new();
        blocks.insert(9, text_block("TRAY001"));
        let (a, _) = interpret(&blocks);
        blocks.insert(9, text_block("TRAY002"));
        let (b, _) = interpret(&blocks);
        assert_eq!(a.tray_uid.as_deref(), Some("TRAY001"));
        assert!(!a.same_reel(&b));
        assert!(a.same_reel(&a.clone()));
    }

    #[test]
    fn test_blank_tray_uid_never_matches() {
        let mut blocks = RawBlockTable::new();
        blocks.insert(9, [0u8; 16]);
        let (a, errors) = interpret(&blocks);
        assert_eq!(a.tray_uid, None);
        assert!(!a.same_reel(&a.clone()));
        assert!(!errors.iter().any(|e| e.starts_with("tray UID")));
    }

    #[test]
    fn test_invalid_utf8_is_reported() {
        let mut b = text_block("PLA");
        b[0] = 0xFF;
        let mut blocks = RawBlockTable::new();
        blocks.insert(2, b);
        let (info, errors) = interpret(&blocks);
        assert_eq!(info.filament_type, None);
        assert!(errors
            .iter()
            .any(|e| e.starts_with("filament type: block 2 is not valid text")));
    }

    #[test]
    fn test_production_date_and_length() {
        let mut length = [0u8; 16];
        length[4..8].copy_from_slice(&330u32.to_le_bytes());
        let mut blocks = RawBlockTable::new();
        blocks.insert(12, text_block("2024_03_18_09_41"));
        blocks.insert(14, length);
        let (info, errors) = interpret(&blocks);
        assert_eq!(info.filament_length_m, Some(330));
        let date = info.production_date.unwrap();
        assert_eq!(date.raw, "2024_03_18_09_41");
        assert!(date.parsed.is_some());
        assert!(!errors.iter().any(|e| e.starts_with("production date")));
    }

    #[test]
    fn test_unparseable_date_keeps_raw_text() {
        let mut blocks = RawBlockTable::new();
        blocks.insert(12, text_block("someday"));
        let (info, errors) = interpret(&blocks);
        assert_eq!(info.production_date.unwrap().raw, "someday");
        assert!(errors
            .contains(&"production date: block 12 holds invalid value someday".to_string()));
    }

    #[test]
    fn test_missing_blocks_reported_per_field() {
        let (info, errors) = interpret(&RawBlockTable::new());
        assert_eq!(info.tag_uid, uid());
        assert!(info.color.is_none());
        assert!(errors.contains(&"color: block 5 not read".to_string()));
        assert!(errors.contains(&"filament diameter: block 5 not read".to_string()));
        assert!(errors.contains(&"tray UID: block 9 not read".to_string()));
        assert!(errors.contains(&"filament length: block 14 not read".to_string()));
        // reserved and multi-color blocks are optional
        assert!(!errors.iter().any(|e| e.contains("block 13") || e.contains("block 16")));
    }

    #[test]
    fn test_reserved_blocks_verbatim() {
        let mut blocks = RawBlockTable::new();
        blocks.insert(13, [0xAB; 16]);
        blocks.insert(17, [0x01; 16]);
        let (info, _) = interpret(&blocks);
        assert_eq!(info.reserved_blocks[&13], "AB".repeat(16));
        assert_eq!(info.reserved_blocks[&17], "01".repeat(16));
    }

    #[test]
    fn test_secondary_color() {
        let mut b = [0u8; 16];
        b[2..4].copy_from_slice(&2u16.to_le_bytes());
        b[4..8].copy_from_slice(&[0xFF, 0x42, 0xAE, 0x00]);
        let mut blocks = RawBlockTable::new();
        blocks.insert(16, b);
        let (info, _) = interpret(&blocks);
        assert_eq!(info.secondary_colors.len(), 1);
        assert_eq!(info.secondary_colors[0].hex, "#00AE42FF");
    }

    #[test]
    fn test_nozzle_and_spool_width() {
        let mut nozzle = [0u8; 16];
        nozzle[12..16].copy_from_slice(&0.4f32.to_le_bytes());
        let mut width = [0u8; 16];
        width[4..6].copy_from_slice(&6625u16.to_le_bytes());
        let mut blocks = RawBlockTable::new();
        blocks.insert(8, nozzle);
        blocks.insert(10, width);
        let (info, _) = interpret(&blocks);
        assert_eq!(info.nozzle_diameter_mm, Some(0.4));
        assert!((info.spool_width_mm.unwrap() - 66.25).abs() < 1e-4);
    }
}
