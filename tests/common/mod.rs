//! Common fixtures for spooltag integration tests
//!
//! Builds in-memory tags laid out like a factory-programmed PLA spool.

#![allow(dead_code)]

use spooltag::MemoryTag;

/// UID of the reference tag
pub const TAG_UID: [u8; 4] = [0x75, 0x88, 0x6b, 0x1d];

/// UID of the second tag on the same reel
pub const TWIN_UID: [u8; 4] = [0x5a, 0x13, 0x9e, 0x42];

pub const TRAY_UID: &str = "TRAY001";

/// Left-aligned, NUL-padded text block
pub fn text_block(s: &str) -> [u8; 16] {
    let mut b = [0u8; 16];
    b[..s.len()].copy_from_slice(s.as_bytes());
    b
}

/// Tag content of a green PLA Basic spool with the given tray UID
pub fn pla_tag(uid: &[u8], tray_uid: &str) -> MemoryTag {
    let mut material = [0u8; 16];
    material[..6].copy_from_slice(b"A00-G1");
    material[8..13].copy_from_slice(b"GFA00");

    let mut color = [0u8; 16];
    color[..4].copy_from_slice(&[0x00, 0xAE, 0x42, 0xFF]);
    color[4..6].copy_from_slice(&1000u16.to_le_bytes());
    color[8..16].copy_from_slice(&1.75f64.to_le_bytes());

    let mut temps = [0u8; 16];
    for (i, v) in [55u16, 8, 1, 55, 230, 190].iter().enumerate() {
        temps[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
    }

    let mut nozzle = [0u8; 16];
    nozzle[12..16].copy_from_slice(&0.2f32.to_le_bytes());

    let mut width = [0u8; 16];
    width[4..6].copy_from_slice(&6625u16.to_le_bytes());

    let mut length = [0u8; 16];
    length[4..8].copy_from_slice(&330u32.to_le_bytes());

    MemoryTag::new(uid.to_vec())
        .with_block(1, material)
        .with_block(2, text_block("PLA"))
        .with_block(4, text_block("PLA Basic"))
        .with_block(5, color)
        .with_block(6, temps)
        .with_block(8, nozzle)
        .with_block(9, text_block(tray_uid))
        .with_block(10, width)
        .with_block(12, text_block("2024_03_18_09_41"))
        .with_block(13, text_block("20240318"))
        .with_block(14, length)
}
