//! Reference colors for naming decoded RGBA values

/// Name returned for any color whose alpha byte is zero
pub const TRANSPARENT_NAME: &str = "Clear/Transparent";

/// Source of human-readable color names
pub trait ColorPalette {
    /// Name of the reference color closest to `rgb`
    fn nearest(&self, rgb: [u8; 3]) -> &str;
}

/// Named color used by [`TablePalette`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedColor {
    pub name: &'static str,
    pub rgb: [u8; 3],
}

const fn c(name: &'static str, hex: u32) -> NamedColor {
    NamedColor {
        name,
        rgb: [(hex >> 16) as u8, (hex >> 8) as u8, hex as u8],
    }
}

/// Colors of the vendor's filament catalogue plus generic fallbacks
pub const DEFAULT_COLORS: &[NamedColor] = &[
    c("Jade White", 0xFFFFFF),
    c("Black", 0x000000),
    c("Gray", 0x8E9089),
    c("Light Gray", 0xD1D3D5),
    c("Silver", 0xA6A9AA),
    c("Red", 0xC12E1F),
    c("Maroon Red", 0x9D2235),
    c("Magenta", 0xEC008C),
    c("Pink", 0xF55A74),
    c("Hot Pink", 0xF5547C),
    c("Orange", 0xFF6A13),
    c("Pumpkin Orange", 0xFF8E16),
    c("Yellow", 0xF4EE2A),
    c("Sunflower Yellow", 0xFEC600),
    c("Gold", 0xE4BD68),
    c("Beige", 0xF7E6DE),
    c("Bronze", 0x847D48),
    c("Brown", 0x9D432C),
    c("Cocoa Brown", 0x6F5034),
    c("Bright Green", 0xBECF00),
    c("Bambu Green", 0x00AE42),
    c("Mistletoe Green", 0x3F8E43),
    c("Dark Green", 0x164B35),
    c("Cyan", 0x0086D6),
    c("Turquoise", 0x00B1B7),
    c("Blue", 0x0A2989),
    c("Cobalt Blue", 0x0056B8),
    c("Blue Gray", 0x5B6579),
    c("Indigo Purple", 0x482960),
    c("Purple", 0x5E43B7),
    c("Lilac Purple", 0xAE96D4),
];

/// Palette backed by a static table; nearest match by squared RGB distance
#[derive(Debug, Clone, Copy)]
pub struct TablePalette {
    colors: &'static [NamedColor],
}

impl TablePalette {
    pub const fn new(colors: &'static [NamedColor]) -> Self {
        Self { colors }
    }
}

impl Default for TablePalette {
    fn default() -> Self {
        Self::new(DEFAULT_COLORS)
    }
}

impl ColorPalette for TablePalette {
    fn nearest(&self, rgb: [u8; 3]) -> &str {
        self.colors
            .iter()
            .min_by_key(|color| distance(color.rgb, rgb))
            .map(|color| color.name)
            .unwrap_or("Unknown")
    }
}

fn distance(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = i32::from(*x) - i32::from(*y);
            (d * d) as u32
        })
        .sum()
}

/// Display name for an RGBA color
///
/// A zero alpha byte always means a clear filament, whatever the RGB bytes say.
pub fn color_name(palette: &dyn ColorPalette, rgba: [u8; 4]) -> String {
    if rgba[3] == 0x00 {
        return TRANSPARENT_NAME.to_string();
    }
    palette.nearest([rgba[0], rgba[1], rgba[2]]).to_string()
}
