//! Decoded filament metadata

use crate::keys::TagUid;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Layout of the production date string, e.g. `2024_03_18_09_41`
pub const PRODUCTION_DATE_FORMAT: &str = "%Y_%m_%d_%H_%M";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilamentColor {
    /// `#RRGGBBAA`
    pub hex: String,
    pub rgba: [u8; 4],
    /// Alpha byte is zero
    pub transparent: bool,
    pub name: String,
}

impl FilamentColor {
    pub fn new(rgba: [u8; 4], name: impl Into<String>) -> Self {
        Self {
            hex: format!(
                "#{:02X}{:02X}{:02X}{:02X}",
                rgba[0], rgba[1], rgba[2], rgba[3]
            ),
            rgba,
            transparent: rgba[3] == 0,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionDate {
    /// Text exactly as stored on the tag
    pub raw: String,
    /// `None` when the text does not follow [`PRODUCTION_DATE_FORMAT`]
    pub parsed: Option<NaiveDateTime>,
}

impl ProductionDate {
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            parsed: NaiveDateTime::parse_from_str(raw, PRODUCTION_DATE_FORMAT).ok(),
        }
    }
}

/// Everything decoded from one tag
///
/// Every field is optional: a sector that could not be authenticated leaves
/// the fields it holds empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilamentInfo {
    pub tag_uid: TagUid,
    /// Shared by both tags of a reel
    pub tray_uid: Option<String>,
    pub material_variant_id: Option<String>,
    pub material_id: Option<String>,
    pub filament_type: Option<String>,
    pub detailed_filament_type: Option<String>,
    pub color: Option<FilamentColor>,
    /// Additional colors of multi-color filaments
    pub secondary_colors: Vec<FilamentColor>,
    pub spool_weight_g: Option<u16>,
    pub filament_diameter_mm: Option<f64>,
    pub filament_length_m: Option<u32>,
    pub production_date: Option<ProductionDate>,
    pub min_nozzle_temp_c: Option<u16>,
    pub max_nozzle_temp_c: Option<u16>,
    pub bed_temp_c: Option<u16>,
    pub bed_temp_type: Option<u16>,
    pub drying_temp_c: Option<u16>,
    pub drying_time_h: Option<u16>,
    pub nozzle_diameter_mm: Option<f32>,
    pub spool_width_mm: Option<f32>,
    /// Undocumented blocks kept verbatim as hex
    pub reserved_blocks: BTreeMap<u8, String>,
}

impl FilamentInfo {
    pub(crate) fn empty(tag_uid: TagUid) -> Self {
        Self {
            tag_uid,
            ..Self::default()
        }
    }

    /// Whether both tags come from the same reel
    ///
    /// Compares decoded tray UID text; tags without a tray UID never match.
    pub fn same_reel(&self, other: &FilamentInfo) -> bool {
        match (&self.tray_uid, &other.tray_uid) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Short label such as `PLA Basic (Bambu Green)`
    pub fn display_name(&self) -> String {
        let kind = self
            .detailed_filament_type
            .as_deref()
            .or(self.filament_type.as_deref())
            .unwrap_or("Unknown filament");
        match &self.color {
            Some(color) => format!("{} ({})", kind, color.name),
            None => kind.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_tray(tray: Option<&str>) -> FilamentInfo {
        FilamentInfo {
            tray_uid: tray.map(String::from),
            ..FilamentInfo::empty(TagUid::new(vec![1, 2, 3, 4]))
        }
    }

    #[test]
    fn test_same_reel_by_text() {
        assert!(with_tray(Some("TRAY001")).same_reel(&with_tray(Some("TRAY001"))));
        assert!(!with_tray(Some("TRAY001")).same_reel(&with_tray(Some("TRAY002"))));
        assert!(!with_tray(None).same_reel(&with_tray(None)));
    }

    #[test]
    fn test_color_hex() {
        let color = FilamentColor::new([0x00, 0xAE, 0x42, 0xFF], "Bambu Green");
        assert_eq!(color.hex, "#00AE42FF");
        assert!(!color.transparent);
    }

    #[test]
    fn test_production_date() {
        let date = ProductionDate::parse("2024_03_18_09_41");
        assert_eq!(
            date.parsed.unwrap().format("%Y-%m-%d %H:%M").to_string(),
            "2024-03-18 09:41"
        );
        assert!(ProductionDate::parse("soon").parsed.is_none());
    }

    #[test]
    fn test_display_name() {
        let mut info = with_tray(None);
        assert_eq!(info.display_name(), "Unknown filament");
        info.filament_type = Some("PLA".into());
        info.color = Some(FilamentColor::new([0, 0, 0, 0xFF], "Black"));
        assert_eq!(info.display_name(), "PLA (Black)");
    }
}
