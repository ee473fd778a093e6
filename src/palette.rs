//! Label colors and the fixed colors of the measurement overlay.

/// Fallback for labels missing from [`LABEL_COLORS`].
pub const FALLBACK_COLOR: &str = "#FF0000";

pub const LABEL_COLORS: &[(&str, &str)] = &[
    ("Cisternae Magna", "#FF5733"),
    ("Intracranial Translucency", "#33FF57"),
    ("Nuchal Translucency", "#3357FF"),
    ("Midbrain", "#F1C40F"),
    ("Nasal Bone", "#8E44AD"),
    ("Nasal Skin", "#E67E22"),
    ("Nasal Tip", "#2ECC71"),
    ("Palate", "#3498DB"),
    ("Thalami", "#E74C3C"),
];

/// Label whose color tints the segmentation mask overlay.
pub const MASK_LABEL: &str = "Nuchal Translucency";

pub const ENDPOINT_COLOR: Rgb = Rgb::new(0xFF, 0xFF, 0x00);
pub const SEGMENT_COLOR: Rgb = Rgb::new(0x33, 0x57, 0xFF);

pub fn color_for_label(label: &str) -> &'static str {
    LABEL_COLORS
        .iter()
        .find(|(name, _)| *name == label)
        .map_or(FALLBACK_COLOR, |(_, hex)| hex)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#RRGGBB` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn inverse(self) -> Self {
        Self::new(255 - self.r, 255 - self.g, 255 - self.b)
    }

    pub fn to_egui(self) -> egui::Color32 {
        egui::Color32::from_rgb(self.r, self.g, self.b)
    }
}

/// Resolves a stored color string, falling back to the label table.
pub fn resolve(color: &str, label: &str) -> Rgb {
    Rgb::from_hex(color)
        .or_else(|| Rgb::from_hex(color_for_label(label)))
        .unwrap_or(Rgb::new(255, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_labels() {
        assert_eq!(color_for_label("Midbrain"), "#F1C40F");
        assert_eq!(color_for_label("Spleen"), FALLBACK_COLOR);
    }

    #[test]
    fn hex_parsing_and_inverse() {
        let c = Rgb::from_hex("#3357FF").unwrap();
        assert_eq!(c, Rgb::new(0x33, 0x57, 0xFF));
        assert_eq!(c.inverse().to_hex(), "#cca800");
        assert_eq!(Rgb::from_hex("3357FF"), Some(c));
        assert_eq!(Rgb::from_hex("#33"), None);
        assert_eq!(Rgb::from_hex("#zz57FF"), None);
    }

    #[test]
    fn resolve_falls_back_to_label_color() {
        assert_eq!(resolve("not a color", "Palate"), Rgb::new(0x34, 0x98, 0xDB));
    }
}
