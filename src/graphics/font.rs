// src/graphics/font.rs
//! Text metrics for the built-in OPL fonts.
//!
//! Glyph rasterization is not emulated. Programs still need `gTWIDTH`-style
//! measurements to lay out text, so each known font UID maps to a monospaced
//! approximation of its real metrics.

use super::Size;

/// OPL font UID, as passed to `gFONT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontUid(pub u32);

impl FontUid {
    pub const ARIAL_NORMAL_8: FontUid = FontUid(268435954);
    pub const ARIAL_NORMAL_11: FontUid = FontUid(268435955);
    pub const ARIAL_NORMAL_13: FontUid = FontUid(268435956);
    pub const ARIAL_NORMAL_15: FontUid = FontUid(268435957);
    pub const ARIAL_NORMAL_18: FontUid = FontUid(268435958);
    pub const ARIAL_BOLD_8: FontUid = FontUid(268435951);
    pub const ARIAL_BOLD_11: FontUid = FontUid(268435952);
    pub const ARIAL_BOLD_13: FontUid = FontUid(268435953);
    pub const COURIER_NORMAL_8: FontUid = FontUid(268436062);
    pub const COURIER_NORMAL_11: FontUid = FontUid(268436063);
    pub const COURIER_NORMAL_13: FontUid = FontUid(268436064);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontMetrics {
    pub uid: FontUid,
    pub char_width: i32,
    pub height: i32,
    pub ascent: i32,
}

const FONTS: &[FontMetrics] = &[
    FontMetrics { uid: FontUid::ARIAL_NORMAL_8, char_width: 4, height: 8, ascent: 7 },
    FontMetrics { uid: FontUid::ARIAL_NORMAL_11, char_width: 6, height: 11, ascent: 9 },
    FontMetrics { uid: FontUid::ARIAL_NORMAL_13, char_width: 7, height: 13, ascent: 11 },
    FontMetrics { uid: FontUid::ARIAL_NORMAL_15, char_width: 8, height: 15, ascent: 12 },
    FontMetrics { uid: FontUid::ARIAL_NORMAL_18, char_width: 9, height: 18, ascent: 15 },
    FontMetrics { uid: FontUid::ARIAL_BOLD_8, char_width: 5, height: 8, ascent: 7 },
    FontMetrics { uid: FontUid::ARIAL_BOLD_11, char_width: 7, height: 11, ascent: 9 },
    FontMetrics { uid: FontUid::ARIAL_BOLD_13, char_width: 8, height: 13, ascent: 11 },
    FontMetrics { uid: FontUid::COURIER_NORMAL_8, char_width: 5, height: 8, ascent: 7 },
    FontMetrics { uid: FontUid::COURIER_NORMAL_11, char_width: 7, height: 11, ascent: 9 },
    FontMetrics { uid: FontUid::COURIER_NORMAL_13, char_width: 8, height: 13, ascent: 11 },
];

impl FontMetrics {
    /// Metrics for `uid`, or the default font's when the UID is unknown.
    pub fn for_uid(uid: FontUid) -> FontMetrics {
        match FONTS.iter().find(|f| f.uid == uid) {
            Some(metrics) => *metrics,
            None => {
                log::debug!("FontMetrics: unknown font uid {}, using default", uid.0);
                Self::default_font()
            }
        }
    }

    pub fn default_font() -> FontMetrics {
        FONTS[3]
    }

    /// Size of `text` rendered in this font, and the font ascent.
    pub fn text_size(&self, text: &str) -> (Size, i32) {
        let width = i32::try_from(text.chars().count())
            .unwrap_or(i32::MAX)
            .saturating_mul(self.char_width);
        (Size::new(width, self.height), self.ascent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_known_font() {
        let metrics = FontMetrics::for_uid(FontUid::COURIER_NORMAL_11);
        assert_eq!(metrics.text_size("abc"), (Size::new(21, 11), 9));
    }

    #[test]
    fn unknown_font_falls_back_to_default() {
        assert_eq!(FontMetrics::for_uid(FontUid(1)), FontMetrics::default_font());
        assert_eq!(FontMetrics::default_font().text_size("").0.width, 0);
    }
}
