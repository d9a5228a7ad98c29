// src/color.rs

//! Defines the RGB `Color` type, the EPOC 16-colour palette, and conversions
//! between colours and the packed pixel formats of each graphics mode.

use serde::{Deserialize, Serialize};

/// A 24-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    pub const fn gray(level: u8) -> Self {
        Color::rgb(level, level, level)
    }

    /// Luminance using the integer approximation of the Rec.601 weights.
    pub fn luminance(&self) -> u8 {
        ((self.r as u32 * 299 + self.g as u32 * 587 + self.b as u32 * 114) / 1000) as u8
    }

    /// Bitwise inverse, used by the invert paint mode.
    pub fn inverted(&self) -> Self {
        Color::rgb(!self.r, !self.g, !self.b)
    }

    /// 0x00RRGGBB
    pub fn to_u32(&self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    pub fn from_u32(value: u32) -> Self {
        Color::rgb((value >> 16) as u8, (value >> 8) as u8, value as u8)
    }

    pub fn to_rgb565(&self) -> u16 {
        ((self.r as u16 >> 3) << 11) | ((self.g as u16 >> 2) << 5) | (self.b as u16 >> 3)
    }

    pub fn from_rgb565(value: u16) -> Self {
        let r = ((value >> 11) & 0x1f) as u8;
        let g = ((value >> 5) & 0x3f) as u8;
        let b = (value & 0x1f) as u8;
        Color::rgb(r << 3 | r >> 2, g << 2 | g >> 4, b << 3 | b >> 2)
    }

    fn distance_sq(&self, other: &Color) -> u32 {
        let dr = self.r as i32 - other.r as i32;
        let dg = self.g as i32 - other.g as i32;
        let db = self.b as i32 - other.b as i32;
        (dr * dr + dg * dg + db * db) as u32
    }
}

/// The 16 colours of the EPOC colour16 palette, in palette-index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PaletteColor {
    Black = 0,
    DarkGray = 1,
    DarkRed = 2,
    DarkYellow = 3,
    DarkGreen = 4,
    Red = 5,
    Yellow = 6,
    Green = 7,
    Magenta = 8,
    Blue = 9,
    Cyan = 10,
    DarkMagenta = 11,
    DarkBlue = 12,
    DarkCyan = 13,
    LightGray = 14,
    White = 15,
}

const PALETTE: [PaletteColor; 16] = [
    PaletteColor::Black,
    PaletteColor::DarkGray,
    PaletteColor::DarkRed,
    PaletteColor::DarkYellow,
    PaletteColor::DarkGreen,
    PaletteColor::Red,
    PaletteColor::Yellow,
    PaletteColor::Green,
    PaletteColor::Magenta,
    PaletteColor::Blue,
    PaletteColor::Cyan,
    PaletteColor::DarkMagenta,
    PaletteColor::DarkBlue,
    PaletteColor::DarkCyan,
    PaletteColor::LightGray,
    PaletteColor::White,
];

impl PaletteColor {
    /// Converts a palette index to a `PaletteColor`; indices wrap modulo 16.
    pub fn from_index(idx: u8) -> Self {
        PALETTE[(idx & 0x0f) as usize]
    }

    pub fn to_color(&self) -> Color {
        match self {
            PaletteColor::Black => Color::rgb(0, 0, 0),
            PaletteColor::DarkGray => Color::rgb(85, 85, 85),
            PaletteColor::DarkRed => Color::rgb(128, 0, 0),
            PaletteColor::DarkYellow => Color::rgb(128, 128, 0),
            PaletteColor::DarkGreen => Color::rgb(0, 128, 0),
            PaletteColor::Red => Color::rgb(255, 0, 0),
            PaletteColor::Yellow => Color::rgb(255, 255, 0),
            PaletteColor::Green => Color::rgb(0, 255, 0),
            PaletteColor::Magenta => Color::rgb(255, 0, 255),
            PaletteColor::Blue => Color::rgb(0, 0, 255),
            PaletteColor::Cyan => Color::rgb(0, 255, 255),
            PaletteColor::DarkMagenta => Color::rgb(128, 0, 128),
            PaletteColor::DarkBlue => Color::rgb(0, 0, 128),
            PaletteColor::DarkCyan => Color::rgb(0, 128, 128),
            PaletteColor::LightGray => Color::rgb(170, 170, 170),
            PaletteColor::White => Color::rgb(255, 255, 255),
        }
    }

    /// Nearest palette entry to an arbitrary colour.
    pub fn nearest(color: Color) -> Self {
        let mut best = PaletteColor::Black;
        let mut best_distance = u32::MAX;
        for entry in PALETTE {
            let distance = color.distance_sq(&entry.to_color());
            if distance < best_distance {
                best = entry;
                best_distance = distance;
            }
        }
        best
    }
}

/// Index into the 6x6x6 colour cube used for colour256 bitmaps.
pub fn cube_index(color: Color) -> u8 {
    let level = |c: u8| (c as u32 * 5 + 127) / 255;
    (level(color.r) * 36 + level(color.g) * 6 + level(color.b)) as u8
}

pub fn from_cube_index(idx: u8) -> Color {
    let idx = idx.min(215) as u32;
    let channel = |v: u32| (v * 51) as u8;
    Color::rgb(channel(idx / 36), channel((idx / 6) % 6), channel(idx % 6))
}
