// src/graphics/mod.rs
//! Drawing vocabulary shared by the interpreter bridge and the window server.
//!
//! - Geometry: `Point`, `Size`, `Rect`
//! - `GraphicsMode`: pixel format of a drawable
//! - `DrawCommand`: one drawing primitive aimed at one drawable
//! - `Surface`: the software pixel buffer every drawable owns

pub mod font;
pub mod surface;

pub use font::{FontMetrics, FontUid};
pub use surface::Surface;

use crate::color::{self, Color, PaletteColor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of a bitmap or window. Allocated by the window server, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DrawableId(pub u32);

impl DrawableId {
    /// The default window every program starts with. It cannot be moved.
    pub const DEFAULT_WINDOW: DrawableId = DrawableId(1);
}

impl fmt::Display for DrawableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }

    /// Saturates at the edges of the coordinate space.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Point::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Size { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.width as usize * self.height as usize
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub fn from_size(size: Size) -> Self {
        Rect {
            origin: Point::ZERO,
            size,
        }
    }

    pub fn min_x(&self) -> i32 {
        self.origin.x
    }

    pub fn min_y(&self) -> i32 {
        self.origin.y
    }

    /// Exclusive; saturates at `i32::MAX`.
    pub fn max_x(&self) -> i32 {
        self.origin.x.saturating_add(self.size.width)
    }

    /// Exclusive; saturates at `i32::MAX`.
    pub fn max_y(&self) -> i32 {
        self.origin.y.saturating_add(self.size.height)
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x() && p.x < self.max_x() && p.y >= self.min_y() && p.y < self.max_y()
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.min_x().max(other.min_x());
        let y0 = self.min_y().max(other.min_y());
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        if x1 <= x0 || y1 <= y0 {
            None
        } else {
            Some(Rect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0)))
        }
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect {
            origin: self.origin.offset(dx, dy),
            size: self.size,
        }
    }
}

/// Pixel format of a bitmap or window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GraphicsMode {
    Gray2,
    Gray4,
    #[default]
    Gray16,
    Gray256,
    Color16,
    Color256,
    Color64K,
    Color16M,
}

impl GraphicsMode {
    pub fn is_color(&self) -> bool {
        matches!(
            self,
            GraphicsMode::Color16
                | GraphicsMode::Color256
                | GraphicsMode::Color64K
                | GraphicsMode::Color16M
        )
    }

    pub fn bits_per_pixel(&self) -> usize {
        match self {
            GraphicsMode::Gray2 => 1,
            GraphicsMode::Gray4 => 2,
            GraphicsMode::Gray16 | GraphicsMode::Color16 => 4,
            GraphicsMode::Gray256 | GraphicsMode::Color256 => 8,
            GraphicsMode::Color64K => 16,
            GraphicsMode::Color16M => 24,
        }
    }

    /// Number of gray levels for gray modes.
    fn gray_levels(&self) -> Option<u32> {
        match self {
            GraphicsMode::Gray2 => Some(2),
            GraphicsMode::Gray4 => Some(4),
            GraphicsMode::Gray16 => Some(16),
            GraphicsMode::Gray256 => Some(256),
            _ => None,
        }
    }

    /// Reduces a colour to one this mode can represent.
    pub fn quantize(&self, c: Color) -> Color {
        match self {
            GraphicsMode::Color16 => PaletteColor::nearest(c).to_color(),
            GraphicsMode::Color256 => color::from_cube_index(color::cube_index(c)),
            GraphicsMode::Color64K => Color::from_rgb565(c.to_rgb565()),
            GraphicsMode::Color16M => c,
            _ => Color::gray(self.level_to_gray(self.gray_to_level(c))),
        }
    }

    /// Raw pixel value for packing: gray level, palette index, RGB565 or RGB.
    pub fn pixel_value(&self, c: Color) -> u32 {
        match self {
            GraphicsMode::Color16 => PaletteColor::nearest(c) as u32,
            GraphicsMode::Color256 => color::cube_index(c) as u32,
            GraphicsMode::Color64K => c.to_rgb565() as u32,
            GraphicsMode::Color16M => c.to_u32(),
            _ => self.gray_to_level(c),
        }
    }

    fn gray_to_level(&self, c: Color) -> u32 {
        let levels = self.gray_levels().unwrap_or(256);
        (c.luminance() as u32 * (levels - 1) + 127) / 255
    }

    fn level_to_gray(&self, level: u32) -> u8 {
        let levels = self.gray_levels().unwrap_or(256);
        (level * 255 / (levels - 1)) as u8
    }
}

/// How a primitive combines with the pixels underneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PaintMode {
    /// Draw in the foreground colour.
    #[default]
    Set,
    /// Draw in the background colour.
    Clear,
    /// Invert the pixels underneath.
    Invert,
    /// Copy source pixels including their background.
    Replace,
}

/// Border styles for `gBORDER`-style frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BorderStyle {
    #[default]
    Plain,
    /// Plain frame with a drop shadow of the given depth on the right and bottom.
    Shadow(i32),
    /// Plain frame with the corner pixels left out.
    Rounded,
    /// Two nested frames one pixel apart.
    Double,
}

/// Raw pixels supplied by the interpreter, e.g. a decoded MBM image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub size: Size,
    /// Row-major 0x00RRGGBB pixels, `size.area()` long.
    pub pixels: Arc<[u32]>,
}

impl Image {
    pub fn new(size: Size, pixels: Vec<u32>) -> Self {
        debug_assert_eq!(pixels.len(), size.area());
        Image {
            size,
            pixels: pixels.into(),
        }
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Color> {
        if x < 0 || y < 0 || x >= self.size.width || y >= self.size.height {
            return None;
        }
        let index = y as usize * self.size.width as usize + x as usize;
        self.pixels.get(index).map(|v| Color::from_u32(*v))
    }
}

/// A rectangle of another drawable, used as the source of copies and patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRect {
    pub id: DrawableId,
    pub rect: Rect,
}

/// The primitive-specific part of a draw command.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawKind {
    Fill { size: Size },
    Circle { radius: i32, filled: bool },
    Ellipse { h_radius: i32, v_radius: i32, filled: bool },
    Line { end: Point },
    Box { size: Size },
    Bitblt { image: Image },
    Copy { source: SourceRect, mask: Option<SourceRect> },
    Pattern { size: Size, source: SourceRect },
    Scroll { dx: i32, dy: i32, rect: Rect },
    Border { rect: Rect, style: BorderStyle },
    Invert { size: Size },
}

/// One drawing primitive aimed at a drawable.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub target: DrawableId,
    pub mode: PaintMode,
    pub origin: Point,
    pub color: Color,
    pub bg_color: Color,
    pub pen_width: i32,
    pub kind: DrawKind,
}

impl DrawCommand {
    /// A command with OPL's defaults: set mode, black on white, 1-pixel pen.
    pub fn new(target: DrawableId, origin: Point, kind: DrawKind) -> Self {
        DrawCommand {
            target,
            mode: PaintMode::Set,
            origin,
            color: Color::BLACK,
            bg_color: Color::WHITE,
            pen_width: 1,
            kind,
        }
    }

    pub fn with_mode(mut self, mode: PaintMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_pen_width(mut self, pen_width: i32) -> Self {
        self.pen_width = pen_width;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_intersection_clips_to_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersection(&b), Some(Rect::new(5, 5, 5, 5)));
        assert_eq!(a.intersection(&Rect::new(20, 20, 1, 1)), None);
    }

    #[test]
    fn rect_edges_saturate_instead_of_overflowing() {
        let huge = Rect::new(10, -5, i32::MAX, i32::MAX);
        assert_eq!(huge.max_x(), i32::MAX);
        assert_eq!(
            huge.intersection(&Rect::new(0, 0, 20, 20)),
            Some(Rect::new(10, 0, 10, 20))
        );
        let wide = Rect::new(i32::MIN, 0, i32::MAX, 1);
        assert_eq!(wide.intersection(&Rect::new(i32::MIN, 0, i32::MAX, 1)), Some(wide));
        assert_eq!(Point::new(i32::MAX, 0).offset(1, -1), Point::new(i32::MAX, -1));
    }

    #[test]
    fn gray2_quantizes_to_black_or_white() {
        assert_eq!(GraphicsMode::Gray2.quantize(Color::gray(100)), Color::BLACK);
        assert_eq!(GraphicsMode::Gray2.quantize(Color::gray(200)), Color::WHITE);
        assert_eq!(GraphicsMode::Gray4.pixel_value(Color::gray(170)), 2);
    }
}
