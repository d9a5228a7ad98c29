// src/graphics/surface.rs
//! Software pixel buffer owned by every bitmap and window.
//!
//! Pixels are stored as full RGB and quantized to the surface's graphics mode
//! on every write, so reads always return a colour the mode can represent.
//! Primitives that read from other drawables (copy, pattern, bitblt) take
//! their source as an already extracted `Pixels` block; the window server
//! resolves sources before it borrows the target mutably.
//!
//! Coordinates arrive from the interpreter unvalidated. Every primitive works
//! in `i64` and only visits pixels that can land on the surface, so extreme
//! sizes, radii and end points cost no more than an on-screen shape.

use super::{BorderStyle, DrawCommand, DrawKind, GraphicsMode, Image, PaintMode, Point, Rect, Size};
use crate::color::Color;
use log::*;
use std::ops::Range;

/// Largest width or height of any surface.
pub const MAX_SURFACE_EDGE: i32 = 4096;

/// Widest pen, and deepest border shadow, a primitive is drawn with.
pub const MAX_PEN_WIDTH: i32 = 32;

/// A rectangular block of pixels lifted out of a surface or image.
///
/// `offset` is where the stored block starts relative to the rectangle that
/// was asked for; the parts of that rectangle outside the source are absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixels {
    offset: Point,
    size: Size,
    data: Vec<Color>,
}

impl Pixels {
    fn at(offset: Point, size: Size, data: Vec<Color>) -> Self {
        debug_assert_eq!(data.len(), size.area());
        Pixels { offset, size, data }
    }

    fn empty() -> Self {
        Pixels::at(Point::ZERO, Size::default(), Vec::new())
    }

    /// Extent of the stored block, relative to the requested rectangle.
    fn stored(&self) -> Rect {
        Rect {
            origin: self.offset,
            size: self.size,
        }
    }

    /// Pixel at (x, y) of the requested rectangle, if the source had one there.
    fn local(&self, x: i64, y: i64) -> Option<Color> {
        let lx = x - self.offset.x as i64;
        let ly = y - self.offset.y as i64;
        if lx < 0 || ly < 0 || lx >= self.size.width as i64 || ly >= self.size.height as i64 {
            return None;
        }
        self.data
            .get((ly * self.size.width as i64 + lx) as usize)
            .copied()
    }

    /// The part of `rect` (in image coordinates) that lies inside `image`.
    fn from_image(image: &Image, rect: Rect) -> Self {
        let bounds = Rect::from_size(image.size);
        let Some(clipped) = rect.intersection(&bounds) else {
            return Pixels::empty();
        };
        let mut data = Vec::with_capacity(clipped.size.area());
        for y in clipped.min_y()..clipped.max_y() {
            for x in clipped.min_x()..clipped.max_x() {
                data.push(image.pixel(x, y).unwrap_or(Color::WHITE));
            }
        }
        let offset = Point::new(
            clipped.min_x().saturating_sub(rect.min_x()),
            clipped.min_y().saturating_sub(rect.min_y()),
        );
        Pixels::at(offset, clipped.size, data)
    }
}

/// Colour and mode state a primitive is drawn with.
#[derive(Debug, Clone, Copy)]
struct Pen {
    mode: PaintMode,
    color: Color,
    bg: Color,
    width: i64,
}

impl Pen {
    fn from_command(command: &DrawCommand) -> Self {
        Pen {
            mode: command.mode,
            color: command.color,
            bg: command.bg_color,
            width: command.pen_width.clamp(1, MAX_PEN_WIDTH) as i64,
        }
    }

    fn thin(&self) -> Self {
        Pen { width: 1, ..*self }
    }

    /// How far the brush reaches past the point it is centred on.
    fn reach(&self) -> i64 {
        self.width
    }
}

#[derive(Debug, Clone)]
pub struct Surface {
    size: Size,
    mode: GraphicsMode,
    pixels: Vec<Color>,
}

impl Surface {
    /// Creates a white surface. Negative dimensions are treated as zero and
    /// each edge is limited to `MAX_SURFACE_EDGE`.
    pub fn new(size: Size, mode: GraphicsMode) -> Self {
        let clamped = Size::new(
            size.width.clamp(0, MAX_SURFACE_EDGE),
            size.height.clamp(0, MAX_SURFACE_EDGE),
        );
        if clamped.width < size.width || clamped.height < size.height {
            warn!(
                "Surface: {}x{} exceeds the {} pixel edge limit, clamped to {}x{}",
                size.width, size.height, MAX_SURFACE_EDGE, clamped.width, clamped.height
            );
        }
        Surface {
            size: clamped,
            mode,
            pixels: vec![Color::WHITE; clamped.area()],
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn mode(&self) -> GraphicsMode {
        self.mode
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.size)
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.size.width as i64 || y >= self.size.height as i64 {
            None
        } else {
            Some((y * self.size.width as i64 + x) as usize)
        }
    }

    /// Rows in `lo..hi` that exist on the surface.
    fn rows(&self, lo: i64, hi: i64) -> Range<i64> {
        lo.max(0)..hi.min(self.size.height as i64)
    }

    /// Columns in `lo..hi` that exist on the surface.
    fn cols(&self, lo: i64, hi: i64) -> Range<i64> {
        lo.max(0)..hi.min(self.size.width as i64)
    }

    pub fn pixel(&self, p: Point) -> Option<Color> {
        self.index(p.x as i64, p.y as i64).map(|i| self.pixels[i])
    }

    /// Writes a pixel, ignoring coordinates outside the surface.
    pub fn set_pixel(&mut self, x: i32, y: i32, color: Color) {
        self.store(x as i64, y as i64, color);
    }

    fn store(&mut self, x: i64, y: i64, color: Color) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = self.mode.quantize(color);
        }
    }

    /// Resizes the surface, keeping the overlapping top-left area.
    pub fn resize(&mut self, size: Size) {
        let mut resized = Surface::new(size, self.mode);
        let overlap = self.bounds().intersection(&resized.bounds());
        if let Some(overlap) = overlap {
            for y in overlap.min_y()..overlap.max_y() {
                for x in overlap.min_x()..overlap.max_x() {
                    if let Some(i) = self.index(x as i64, y as i64) {
                        resized.store(x as i64, y as i64, self.pixels[i]);
                    }
                }
            }
        }
        *self = resized;
    }

    /// Copies the part of `rect` that lies on the surface into a detached block.
    pub fn region(&self, rect: Rect) -> Pixels {
        let Some(clipped) = rect.intersection(&self.bounds()) else {
            return Pixels::empty();
        };
        let mut data = Vec::with_capacity(clipped.size.area());
        for y in clipped.min_y()..clipped.max_y() {
            for x in clipped.min_x()..clipped.max_x() {
                if let Some(i) = self.index(x as i64, y as i64) {
                    data.push(self.pixels[i]);
                }
            }
        }
        let offset = Point::new(
            clipped.min_x().saturating_sub(rect.min_x()),
            clipped.min_y().saturating_sub(rect.min_y()),
        );
        Pixels::at(offset, clipped.size, data)
    }

    fn paint(&mut self, x: i64, y: i64, pen: &Pen) {
        let Some(i) = self.index(x, y) else {
            return;
        };
        let current = self.pixels[i];
        let next = match pen.mode {
            PaintMode::Set | PaintMode::Replace => pen.color,
            PaintMode::Clear => pen.bg,
            PaintMode::Invert => current.inverted(),
        };
        self.pixels[i] = self.mode.quantize(next);
    }

    fn paint_span(&mut self, x0: i64, x1: i64, y: i64, pen: &Pen) {
        let (lo, hi) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        if !self.rows(y, y + 1).is_empty() {
            for x in self.cols(lo, hi + 1) {
                self.paint(x, y, pen);
            }
        }
    }

    fn paint_brush(&mut self, x: i64, y: i64, pen: &Pen) {
        if pen.width <= 1 {
            self.paint(x, y, pen);
            return;
        }
        let start = -(pen.width - 1) / 2;
        for py in self.rows(y + start, y + start + pen.width) {
            for px in self.cols(x + start, x + start + pen.width) {
                self.paint(px, py, pen);
            }
        }
    }

    /// Brushes every point of row `y` from `x0` to `x1` inclusive, skipping
    /// points whose brush cannot reach the surface.
    fn brush_span(&mut self, x0: i64, x1: i64, y: i64, pen: &Pen) {
        let reach = pen.reach();
        if self.rows(y - reach, y + reach + 1).is_empty() {
            return;
        }
        let (lo, hi) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        let visible = lo.max(-reach)..(hi + 1).min(self.size.width as i64 + reach);
        for x in visible {
            self.paint_brush(x, y, pen);
        }
    }

    fn fill_rect(&mut self, rect: Rect, pen: &Pen) {
        let Some(clipped) = rect.intersection(&self.bounds()) else {
            return;
        };
        for y in clipped.min_y()..clipped.max_y() {
            for x in clipped.min_x()..clipped.max_x() {
                self.paint(x as i64, y as i64, pen);
            }
        }
    }

    /// Bresenham line. The end point is not drawn, except for zero-length
    /// lines, which plot a single point. Lines reaching far past the surface
    /// are cut down to the part a brush could still touch.
    fn draw_line(&mut self, from: Point, to: Point, pen: &Pen) {
        let start = (from.x as i64, from.y as i64);
        let end = (to.x as i64, to.y as i64);
        if start == end {
            self.paint_brush(start.0, start.1, pen);
            return;
        }
        let reach = pen.reach();
        let lo = (-reach, -reach);
        let hi = (
            self.size.width as i64 + reach,
            self.size.height as i64 + reach,
        );
        let inside = |p: (i64, i64)| p.0 >= lo.0 && p.1 >= lo.1 && p.0 <= hi.0 && p.1 <= hi.1;
        if inside(start) && inside(end) {
            self.bresenham(start, end, pen);
            return;
        }
        let Some((a, b)) = clip_segment(start, end, lo, hi) else {
            return;
        };
        self.bresenham(a, b, pen);
        if b != end {
            self.paint_brush(b.0, b.1, pen);
        }
    }

    fn bresenham(&mut self, from: (i64, i64), to: (i64, i64), pen: &Pen) {
        let dx = (to.0 - from.0).abs();
        let dy = -(to.1 - from.1).abs();
        let sx = if from.0 < to.0 { 1 } else { -1 };
        let sy = if from.1 < to.1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = from;
        while (x, y) != to {
            self.paint_brush(x, y, pen);
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn draw_box(&mut self, rect: Rect, pen: &Pen) {
        for inset in 0..pen.width as i32 {
            let r = Rect::new(
                rect.min_x().saturating_add(inset),
                rect.min_y().saturating_add(inset),
                rect.size.width.saturating_sub(2 * inset),
                rect.size.height.saturating_sub(2 * inset),
            );
            if r.is_empty() {
                break;
            }
            self.box_outline(r, &pen.thin());
        }
    }

    /// One-pixel outline; each pixel is painted exactly once so invert mode
    /// leaves no doubled corners.
    fn box_outline(&mut self, r: Rect, pen: &Pen) {
        let (x0, x1) = (r.min_x() as i64, r.max_x() as i64 - 1);
        let (y0, y1) = (r.min_y() as i64, r.max_y() as i64 - 1);
        self.paint_span(x0, x1, y0, pen);
        if y1 > y0 {
            self.paint_span(x0, x1, y1, pen);
        }
        for y in self.rows(y0 + 1, y1) {
            self.paint(x0, y, pen);
            if x1 > x0 {
                self.paint(x1, y, pen);
            }
        }
    }

    fn draw_ellipse(&mut self, center: Point, rx: i32, ry: i32, filled: bool, pen: &Pen) {
        let (cx, cy) = (center.x as i64, center.y as i64);
        let (rx, ry) = ((rx as i64).abs(), (ry as i64).abs());
        if rx == 0 || ry == 0 {
            self.paint_span(cx - rx, cx + rx, cy, pen);
            for y in self.rows(cy - ry, cy + ry + 1) {
                if y != cy {
                    self.paint(cx, y, pen);
                }
            }
            return;
        }
        let half_width = |dy: i64| -> i64 {
            if dy > ry {
                return -1;
            }
            let t = 1.0 - (dy as f64 * dy as f64) / (ry as f64 * ry as f64);
            (rx as f64 * t.max(0.0).sqrt()).round() as i64
        };
        if filled {
            for y in self.rows(cy - ry, cy + ry + 1) {
                let w = half_width((y - cy).abs());
                self.paint_span(cx - w, cx + w, y, pen);
            }
            return;
        }
        let reach = pen.reach();
        let rows = (cy - ry).max(-reach)..(cy + ry + 1).min(self.size.height as i64 + reach);
        for y in rows {
            let dy = (y - cy).abs();
            let w = half_width(dy);
            let inner = (half_width(dy + 1) + 1).clamp(0, w);
            self.brush_span(cx + inner, cx + w, y, pen);
            let left_inner = if inner == 0 { 1 } else { inner };
            if left_inner <= w {
                self.brush_span(cx - w, cx - left_inner, y, pen);
            }
        }
    }

    /// Inverts `rect`, leaving its four corner pixels alone as `gINVERT` does.
    fn invert_rect(&mut self, rect: Rect) {
        let pen = Pen {
            mode: PaintMode::Invert,
            color: Color::BLACK,
            bg: Color::WHITE,
            width: 1,
        };
        let Some(clipped) = rect.intersection(&self.bounds()) else {
            return;
        };
        let (x0, x1) = (rect.min_x(), rect.max_x().saturating_sub(1));
        let (y0, y1) = (rect.min_y(), rect.max_y().saturating_sub(1));
        let corners = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)];
        for y in clipped.min_y()..clipped.max_y() {
            for x in clipped.min_x()..clipped.max_x() {
                if !corners.contains(&(x, y)) {
                    self.paint(x as i64, y as i64, &pen);
                }
            }
        }
    }

    fn draw_border(&mut self, rect: Rect, style: BorderStyle, pen: &Pen) {
        let thin = pen.thin();
        match style {
            BorderStyle::Plain => self.box_outline(rect, &thin),
            BorderStyle::Double => {
                self.box_outline(rect, &thin);
                let inner = Rect::new(
                    rect.min_x().saturating_add(2),
                    rect.min_y().saturating_add(2),
                    rect.size.width.saturating_sub(4),
                    rect.size.height.saturating_sub(4),
                );
                if !inner.is_empty() {
                    self.box_outline(inner, &thin);
                }
            }
            BorderStyle::Rounded => {
                let (x0, x1) = (rect.min_x() as i64, rect.max_x() as i64 - 1);
                let (y0, y1) = (rect.min_y() as i64, rect.max_y() as i64 - 1);
                self.paint_span(x0 + 1, x1 - 1, y0, &thin);
                self.paint_span(x0 + 1, x1 - 1, y1, &thin);
                for y in self.rows(y0 + 1, y1) {
                    self.paint(x0, y, &thin);
                    self.paint(x1, y, &thin);
                }
            }
            BorderStyle::Shadow(depth) => {
                let depth = depth.clamp(0, MAX_PEN_WIDTH);
                let body = Rect::new(
                    rect.min_x(),
                    rect.min_y(),
                    rect.size.width.saturating_sub(depth),
                    rect.size.height.saturating_sub(depth),
                );
                self.box_outline(body, &thin);
                let shadow = Pen {
                    mode: PaintMode::Set,
                    ..thin
                };
                self.fill_rect(
                    Rect::new(
                        body.max_x(),
                        rect.min_y().saturating_add(depth),
                        depth,
                        rect.size.height.saturating_sub(depth),
                    ),
                    &shadow,
                );
                self.fill_rect(
                    Rect::new(
                        rect.min_x().saturating_add(depth),
                        body.max_y(),
                        rect.size.width.saturating_sub(depth),
                        depth,
                    ),
                    &shadow,
                );
            }
        }
    }

    /// Moves the contents of `rect` by (dx, dy) within `rect`; the exposed
    /// area takes the background colour.
    fn scroll(&mut self, dx: i32, dy: i32, rect: Rect, bg: Color) {
        let Some(clipped) = rect.intersection(&self.bounds()) else {
            return;
        };
        let saved = self.region(clipped);
        for y in clipped.min_y()..clipped.max_y() {
            for x in clipped.min_x()..clipped.max_x() {
                self.store(x as i64, y as i64, bg);
            }
        }
        let (x0, y0) = (clipped.min_x() as i64, clipped.min_y() as i64);
        let (x1, y1) = (clipped.max_x() as i64, clipped.max_y() as i64);
        for y in 0..saved.size.height as i64 {
            for x in 0..saved.size.width as i64 {
                let (tx, ty) = (x0 + x + dx as i64, y0 + y + dy as i64);
                if tx < x0 || ty < y0 || tx >= x1 || ty >= y1 {
                    continue;
                }
                if let Some(c) = saved.local(x, y) {
                    self.store(tx, ty, c);
                }
            }
        }
    }

    /// Transfers source pixels to `dest`.
    ///
    /// Replace copies every pixel. The other modes treat white source pixels
    /// as transparent: set copies the ink, clear paints the background colour
    /// under the ink, invert inverts under the ink. When a mask is given only
    /// pixels whose mask pixel is dark are transferred. Parts of the request
    /// the source did not cover are left untouched.
    fn transfer(&mut self, dest: Point, source: &Pixels, mask: Option<&Pixels>, pen: &Pen) {
        let stored = source.stored();
        let (sx0, sy0) = (stored.min_x() as i64, stored.min_y() as i64);
        let (dx, dy) = (dest.x as i64, dest.y as i64);
        let rows = self.rows(dy + sy0, dy + sy0 + stored.size.height as i64);
        let cols = self.cols(dx + sx0, dx + sx0 + stored.size.width as i64);
        for ty in rows {
            for tx in cols.clone() {
                let (x, y) = (tx - dx, ty - dy);
                if let Some(mask) = mask {
                    match mask.local(x, y) {
                        Some(m) if m.luminance() < 128 => {}
                        _ => continue,
                    }
                }
                let Some(src) = source.local(x, y) else {
                    continue;
                };
                match pen.mode {
                    PaintMode::Replace => self.store(tx, ty, src),
                    _ if src == Color::WHITE => {}
                    PaintMode::Set => self.store(tx, ty, src),
                    PaintMode::Clear => self.store(tx, ty, pen.bg),
                    PaintMode::Invert => self.paint(tx, ty, pen),
                }
            }
        }
    }

    fn tile(&mut self, area: Rect, source: &Pixels, pen: &Pen) {
        if source.size.is_empty() {
            return;
        }
        let Some(clipped) = area.intersection(&self.bounds()) else {
            return;
        };
        let (w, h) = (source.size.width as i64, source.size.height as i64);
        let (ax, ay) = (area.min_x() as i64, area.min_y() as i64);
        for y in clipped.min_y() as i64..clipped.max_y() as i64 {
            for x in clipped.min_x() as i64..clipped.max_x() as i64 {
                let sx = (x - ax).rem_euclid(w);
                let sy = (y - ay).rem_euclid(h);
                let Some(&src) = source.data.get((sy * w + sx) as usize) else {
                    continue;
                };
                match pen.mode {
                    PaintMode::Replace | PaintMode::Set => self.store(x, y, src),
                    PaintMode::Clear if src != Color::WHITE => self.store(x, y, pen.bg),
                    PaintMode::Invert if src != Color::WHITE => self.paint(x, y, pen),
                    _ => {}
                }
            }
        }
    }

    /// Executes one draw command.
    ///
    /// `source` and `mask` must be supplied for copy and pattern commands;
    /// without them those commands draw nothing.
    pub fn apply(&mut self, command: &DrawCommand, source: Option<&Pixels>, mask: Option<&Pixels>) {
        let pen = Pen::from_command(command);
        let origin = command.origin;
        match &command.kind {
            DrawKind::Fill { size } => self.fill_rect(Rect { origin, size: *size }, &pen),
            DrawKind::Circle { radius, filled } => {
                self.draw_ellipse(origin, *radius, *radius, *filled, &pen)
            }
            DrawKind::Ellipse {
                h_radius,
                v_radius,
                filled,
            } => self.draw_ellipse(origin, *h_radius, *v_radius, *filled, &pen),
            DrawKind::Line { end } => self.draw_line(origin, *end, &pen),
            DrawKind::Box { size } => self.draw_box(Rect { origin, size: *size }, &pen),
            DrawKind::Bitblt { image } => {
                // Only the part of the image that lands on the surface is decoded.
                let flip = |v: i32| (-(v as i64)).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                let visible = Rect::new(
                    flip(origin.x),
                    flip(origin.y),
                    self.size.width,
                    self.size.height,
                );
                let pixels = Pixels::from_image(image, visible);
                let at = origin.offset(visible.min_x(), visible.min_y());
                self.transfer(at, &pixels, None, &pen);
            }
            DrawKind::Copy { .. } => {
                if let Some(source) = source {
                    self.transfer(origin, source, mask, &pen);
                }
            }
            DrawKind::Pattern { size, .. } => {
                if let Some(source) = source {
                    self.tile(Rect { origin, size: *size }, source, &pen);
                }
            }
            DrawKind::Scroll { dx, dy, rect } => self.scroll(*dx, *dy, *rect, command.bg_color),
            DrawKind::Border { rect, style } => self.draw_border(*rect, *style, &pen),
            DrawKind::Invert { size } => self.invert_rect(Rect { origin, size: *size }),
        }
    }

    /// Reads `count` pixels of row `pos.y` starting at `pos.x`, packed in `mode`.
    ///
    /// Sub-byte modes pack the first pixel into the lowest bits and pad the
    /// result to a 16-bit boundary. Pixels outside the surface read as zero.
    /// At most `MAX_SURFACE_EDGE` pixels are read.
    pub fn peek_line(&self, pos: Point, count: usize, mode: GraphicsMode) -> Vec<u8> {
        let limit = MAX_SURFACE_EDGE as usize;
        if count > limit {
            warn!("Surface: peek_line of {} pixels truncated to {}", count, limit);
        }
        let count = count.min(limit);
        let values = (0..count).map(|i| {
            self.index(pos.x as i64 + i as i64, pos.y as i64)
                .map(|index| mode.pixel_value(self.pixels[index]))
                .unwrap_or(0)
        });
        let bpp = mode.bits_per_pixel();
        match bpp {
            1 | 2 | 4 => {
                let bits = count * bpp;
                let mut out = vec![0u8; bits.div_ceil(16) * 2];
                for (i, value) in values.enumerate() {
                    let bit = i * bpp;
                    out[bit / 8] |= ((value as u8) & ((1 << bpp) - 1)) << (bit % 8);
                }
                out
            }
            8 => values.map(|v| v as u8).collect(),
            16 => values.flat_map(|v| (v as u16).to_le_bytes()).collect(),
            _ => values
                .flat_map(|v| {
                    let c = Color::from_u32(v);
                    [c.b, c.g, c.r]
                })
                .collect(),
        }
    }

    /// Draws this surface onto `dest` at `at`, clipped to `dest`.
    pub fn composite_onto(&self, dest: &mut Surface, at: Point) {
        let (ax, ay) = (at.x as i64, at.y as i64);
        let rows = dest.rows(ay, ay + self.size.height as i64);
        let cols = dest.cols(ax, ax + self.size.width as i64);
        for y in rows {
            for x in cols.clone() {
                if let Some(i) = self.index(x - ax, y - ay) {
                    dest.store(x, y, self.pixels[i]);
                }
            }
        }
    }

    /// Darkens `rect` of this surface by half; used for window shadows.
    pub fn darken(&mut self, rect: Rect) {
        let Some(clipped) = rect.intersection(&self.bounds()) else {
            return;
        };
        for y in clipped.min_y()..clipped.max_y() {
            for x in clipped.min_x()..clipped.max_x() {
                if let Some(i) = self.index(x as i64, y as i64) {
                    let c = self.pixels[i];
                    self.pixels[i] = self.mode.quantize(Color::rgb(c.r / 2, c.g / 2, c.b / 2));
                }
            }
        }
    }
}

/// Liang-Barsky clip of the segment `from..to` to the box `lo..=hi`.
/// The clipped end points are rounded to the nearest pixel.
fn clip_segment(
    from: (i64, i64),
    to: (i64, i64),
    lo: (i64, i64),
    hi: (i64, i64),
) -> Option<((i64, i64), (i64, i64))> {
    let (x0, y0) = (from.0 as f64, from.1 as f64);
    let (dx, dy) = ((to.0 - from.0) as f64, (to.1 - from.1) as f64);
    let edges = [
        (-dx, x0 - lo.0 as f64),
        (dx, hi.0 as f64 - x0),
        (-dy, y0 - lo.1 as f64),
        (dy, hi.1 as f64 - y0),
    ];
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }
    let at = |t: f64| {
        (
            ((x0 + t * dx).round() as i64).clamp(lo.0, hi.0),
            ((y0 + t * dy).round() as i64).clamp(lo.1, hi.1),
        )
    };
    let a = if t0 == 0.0 { from } else { at(t0) };
    let b = if t1 == 1.0 { to } else { at(t1) };
    Some((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::{DrawableId, SourceRect};

    const TARGET: DrawableId = DrawableId(2);

    fn surface(w: i32, h: i32) -> Surface {
        Surface::new(Size::new(w, h), GraphicsMode::Gray16)
    }

    fn black_count(s: &Surface) -> usize {
        s.pixels.iter().filter(|c| **c == Color::BLACK).count()
    }

    #[test]
    fn fill_is_clipped_to_surface() {
        let mut s = surface(4, 4);
        let cmd = DrawCommand::new(TARGET, Point::new(2, 2), DrawKind::Fill { size: Size::new(10, 10) });
        s.apply(&cmd, None, None);
        assert_eq!(black_count(&s), 4);
        assert_eq!(s.pixel(Point::new(3, 3)), Some(Color::BLACK));
        assert_eq!(s.pixel(Point::new(1, 1)), Some(Color::WHITE));
    }

    #[test]
    fn line_excludes_end_point() {
        let mut s = surface(10, 1);
        let cmd = DrawCommand::new(TARGET, Point::new(0, 0), DrawKind::Line { end: Point::new(5, 0) });
        s.apply(&cmd, None, None);
        assert_eq!(black_count(&s), 5);
        assert_eq!(s.pixel(Point::new(5, 0)), Some(Color::WHITE));
    }

    #[test]
    fn zero_length_line_plots_a_point() {
        let mut s = surface(3, 3);
        let cmd = DrawCommand::new(TARGET, Point::new(1, 1), DrawKind::Line { end: Point::new(1, 1) });
        s.apply(&cmd, None, None);
        assert_eq!(black_count(&s), 1);
    }

    #[test]
    fn wide_pen_line_covers_a_band() {
        let mut s = surface(10, 5);
        let cmd = DrawCommand::new(TARGET, Point::new(0, 2), DrawKind::Line { end: Point::new(5, 2) })
            .with_pen_width(3)
            .with_color(Color::BLACK);
        s.apply(&cmd, None, None);
        for y in 1..=3 {
            assert_eq!(s.pixel(Point::new(2, y)), Some(Color::BLACK), "row {y}");
        }
        assert_eq!(s.pixel(Point::new(2, 0)), Some(Color::WHITE));
        assert_eq!(s.pixel(Point::new(2, 4)), Some(Color::WHITE));
    }

    #[test]
    fn line_from_far_outside_is_clipped_to_the_visible_part() {
        let mut s = surface(10, 10);
        let cmd = DrawCommand::new(
            TARGET,
            Point::new(i32::MIN, 4),
            DrawKind::Line { end: Point::new(i32::MAX, 4) },
        );
        s.apply(&cmd, None, None);
        assert_eq!(black_count(&s), 10);
        for x in 0..10 {
            assert_eq!(s.pixel(Point::new(x, 4)), Some(Color::BLACK), "column {x}");
        }

        let mut s = surface(10, 10);
        let cmd = DrawCommand::new(
            TARGET,
            Point::new(i32::MIN, i32::MIN),
            DrawKind::Line { end: Point::new(i32::MAX, i32::MAX) },
        )
        .with_pen_width(i32::MAX);
        s.apply(&cmd, None, None);
        assert!(black_count(&s) > 0);
    }

    #[test]
    fn inverted_box_outline_has_no_doubled_corners() {
        let mut s = surface(5, 5);
        let cmd = DrawCommand::new(TARGET, Point::ZERO, DrawKind::Box { size: Size::new(5, 5) })
            .with_mode(PaintMode::Invert);
        s.apply(&cmd, None, None);
        assert_eq!(black_count(&s), 16);
        assert_eq!(s.pixel(Point::new(0, 0)), Some(Color::BLACK));
        assert_eq!(s.pixel(Point::new(2, 2)), Some(Color::WHITE));
    }

    #[test]
    fn filled_circle_is_symmetric() {
        let mut s = surface(11, 11);
        let cmd = DrawCommand::new(TARGET, Point::new(5, 5), DrawKind::Circle { radius: 4, filled: true });
        s.apply(&cmd, None, None);
        for (x, y) in [(5, 1), (5, 9), (1, 5), (9, 5), (5, 5)] {
            assert_eq!(s.pixel(Point::new(x, y)), Some(Color::BLACK), "({x}, {y})");
        }
        assert_eq!(s.pixel(Point::new(0, 0)), Some(Color::WHITE));
    }

    #[test]
    fn circle_outline_leaves_the_centre_empty() {
        let mut s = surface(11, 11);
        let cmd = DrawCommand::new(TARGET, Point::new(5, 5), DrawKind::Circle { radius: 4, filled: false });
        s.apply(&cmd, None, None);
        for (x, y) in [(5, 1), (5, 9), (1, 5), (9, 5)] {
            assert_eq!(s.pixel(Point::new(x, y)), Some(Color::BLACK), "({x}, {y})");
        }
        assert_eq!(s.pixel(Point::new(5, 5)), Some(Color::WHITE));
    }

    #[test]
    fn extreme_shapes_stay_on_the_surface() {
        let mut s = surface(16, 16);
        let commands = [
            DrawCommand::new(TARGET, Point::new(10, 10), DrawKind::Fill { size: Size::new(i32::MAX, 1) }),
            DrawCommand::new(TARGET, Point::new(8, 8), DrawKind::Circle { radius: i32::MAX, filled: true }),
            DrawCommand::new(TARGET, Point::new(8, 8), DrawKind::Circle { radius: i32::MIN, filled: false }),
            DrawCommand::new(
                TARGET,
                Point::new(i32::MAX, i32::MIN),
                DrawKind::Ellipse { h_radius: i32::MAX, v_radius: 1, filled: false },
            ),
            DrawCommand::new(TARGET, Point::new(-5, -5), DrawKind::Box { size: Size::new(i32::MAX, i32::MAX) })
                .with_pen_width(1000),
            DrawCommand::new(TARGET, Point::new(i32::MIN, 3), DrawKind::Invert { size: Size::new(i32::MAX, 4) }),
            DrawCommand::new(
                TARGET,
                Point::ZERO,
                DrawKind::Border {
                    rect: Rect::new(i32::MAX, i32::MAX, i32::MAX, i32::MAX),
                    style: BorderStyle::Shadow(i32::MAX),
                },
            ),
            DrawCommand::new(
                TARGET,
                Point::ZERO,
                DrawKind::Scroll { dx: i32::MIN, dy: i32::MAX, rect: Rect::new(0, 0, i32::MAX, i32::MAX) },
            ),
        ];
        for cmd in &commands {
            s.apply(cmd, None, None);
        }
        assert_eq!(s.size(), Size::new(16, 16));
        assert_eq!(s.pixels.len(), 256);
    }

    #[test]
    fn surfaces_are_limited_in_size() {
        let s = Surface::new(Size::new(i32::MAX, 3), GraphicsMode::Gray2);
        assert_eq!(s.size(), Size::new(MAX_SURFACE_EDGE, 3));
        assert_eq!(Surface::new(Size::new(-4, 9), GraphicsMode::Gray2).size(), Size::new(0, 9));
    }

    #[test]
    fn invert_skips_corner_pixels() {
        let mut s = surface(3, 3);
        let cmd = DrawCommand::new(TARGET, Point::ZERO, DrawKind::Invert { size: Size::new(3, 3) });
        s.apply(&cmd, None, None);
        assert_eq!(black_count(&s), 5);
        assert_eq!(s.pixel(Point::new(0, 0)), Some(Color::WHITE));
    }

    #[test]
    fn scroll_moves_content_and_exposes_background() {
        let mut s = surface(4, 1);
        s.set_pixel(0, 0, Color::BLACK);
        let cmd = DrawCommand::new(
            TARGET,
            Point::ZERO,
            DrawKind::Scroll { dx: 2, dy: 0, rect: Rect::new(0, 0, 4, 1) },
        );
        s.apply(&cmd, None, None);
        assert_eq!(s.pixel(Point::new(0, 0)), Some(Color::WHITE));
        assert_eq!(s.pixel(Point::new(2, 0)), Some(Color::BLACK));
    }

    #[test]
    fn masked_copy_only_transfers_dark_mask_pixels() {
        let mut s = surface(2, 1);
        let source = Pixels::at(Point::ZERO, Size::new(2, 1), vec![Color::BLACK, Color::BLACK]);
        let mask = Pixels::at(Point::ZERO, Size::new(2, 1), vec![Color::BLACK, Color::WHITE]);
        let src = SourceRect { id: DrawableId(3), rect: Rect::new(0, 0, 2, 1) };
        let cmd = DrawCommand::new(TARGET, Point::ZERO, DrawKind::Copy { source: src, mask: Some(src) });
        s.apply(&cmd, Some(&source), Some(&mask));
        assert_eq!(s.pixel(Point::new(0, 0)), Some(Color::BLACK));
        assert_eq!(s.pixel(Point::new(1, 0)), Some(Color::WHITE));
    }

    #[test]
    fn region_keeps_only_the_part_on_the_surface() {
        let mut s = surface(4, 4);
        s.set_pixel(0, 0, Color::BLACK);
        let region = s.region(Rect::new(-2, -1, i32::MAX, i32::MAX));
        assert_eq!(region.stored(), Rect::new(2, 1, 4, 4));
        assert_eq!(region.local(2, 1), Some(Color::BLACK));
        assert_eq!(region.local(0, 0), None);

        // Replace only writes where the source had pixels.
        let mut target = surface(8, 8);
        target.set_pixel(0, 0, Color::BLACK);
        let src = SourceRect { id: DrawableId(3), rect: Rect::new(-2, -1, 6, 5) };
        let cmd = DrawCommand::new(TARGET, Point::ZERO, DrawKind::Copy { source: src, mask: None })
            .with_mode(PaintMode::Replace);
        target.apply(&cmd, Some(&region), None);
        assert_eq!(target.pixel(Point::new(0, 0)), Some(Color::BLACK));
        assert_eq!(target.pixel(Point::new(2, 1)), Some(Color::BLACK));
        assert_eq!(black_count(&target), 2);
    }

    #[test]
    fn bitblt_reads_no_further_than_the_image_data() {
        let mut s = surface(4, 4);
        // The declared size is far larger than the pixels supplied.
        let image = Image {
            size: Size::new(i32::MAX, i32::MAX),
            pixels: vec![0; 2].into(),
        };
        let cmd = DrawCommand::new(TARGET, Point::new(-1, 0), DrawKind::Bitblt { image });
        s.apply(&cmd, None, None);
        assert_eq!(s.pixel(Point::new(0, 0)), Some(Color::BLACK));
        assert_eq!(black_count(&s), 1);
    }

    #[test]
    fn peek_line_packs_gray2_low_bit_first() {
        let mut s = Surface::new(Size::new(8, 1), GraphicsMode::Gray2);
        s.set_pixel(1, 0, Color::BLACK);
        let bytes = s.peek_line(Point::ZERO, 8, GraphicsMode::Gray2);
        // Black is level 0, white level 1; padded to two bytes.
        assert_eq!(bytes, vec![0b1111_1101, 0]);
    }

    #[test]
    fn peek_line_outside_surface_reads_zero() {
        let s = surface(2, 2);
        assert_eq!(s.peek_line(Point::new(5, 5), 2, GraphicsMode::Gray256), vec![0, 0]);
    }

    #[test]
    fn peek_line_count_is_capped() {
        let s = surface(2, 2);
        let bytes = s.peek_line(Point::new(i32::MAX, 0), usize::MAX, GraphicsMode::Gray256);
        assert_eq!(bytes.len(), MAX_SURFACE_EDGE as usize);
    }

    #[test]
    fn composite_clips_far_positions() {
        let mut screen = surface(4, 4);
        let mut window = surface(2, 2);
        window.set_pixel(0, 0, Color::BLACK);
        window.composite_onto(&mut screen, Point::new(i32::MAX, i32::MIN));
        assert_eq!(black_count(&screen), 0);
        window.composite_onto(&mut screen, Point::new(3, 3));
        assert_eq!(screen.pixel(Point::new(3, 3)), Some(Color::BLACK));
    }

    #[test]
    fn resize_keeps_overlap() {
        let mut s = surface(2, 2);
        s.set_pixel(1, 1, Color::BLACK);
        s.resize(Size::new(4, 4));
        assert_eq!(s.size(), Size::new(4, 4));
        assert_eq!(s.pixel(Point::new(1, 1)), Some(Color::BLACK));
    }
}
