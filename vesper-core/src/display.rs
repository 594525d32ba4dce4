//! Drawing surfaces behind the display syscalls
//!
//! [`Canvas`] renders through embedded-graphics onto any `Rgb888` draw
//! target. Text uses the 8x13 monospace font, magnified by an integer
//! scale. [`Headless`] stands in when the platform has no framebuffer.

use embedded_graphics::{
    Drawable, Pixel,
    draw_target::DrawTarget,
    geometry::{Dimensions, Point, Size},
    mono_font::{MonoTextStyle, ascii::FONT_8X13},
    pixelcolor::Rgb888,
    primitives::{Line, Primitive, PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};

use crate::machine::Display;

/// Font cell at scale 1
pub const CHAR_WIDTH: u32 = 8;
pub const CHAR_HEIGHT: u32 = 13;

/// Largest accepted text scale; bigger values are clamped
pub const MAX_SCALE: u32 = 16;

/// Convert `0x00RRGGBB` to a colour
#[inline]
pub fn colour(raw: u32) -> Rgb888 {
    Rgb888::new((raw >> 16) as u8, (raw >> 8) as u8, raw as u8)
}

#[inline]
fn clamp_scale(scale: u32) -> u32 {
    scale.clamp(1, MAX_SCALE)
}

fn char_cell(scale: u32) -> (u32, u32) {
    let scale = clamp_scale(scale);
    (CHAR_WIDTH * scale, CHAR_HEIGHT * scale)
}

/// Intersect `x, y, width, height` with `bounds`.
///
/// Coordinates come straight from process registers, so everything is
/// computed in `i64` and only an on-screen result becomes a `Rectangle`.
fn clip_rect(bounds: &Rectangle, x: i64, y: i64, width: i64, height: i64) -> Option<Rectangle> {
    let left = i64::from(bounds.top_left.x);
    let top = i64::from(bounds.top_left.y);
    let right = left + i64::from(bounds.size.width);
    let bottom = top + i64::from(bounds.size.height);

    let x0 = x.max(left);
    let y0 = y.max(top);
    let x1 = x.saturating_add(width).min(right);
    let y1 = y.saturating_add(height).min(bottom);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some(Rectangle::new(
        Point::new(x0 as i32, y0 as i32),
        Size::new((x1 - x0) as u32, (y1 - y0) as u32),
    ))
}

/// Cohen-Sutherland outcode bits
mod outcode {
    pub const LEFT: u8 = 1 << 0;
    pub const RIGHT: u8 = 1 << 1;
    pub const TOP: u8 = 1 << 2;
    pub const BOTTOM: u8 = 1 << 3;
}

/// Clip the segment `p0..p1` to the pixels of `bounds`.
///
/// Returns `None` when no part of it is visible. Intersections are computed
/// in `i128`, so endpoints anywhere in the `i32` plane are fine.
fn clip_line(bounds: &Rectangle, p0: Point, p1: Point) -> Option<(Point, Point)> {
    let bottom_right = bounds.bottom_right()?;
    let (left, top) = (i64::from(bounds.top_left.x), i64::from(bounds.top_left.y));
    let (right, bottom) = (i64::from(bottom_right.x), i64::from(bottom_right.y));

    let code = |x: i64, y: i64| {
        let mut c = 0;
        if x < left {
            c |= outcode::LEFT;
        } else if x > right {
            c |= outcode::RIGHT;
        }
        if y < top {
            c |= outcode::TOP;
        } else if y > bottom {
            c |= outcode::BOTTOM;
        }
        c
    };

    let (mut x0, mut y0) = (i64::from(p0.x), i64::from(p0.y));
    let (mut x1, mut y1) = (i64::from(p1.x), i64::from(p1.y));
    let mut c0 = code(x0, y0);
    let mut c1 = code(x1, y1);

    loop {
        if c0 | c1 == 0 {
            return Some((
                Point::new(x0 as i32, y0 as i32),
                Point::new(x1 as i32, y1 as i32),
            ));
        }
        if c0 & c1 != 0 {
            return None;
        }

        let out = if c0 != 0 { c0 } else { c1 };
        let (dx, dy) = (i128::from(x1 - x0), i128::from(y1 - y0));
        // Each step moves one endpoint onto a box edge, strictly shrinking
        // the segment, so at most four steps run
        let (x, y) = if out & outcode::TOP != 0 {
            (x0 + (dx * i128::from(top - y0) / dy) as i64, top)
        } else if out & outcode::BOTTOM != 0 {
            (x0 + (dx * i128::from(bottom - y0) / dy) as i64, bottom)
        } else if out & outcode::RIGHT != 0 {
            (right, y0 + (dy * i128::from(right - x0) / dx) as i64)
        } else {
            (left, y0 + (dy * i128::from(left - x0) / dx) as i64)
        };

        if out == c0 {
            (x0, y0) = (x, y);
            c0 = code(x0, y0);
        } else {
            (x1, y1) = (x, y);
            c1 = code(x1, y1);
        }
    }
}

/// Magnifies everything drawn into it by an integer factor.
struct Scaled<'a, D> {
    target: &'a mut D,
    origin: Point,
    scale: u32,
}

impl<D: DrawTarget<Color = Rgb888>> Dimensions for Scaled<'_, D> {
    fn bounding_box(&self) -> Rectangle {
        let size = self.target.bounding_box().size;
        Rectangle::new(
            Point::zero(),
            Size::new(size.width / self.scale, size.height / self.scale),
        )
    }
}

impl<D: DrawTarget<Color = Rgb888>> DrawTarget for Scaled<'_, D> {
    type Color = Rgb888;
    type Error = D::Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let bounds = self.target.bounding_box();
        let scale = i64::from(self.scale);
        for Pixel(point, color) in pixels {
            let x = i64::from(self.origin.x) + i64::from(point.x) * scale;
            let y = i64::from(self.origin.y) + i64::from(point.y) * scale;
            if let Some(cell) = clip_rect(&bounds, x, y, scale, scale) {
                self.target.fill_solid(&cell, color)?;
            }
        }
        Ok(())
    }
}

/// embedded-graphics backed display.
pub struct Canvas<D> {
    target: D,
}

impl<D: DrawTarget<Color = Rgb888>> Canvas<D> {
    pub fn new(target: D) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &D {
        &self.target
    }

    pub fn into_inner(self) -> D {
        self.target
    }

    fn text(&mut self, x: i32, y: i32, text: &[u8], scale: u32, raw: u32) {
        // Text grows right and down from its origin
        let bounds = self.target.bounding_box();
        match bounds.bottom_right() {
            Some(corner) if x <= corner.x && y <= corner.y => {}
            _ => return,
        }

        let style = MonoTextStyle::new(&FONT_8X13, colour(raw));
        let mut scaled = Scaled {
            target: &mut self.target,
            origin: Point::new(x, y),
            scale: clamp_scale(scale),
        };

        let mut cursor = Point::zero();
        for chunk in text.utf8_chunks() {
            if !chunk.valid().is_empty() {
                match Text::with_baseline(chunk.valid(), cursor, style, Baseline::Top)
                    .draw(&mut scaled)
                {
                    Ok(next) => cursor = next,
                    Err(_) => return,
                }
            }
            if !chunk.invalid().is_empty() {
                match Text::with_baseline("?", cursor, style, Baseline::Top).draw(&mut scaled) {
                    Ok(next) => cursor = next,
                    Err(_) => return,
                }
            }
        }
    }
}

impl<D: DrawTarget<Color = Rgb888>> Display for Canvas<D> {
    fn size(&self) -> (u32, u32) {
        let size = self.target.bounding_box().size;
        (size.width, size.height)
    }

    fn char_size(&self, scale: u32) -> (u32, u32) {
        char_cell(scale)
    }

    fn clear(&mut self, raw: u32) {
        let _ = self.target.clear(colour(raw));
    }

    fn draw_pixel(&mut self, x: i32, y: i32, raw: u32) {
        let _ = Pixel(Point::new(x, y), colour(raw)).draw(&mut self.target);
    }

    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, raw: u32) {
        let bounds = self.target.bounding_box();
        let Some((start, end)) = clip_line(&bounds, Point::new(x0, y0), Point::new(x1, y1)) else {
            return;
        };
        let _ = Line::new(start, end)
            .into_styled(PrimitiveStyle::with_stroke(colour(raw), 1))
            .draw(&mut self.target);
    }

    fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, raw: u32) {
        let bounds = self.target.bounding_box();
        let area = clip_rect(
            &bounds,
            i64::from(x),
            i64::from(y),
            i64::from(width),
            i64::from(height),
        );
        if let Some(area) = area {
            let _ = self.target.fill_solid(&area, colour(raw));
        }
    }

    fn draw_char(&mut self, x: i32, y: i32, ch: u8, scale: u32, raw: u32) {
        self.text(x, y, &[ch], scale, raw);
    }

    fn draw_text(&mut self, x: i32, y: i32, text: &[u8], scale: u32, raw: u32) {
        self.text(x, y, text, scale, raw);
    }
}

/// No screen: reports 0x0 and discards every drawing call.
#[derive(Clone, Copy, Debug, Default)]
pub struct Headless;

impl Display for Headless {
    fn size(&self) -> (u32, u32) {
        (0, 0)
    }

    fn char_size(&self, scale: u32) -> (u32, u32) {
        char_cell(scale)
    }

    fn clear(&mut self, _colour: u32) {}
    fn draw_pixel(&mut self, _x: i32, _y: i32, _colour: u32) {}
    fn draw_line(&mut self, _x0: i32, _y0: i32, _x1: i32, _y1: i32, _colour: u32) {}
    fn fill_rect(&mut self, _x: i32, _y: i32, _w: u32, _h: u32, _colour: u32) {}
    fn draw_char(&mut self, _x: i32, _y: i32, _ch: u8, _scale: u32, _colour: u32) {}
    fn draw_text(&mut self, _x: i32, _y: i32, _text: &[u8], _scale: u32, _colour: u32) {}
}
