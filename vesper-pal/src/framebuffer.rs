//! Framebuffer Display Driver
//!
//! A DrawTarget for embedded-graphics over a linear 32bpp framebuffer
//! handed out by firmware.

use embedded_graphics::{
    Pixel,
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Size},
    pixelcolor::{Rgb888, RgbColor},
    primitives::Rectangle,
};

/// Framebuffer geometry reported by firmware
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramebufferConfig {
    /// Base address (identity mapped)
    pub base: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Stride in bytes per row
    pub stride: u32,
    /// True if pixel format is BGR (blue at position 0)
    pub is_bgr: bool,
}

impl FramebufferConfig {
    /// Check if this config represents a usable framebuffer
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.base != 0
            && self.width > 0
            && self.height > 0
            && self.stride >= self.width * 4
            && self.stride % 4 == 0
    }
}

/// Framebuffer display implementing embedded-graphics DrawTarget
pub struct FramebufferDisplay {
    config: FramebufferConfig,
}

impl FramebufferDisplay {
    /// Create a new framebuffer display
    ///
    /// # Safety
    /// The caller must ensure:
    /// - `config.base` points to a valid, accessible framebuffer region
    /// - The region is at least `config.stride * config.height` bytes
    /// - No other code writes to the framebuffer concurrently
    pub unsafe fn new(config: FramebufferConfig) -> Self {
        Self { config }
    }

    /// Get the framebuffer configuration
    pub fn config(&self) -> &FramebufferConfig {
        &self.config
    }

    /// Convert an Rgb888 colour to the native pixel format
    #[inline]
    fn color_to_pixel(&self, color: Rgb888) -> u32 {
        let (r, g, b) = (u32::from(color.r()), u32::from(color.g()), u32::from(color.b()));
        if self.config.is_bgr {
            b | (g << 8) | (r << 16)
        } else {
            r | (g << 8) | (b << 16)
        }
    }

    #[inline]
    fn row(&self, y: u32) -> *mut u32 {
        let offset = y as usize * self.config.stride as usize;
        (self.config.base as usize + offset) as *mut u32
    }

    /// Fill `width` pixels of row `y` starting at column `x`, pre-clipped
    fn fill_span(&mut self, x: u32, y: u32, width: u32, pixel: u32) {
        let row = self.row(y);
        for column in x..x + width {
            // SAFETY: The caller clipped the span to the framebuffer, and
            // `new`'s contract covers every in-bounds pixel.
            unsafe { row.add(column as usize).write_volatile(pixel) };
        }
    }
}

impl OriginDimensions for FramebufferDisplay {
    fn size(&self) -> Size {
        Size::new(self.config.width, self.config.height)
    }
}

impl DrawTarget for FramebufferDisplay {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            // embedded-graphics uses i32 for coordinates
            if coord.x < 0 || coord.y < 0 {
                continue;
            }
            let (x, y) = (coord.x as u32, coord.y as u32);
            if x < self.config.width && y < self.config.height {
                let pixel = self.color_to_pixel(color);
                self.fill_span(x, y, 1, pixel);
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        // Widened so areas near the edge of the i32 plane cannot overflow
        let clip = |start: i32, len: u32, limit: u32| {
            let start = i64::from(start);
            let end = (start + i64::from(len)).min(i64::from(limit));
            let start = start.max(0);
            (start < end).then(|| (start as u32, (end - start) as u32))
        };
        let (Some((x, width)), Some((top, height))) = (
            clip(area.top_left.x, area.size.width, self.config.width),
            clip(area.top_left.y, area.size.height, self.config.height),
        ) else {
            return Ok(());
        };

        let pixel = self.color_to_pixel(color);
        for y in top..top + height {
            self.fill_span(x, y, width, pixel);
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let pixel = self.color_to_pixel(color);
        for y in 0..self.config.height {
            self.fill_span(0, y, self.config.width, pixel);
        }
        Ok(())
    }
}
