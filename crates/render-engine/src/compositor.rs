//! Drawing surface and pixel operations used by frame renderers.
//!
//! The surface is a plain RGBA8 buffer. It is the one shared drawing target
//! of a capture session: the frame renderer paints it, the recorder samples
//! it once per rendered frame.

use std::sync::Arc;

use lyricap_common::error::{LyricapError, LyricapResult};

/// An RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const BLACK: Rgba = Rgba([0, 0, 0, 255]);
    pub const WHITE: Rgba = Rgba([255, 255, 255, 255]);

    /// Parse `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Option<Rgba> {
        let digits = hex.trim().trim_start_matches('#');
        let channel = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
        match digits.len() {
            6 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255])),
            8 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
            _ => None,
        }
    }

    /// Parse a hex color, falling back when it is malformed.
    pub fn from_hex_or(hex: &str, fallback: Rgba) -> Rgba {
        Self::from_hex(hex).unwrap_or(fallback)
    }
}

/// A rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// How an image is scaled into a destination rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// Whole image visible, letterboxed.
    Contain,
    /// Rectangle fully covered, image cropped.
    Cover,
}

/// A decoded still image (or the current frame of a video asset).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pub width: u32,
    pub height: u32,
    pixels: Arc<[u8]>,
}

impl ImageAsset {
    /// Wrap RGBA8 pixel data. Returns `None` when the buffer size is wrong.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || pixels.len() != (width * height * 4) as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels: pixels.into(),
        })
    }

    /// A single-color image.
    pub fn solid(width: u32, height: u32, color: Rgba) -> Self {
        let pixels: Vec<u8> = color
            .0
            .iter()
            .copied()
            .cycle()
            .take((width.max(1) * height.max(1) * 4) as usize)
            .collect();
        Self {
            width: width.max(1),
            height: height.max(1),
            pixels: pixels.into(),
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        let i = ((y.min(self.height - 1) * self.width + x.min(self.width - 1)) * 4) as usize;
        Rgba([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }
}

/// The RGBA8 drawing surface.
#[derive(Debug, Clone)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    /// Allocate a surface. Zero-sized surfaces are rejected.
    pub fn new(width: u32, height: u32) -> LyricapResult<Self> {
        if width == 0 || height == 0 {
            return Err(LyricapError::precondition(format!(
                "Drawing surface must be non-empty, got {width}x{height}"
            )));
        }
        Ok(Self {
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize) * 4],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn fill(&mut self, color: Rgba) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color.0);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.index(x, y);
        Some(Rgba([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]))
    }

    /// Fill a rectangle, clipped to the surface. `alpha` in `[0, 1]` blends
    /// over the existing content.
    pub fn fill_rect(&mut self, rect: Rect, color: Rgba, alpha: f32) {
        let Some((x0, y0, x1, y1)) = self.clip(rect) else {
            return;
        };
        let a = alpha.clamp(0.0, 1.0);
        for y in y0..y1 {
            for x in x0..x1 {
                let i = self.index(x, y);
                blend_into(&mut self.pixels[i..i + 4], color, a);
            }
        }
    }

    /// Draw an image scaled into `dest` with nearest-neighbor sampling.
    ///
    /// `block` > 1 samples one source pixel per `block`×`block` cell, a
    /// cheap stand-in for a background blur.
    pub fn draw_image(&mut self, image: &ImageAsset, dest: Rect, fit: Fit, block: u32) {
        if dest.width == 0 || dest.height == 0 {
            return;
        }
        let sx = dest.width as f64 / image.width as f64;
        let sy = dest.height as f64 / image.height as f64;
        let scale = match fit {
            Fit::Contain => sx.min(sy),
            Fit::Cover => sx.max(sy),
        };
        let draw_w = (image.width as f64 * scale).round().max(1.0) as u32;
        let draw_h = (image.height as f64 * scale).round().max(1.0) as u32;
        let origin_x = dest.x + (dest.width as i32 - draw_w as i32) / 2;
        let origin_y = dest.y + (dest.height as i32 - draw_h as i32) / 2;

        // Cover overflows `dest`; clip to it as well as to the surface.
        let Some((x0, y0, x1, y1)) = self.clip(dest) else {
            return;
        };
        let block = block.max(1) as i32;
        for y in y0..y1 {
            let local_y = y as i32 - origin_y;
            if local_y < 0 || local_y >= draw_h as i32 {
                continue;
            }
            let sample_y = local_y - local_y % block;
            let src_y = (sample_y as f64 / scale) as u32;
            for x in x0..x1 {
                let local_x = x as i32 - origin_x;
                if local_x < 0 || local_x >= draw_w as i32 {
                    continue;
                }
                let sample_x = local_x - local_x % block;
                let src_x = (sample_x as f64 / scale) as u32;
                let color = image.pixel(src_x, src_y);
                let i = self.index(x, y);
                blend_into(&mut self.pixels[i..i + 4], color, color.0[3] as f32 / 255.0);
            }
        }
    }

    /// FNV-1a digest over every `stride`-th pixel.
    pub fn digest(&self, stride: usize) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for px in self.pixels.chunks_exact(4).step_by(stride.max(1)) {
            for byte in px {
                hash ^= *byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
        }
        hash
    }

    fn index(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + x as usize) * 4
    }

    fn clip(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        let x0 = rect.x.max(0) as i64;
        let y0 = rect.y.max(0) as i64;
        let x1 = (rect.x as i64 + rect.width as i64).min(self.width as i64);
        let y1 = (rect.y as i64 + rect.height as i64).min(self.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

fn blend_into(dst: &mut [u8], color: Rgba, alpha: f32) {
    if alpha >= 1.0 {
        dst[..3].copy_from_slice(&color.0[..3]);
        dst[3] = 255;
        return;
    }
    if alpha <= 0.0 {
        return;
    }
    for c in 0..3 {
        let blended = color.0[c] as f32 * alpha + dst[c] as f32 * (1.0 - alpha);
        dst[c] = blended.round() as u8;
    }
    dst[3] = 255;
}
