// ============================================================================
// RASTER SURFACE — the live RGBA buffer of the image being edited
// ============================================================================

use ab_glyph::FontArc;
use image::{Rgba, RgbaImage};
use thiserror::Error;

use crate::components::colors::Color;
use crate::io::{self, DecodeError, EncodeError, SaveFormat};
use crate::ops::{brush, text, transform};

/// An axis-aligned rectangle in buffer pixels. Width/height may be zero or
/// negative when built from raw input; [`RasterSurface::crop`] validates it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Region {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanned by two drag corners, whatever the drag direction.
    /// Corners are rounded to whole pixels before measuring.
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Self {
        let x0 = a.0.min(b.0).round() as i64;
        let y0 = a.1.min(b.1).round() as i64;
        let x1 = a.0.max(b.0).round() as i64;
        let y1 = a.1.max(b.1).round() as i64;
        Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegionError {
    #[error("crop region {width}x{height} is empty")]
    Degenerate { width: i64, height: i64 },
    #[error("crop region {region:?} exceeds the {surface_w}x{surface_h} image")]
    OutOfBounds {
        region: Region,
        surface_w: u32,
        surface_h: u32,
    },
    #[error("crop selection {width}x{height} is too small (needs more than {min}px per side)")]
    TooSmall { width: i64, height: i64, min: u32 },
}

/// In-memory RGBA8 pixel buffer, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterSurface {
    pixels: RgbaImage,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32, fill: Color) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, Rgba(fill)),
        }
    }

    pub fn from_image(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Decode file bytes into a surface at the image's natural size.
    pub fn load(bytes: &[u8], declared_mime: Option<&str>) -> Result<Self, DecodeError> {
        io::decode_image(bytes, declared_mime).map(Self::from_image)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x < self.width() && y < self.height() {
            Some(self.pixels.get_pixel(x, y).0)
        } else {
            None
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Replace the buffer wholesale (new dimensions allowed).
    pub fn replace(&mut self, pixels: RgbaImage) {
        self.pixels = pixels;
    }

    /// Copy of the sub-rectangle `[x, x+w) × [y, y+h)`.
    pub fn crop(&self, region: Region) -> Result<RasterSurface, RegionError> {
        if region.width <= 0 || region.height <= 0 {
            return Err(RegionError::Degenerate {
                width: region.width,
                height: region.height,
            });
        }
        let (w, h) = (self.width() as i64, self.height() as i64);
        let right = region.x.checked_add(region.width);
        let bottom = region.y.checked_add(region.height);
        if region.x < 0
            || region.y < 0
            || right.is_none_or(|r| r > w)
            || bottom.is_none_or(|b| b > h)
        {
            return Err(RegionError::OutOfBounds {
                region,
                surface_w: self.width(),
                surface_h: self.height(),
            });
        }
        Ok(Self::from_image(transform::crop_image(
            &self.pixels,
            region.x as u32,
            region.y as u32,
            region.width as u32,
            region.height as u32,
        )))
    }

    /// Rasterize a polyline with round joins and caps.
    pub fn draw_stroke(&mut self, points: &[(f32, f32)], color: Color, width: f32) {
        brush::stroke_polyline(&mut self.pixels, points, color, width);
    }

    /// Rasterize one segment of an in-progress stroke.
    pub fn draw_segment(&mut self, from: (f32, f32), to: (f32, f32), color: Color, width: f32) {
        brush::stroke_polyline(&mut self.pixels, &[from, to], color, width);
    }

    /// Rasterize `text` with its baseline starting at `(x, y)`.
    pub fn draw_text(&mut self, font: &FontArc, x: f32, y: f32, text: &str, color: Color, size_px: f32) {
        text::stamp_text(&mut self.pixels, font, text, size_px, (x, y), color);
    }

    pub fn to_encoded_bytes(&self, format: SaveFormat, quality: u8) -> Result<Vec<u8>, EncodeError> {
        io::encode_image(&self.pixels, format, quality)
    }
}
