// ============================================================================
// TRANSFORM OPERATIONS — crop and rotation bake-in for the edited image
// ============================================================================

use image::{imageops, RgbaImage};

use crate::view::Rotation;

/// Copy of `[x, x+w) × [y, y+h)`. The caller validates the rectangle.
pub fn crop_image(img: &RgbaImage, x: u32, y: u32, w: u32, h: u32) -> RgbaImage {
    imageops::crop_imm(img, x, y, w, h).to_image()
}

/// Render `img` turned clockwise by `rotation`. Quarter turns are exact
/// pixel moves, so nothing is resampled.
pub fn bake_rotation(img: &RgbaImage, rotation: Rotation) -> RgbaImage {
    match rotation {
        Rotation::R0 => img.clone(),
        Rotation::R90 => imageops::rotate90(img),
        Rotation::R180 => imageops::rotate180(img),
        Rotation::R270 => imageops::rotate270(img),
    }
}
