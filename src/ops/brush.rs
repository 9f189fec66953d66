// ============================================================================
// BRUSH — round-capped polyline rasterization into an RGBA buffer
// ============================================================================

use image::RgbaImage;

use crate::components::colors::Color;

/// Distance from `p` to the segment `a`–`b`.
fn distance_to_segment(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-6 {
        return ((p.0 - a.0).powi(2) + (p.1 - a.1).powi(2)).sqrt();
    }
    let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0);
    let (px, py) = (a.0 + dx * t, a.1 + dy * t);
    ((p.0 - px).powi(2) + (p.1 - py).powi(2)).sqrt()
}

/// Source-over blend of `color` at `coverage` (0..1) onto one pixel.
#[inline]
pub(crate) fn blend_pixel(dst: &mut [u8], color: Color, coverage: f32) {
    let src_a = (color[3] as f32 / 255.0) * coverage;
    if src_a <= 0.0 {
        return;
    }
    let dst_a = dst[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let s = color[c] as f32;
        let d = dst[c] as f32;
        dst[c] = ((s * src_a + d * dst_a * (1.0 - src_a)) / out_a).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Stroke a polyline of `width` (diameter) in buffer pixels.
///
/// Every pixel is blended once with its coverage against the whole polyline,
/// so joins are round and overlapping segments don't darken. A single point
/// paints a round dot. Points may lie outside the buffer; they are clipped.
pub fn stroke_polyline(img: &mut RgbaImage, points: &[(f32, f32)], color: Color, width: f32) {
    if points.is_empty() || img.width() == 0 || img.height() == 0 {
        return;
    }
    let radius = (width * 0.5).max(0.5);

    let segments: Vec<((f32, f32), (f32, f32))> = if points.len() == 1 {
        vec![(points[0], points[0])]
    } else {
        points.windows(2).map(|w| (w[0], w[1])).collect()
    };

    // Bounding box of the stroke, padded by the radius + 1px of anti-aliasing
    let pad = radius + 1.0;
    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for &(x, y) in points {
        min_x = min_x.min(x - pad);
        min_y = min_y.min(y - pad);
        max_x = max_x.max(x + pad);
        max_y = max_y.max(y + pad);
    }
    let x0 = min_x.floor().max(0.0) as u32;
    let y0 = min_y.floor().max(0.0) as u32;
    let x1 = (max_x.ceil().max(0.0) as u32).min(img.width());
    let y1 = (max_y.ceil().max(0.0) as u32).min(img.height());
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    for y in y0..y1 {
        for x in x0..x1 {
            let center = (x as f32 + 0.5, y as f32 + 0.5);
            let dist = segments
                .iter()
                .map(|&(a, b)| distance_to_segment(center, a, b))
                .fold(f32::MAX, f32::min);
            let coverage = (radius + 0.5 - dist).clamp(0.0, 1.0);
            if coverage > 0.0 {
                blend_pixel(&mut img.get_pixel_mut(x, y).0, color, coverage);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn horizontal_stroke_paints_its_path_only() {
        let mut img = RgbaImage::from_pixel(40, 20, Rgba([0, 0, 0, 255]));
        stroke_polyline(&mut img, &[(5.0, 10.0), (35.0, 10.0)], [255, 0, 0, 255], 4.0);
        assert_eq!(img.get_pixel(20, 10), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(20, 2), &Rgba([0, 0, 0, 255]));
        // round cap reaches past the end point by the radius
        assert!(img.get_pixel(36, 10)[0] > 200);
        assert_eq!(img.get_pixel(39, 10), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn single_point_makes_a_dot() {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 0]));
        stroke_polyline(&mut img, &[(5.0, 5.0)], [0, 0, 255, 255], 4.0);
        assert_eq!(img.get_pixel(5, 5), &Rgba([0, 0, 255, 255]));
        assert_eq!(img.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn points_outside_the_buffer_are_clipped() {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        stroke_polyline(&mut img, &[(-50.0, -50.0), (-20.0, -20.0)], [255, 255, 255, 255], 6.0);
        assert!(img.pixels().all(|p| *p == Rgba([0, 0, 0, 255])));
    }

    #[test]
    fn translucent_color_blends_over_background() {
        let mut px = [0u8, 0, 0, 255];
        blend_pixel(&mut px, [255, 255, 255, 128], 1.0);
        assert!(px[0] > 120 && px[0] < 136);
        assert_eq!(px[3], 255);
    }
}
