use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use image::RgbaImage;
#[cfg(not(feature = "system-fonts"))]
use std::path::PathBuf;

use crate::components::colors::Color;
use crate::ops::brush::blend_pixel;

/// Lay out a single line of text with the pen starting at x=0 on the baseline.
/// Returns `(glyphs, total_width)`; glyph positions are baseline origins.
pub fn layout_line(font: &FontArc, text: &str, font_size: f32) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    (glyphs, cursor_x)
}

/// Rasterize `text` into `img` with its alphabetic baseline starting at `origin`.
///
/// Newlines are not honored; the text is drawn on one line. Glyph coverage is
/// accumulated into a scratch buffer first so overlapping glyph edges are
/// blended once. Anything falling outside the image is clipped.
pub fn stamp_text(
    img: &mut RgbaImage,
    font: &FontArc,
    text: &str,
    font_size: f32,
    origin: (f32, f32),
    color: Color,
) {
    let (glyphs, _) = layout_line(font, text, font_size);
    if glyphs.is_empty() || img.width() == 0 || img.height() == 0 {
        return;
    }

    // Bounds from glyph_bounds (no outlining needed), in image space
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for &(glyph_id, gx) in &glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(origin.0 + gx, origin.1));
        let b = font.glyph_bounds(&glyph);
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let x0 = (min_x.floor() as i64 - 1).max(0);
    let y0 = (min_y.floor() as i64 - 1).max(0);
    let x1 = (max_x.ceil() as i64 + 1).min(img.width() as i64);
    let y1 = (max_y.ceil() as i64 + 1).min(img.height() as i64);
    if x0 >= x1 || y0 >= y1 {
        return;
    }
    let buf_w = (x1 - x0) as usize;
    let buf_h = (y1 - y0) as usize;
    let mut coverage = vec![0.0f32; buf_w * buf_h];

    for &(glyph_id, gx) in &glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(origin.0 + gx, origin.1));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let b = outlined.px_bounds();
        outlined.draw(|px, py, cov| {
            let ix = b.min.x as i64 + px as i64 - x0;
            let iy = b.min.y as i64 + py as i64 - y0;
            if ix >= 0 && iy >= 0 && (ix as usize) < buf_w && (iy as usize) < buf_h {
                let idx = iy as usize * buf_w + ix as usize;
                coverage[idx] = coverage[idx].max(cov);
            }
        });
    }

    for row in 0..buf_h {
        for col in 0..buf_w {
            let cov = coverage[row * buf_w + col];
            if cov > 0.001 {
                let px = img.get_pixel_mut(x0 as u32 + col as u32, y0 as u32 + row as u32);
                blend_pixel(&mut px.0, color, cov.min(1.0));
            }
        }
    }
}

/// Load a font for a CSS-style family name ("sans-serif", "serif",
/// "monospace") or a concrete family title.
#[cfg(feature = "system-fonts")]
pub fn load_system_font(family: &str) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let name = match family.trim().to_ascii_lowercase().as_str() {
        "sans-serif" | "sans" => FamilyName::SansSerif,
        "serif" => FamilyName::Serif,
        "monospace" => FamilyName::Monospace,
        _ => FamilyName::Title(family.trim().to_string()),
    };

    let handle = SystemSource::new()
        .select_best_match(&[name, FamilyName::SansSerif], &Properties::new())
        .ok()?;
    let font_data = handle.load().ok()?;
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}

/// Load a font for a CSS-style family name by scanning the usual font
/// directories. Generic families map onto well-known files; any other name is
/// matched against file stems.
#[cfg(not(feature = "system-fonts"))]
pub fn load_system_font(family: &str) -> Option<FontArc> {
    let candidates = font_files();
    let family = family.trim().to_ascii_lowercase();
    let preferred: &[&str] = match family.as_str() {
        "sans-serif" | "sans" => &["dejavusans", "liberationsans-regular", "arial", "helvetica", "notosans-regular"],
        "serif" => &["dejavuserif", "liberationserif-regular", "times", "notoserif-regular"],
        "monospace" => &["dejavusansmono", "liberationmono-regular", "consola", "menlo", "courier"],
        _ => &[],
    };
    let wanted: String = family.chars().filter(|c| !c.is_whitespace()).collect();

    let stem = |p: &PathBuf| {
        p.file_stem()
            .map(|s| s.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
    };

    let pick = preferred
        .iter()
        .find_map(|name| candidates.iter().find(|p| stem(p) == *name))
        .or_else(|| {
            if wanted.is_empty() || !preferred.is_empty() {
                None
            } else {
                candidates.iter().find(|p| stem(p).starts_with(&wanted))
            }
        })
        .or_else(|| candidates.first());

    let bytes = std::fs::read(pick?).ok()?;
    FontArc::try_from_vec(bytes).ok()
}

#[cfg(not(feature = "system-fonts"))]
fn font_files() -> Vec<PathBuf> {
    let mut dirs = vec![
        "/usr/share/fonts".to_string(),
        "/usr/local/share/fonts".to_string(),
        "/System/Library/Fonts".to_string(),
        "/Library/Fonts".to_string(),
        "C:/Windows/Fonts".to_string(),
    ];
    if let Ok(home) = std::env::var("HOME") {
        dirs.push(format!("{home}/.fonts"));
        dirs.push(format!("{home}/.local/share/fonts"));
    }

    let mut out = Vec::new();
    for dir in dirs {
        for ext in ["ttf", "otf", "TTF"] {
            let pattern = format!("{dir}/**/*.{ext}");
            let Ok(paths) = glob::glob(&pattern) else { continue };
            out.extend(paths.flatten());
        }
    }
    out.sort();
    out
}
