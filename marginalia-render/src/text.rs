//! Bitmap glyph painting for text annotations.
//!
//! Glyphs come from the 8x8 basic font, stretched to cells whose advance matches
//! [`ApproximateMetrics`] so painted text lines up with hit-testing.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use marginalia_core::{ApproximateMetrics, Color, FontSpec, FontStyle, FontWeight, Point};

use crate::surface::{Composite, RasterSurface};

const ITALIC_SLANT: f32 = 0.2;

/// Paints `content` with its top-left corner at `origin`. Lines are one font size apart.
pub fn paint_text(
    surface: &mut RasterSurface,
    content: &str,
    origin: Point,
    font: FontSpec,
    color: Color,
    alpha: f32,
) {
    let advance = ApproximateMetrics::advance(font);
    let size = font.size;
    if advance <= 0.0 || size <= 0.0 {
        return;
    }
    for (line_idx, line) in content.lines().enumerate() {
        let top = origin.y + line_idx as f32 * size;
        for (col, ch) in line.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let left = origin.x + col as f32 * advance;
            paint_glyph(surface, ch, left, top, advance, font, color, alpha);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn paint_glyph(
    surface: &mut RasterSurface,
    ch: char,
    left: f32,
    top: f32,
    advance: f32,
    font: FontSpec,
    color: Color,
    alpha: f32,
) {
    let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
        return;
    };
    let size = font.size;
    let bold = font.weight == FontWeight::Bold;
    let slant = if font.style == FontStyle::Italic {
        ITALIC_SLANT
    } else {
        0.0
    };

    let x_start = left.floor().max(0.0) as u32;
    let x_end = (left + advance + size * slant + 1.0).ceil().max(0.0) as u32;
    let y_start = top.floor().max(0.0) as u32;
    let y_end = (top + size).ceil().max(0.0) as u32;
    for y in y_start..y_end.min(surface.height()) {
        let v = (y as f32 + 0.5 - top) / size;
        if !(0.0..1.0).contains(&v) {
            continue;
        }
        let row = glyph[(v * 8.0) as usize];
        let shift = (1.0 - v) * size * slant;
        for x in x_start..x_end.min(surface.width()) {
            let u = (x as f32 + 0.5 - left - shift) / advance;
            let covered = |u: f32| (0.0..1.0).contains(&u) && (row >> ((u * 8.0) as u32)) & 1 == 1;
            let bold_u = u - 1.0 / advance;
            if covered(u) || (bold && covered(bold_u)) {
                surface.blend(x, y, color, alpha, Composite::SourceOver);
            }
        }
    }
}
