//! RGBA drawing surfaces with canvas-style compositing.

use image::{Rgba, RgbaImage};
use marginalia_core::{BlendMode, Color, Point, Rect, RenderImage, StrokeStyle};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composite {
    SourceOver,
    Multiply,
    /// Removes destination coverage by the source's alpha; color is ignored.
    DestinationOut,
}

impl Composite {
    pub fn for_stroke(style: &StrokeStyle) -> Self {
        if style.erase {
            Composite::DestinationOut
        } else {
            Composite::for_blend(style.blend_mode)
        }
    }

    pub fn for_blend(mode: BlendMode) -> Self {
        match mode {
            BlendMode::Normal => Composite::SourceOver,
            BlendMode::Multiply => Composite::Multiply,
        }
    }
}

/// Straight (non-premultiplied) RGBA surface, transparent when created.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    image: RgbaImage,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn from_render_image(image: RenderImage) -> Option<Self> {
        RgbaImage::from_raw(image.width, image.height, image.pixels).map(|image| Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image.get_pixel(x, y).0
    }

    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    /// Reallocates at the new size; content is dropped.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width() != width || self.height() != height {
            self.image = RgbaImage::new(width, height);
        } else {
            self.clear();
        }
    }

    pub fn is_blank(&self) -> bool {
        self.image.pixels().all(|p| p.0[3] == 0)
    }

    pub fn into_render_image(self) -> RenderImage {
        RenderImage {
            width: self.image.width(),
            height: self.image.height(),
            pixels: self.image.into_raw(),
        }
    }

    /// Paints `color` over the pixel with `alpha` coverage.
    pub fn blend(&mut self, x: u32, y: u32, color: Color, alpha: f32, composite: Composite) {
        if x >= self.width() || y >= self.height() {
            return;
        }
        let pixel = self.image.get_pixel_mut(x, y);
        blend_pixel(&mut pixel.0, color.to_array(), alpha, composite);
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color, alpha: f32, composite: Composite) {
        let Some((x0, y0, x1, y1)) = self.clip(rect.left, rect.top, rect.right(), rect.bottom())
        else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend(x, y, color, alpha, composite);
            }
        }
    }

    /// Strokes a connected polyline with round caps and joins. Every covered pixel is
    /// painted once, so a translucent stroke does not darken where segments meet.
    pub fn stroke_polyline(&mut self, points: &[Point], style: &StrokeStyle) {
        let Some(first) = points.first() else {
            return;
        };
        let half = (style.width / 2.0).max(0.5);
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let Some((x0, y0, x1, y1)) =
            self.clip(min_x - half, min_y - half, max_x + half, max_y + half)
        else {
            return;
        };
        let cols = (x1 - x0) as usize;
        let mut coverage = vec![false; cols * (y1 - y0) as usize];

        let mut mark = |a: Point, b: Point| {
            let Some((sx0, sy0, sx1, sy1)) = clip_to(
                (x0, y0, x1, y1),
                a.x.min(b.x) - half,
                a.y.min(b.y) - half,
                a.x.max(b.x) + half,
                a.y.max(b.y) + half,
            ) else {
                return;
            };
            for y in sy0..sy1 {
                for x in sx0..sx1 {
                    let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                    if distance_to_segment(center, a, b) <= half {
                        coverage[(y - y0) as usize * cols + (x - x0) as usize] = true;
                    }
                }
            }
        };
        if points.len() == 1 {
            mark(*first, *first);
        }
        for pair in points.windows(2) {
            mark(pair[0], pair[1]);
        }

        let composite = Composite::for_stroke(style);
        for (idx, covered) in coverage.iter().enumerate() {
            if *covered {
                let x = x0 + (idx % cols) as u32;
                let y = y0 + (idx / cols) as u32;
                self.blend(x, y, style.color, style.alpha, composite);
            }
        }
    }

    /// Composites `layer` of the same size onto this surface.
    pub fn composite_from(&mut self, layer: &RasterSurface, composite: Composite) {
        let source: &[u8] = &layer.image;
        let target: &mut [u8] = &mut self.image;
        target
            .par_chunks_exact_mut(4)
            .zip(source.par_chunks_exact(4))
            .for_each(|(dst, src)| {
                if src[3] == 0 {
                    return;
                }
                let mut pixel = [dst[0], dst[1], dst[2], dst[3]];
                blend_pixel(&mut pixel, [src[0], src[1], src[2]], src[3] as f32 / 255.0, composite);
                dst.copy_from_slice(&pixel);
            });
    }

    /// Inverts color channels in place, leaving alpha alone.
    pub fn invert(&mut self) {
        invert_pixels(&mut self.image);
    }

    fn clip(&self, left: f32, top: f32, right: f32, bottom: f32) -> Option<(u32, u32, u32, u32)> {
        clip_to((0, 0, self.width(), self.height()), left, top, right, bottom)
    }
}

fn clip_to(
    bounds: (u32, u32, u32, u32),
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
) -> Option<(u32, u32, u32, u32)> {
    let (bx0, by0, bx1, by1) = bounds;
    let x0 = (left.floor().max(bx0 as f32) as u32).min(bx1);
    let y0 = (top.floor().max(by0 as f32) as u32).min(by1);
    let x1 = (right.ceil().max(0.0) as u32).min(bx1);
    let y1 = (bottom.ceil().max(0.0) as u32).min(by1);
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f32::EPSILON {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance_to(Point::new(a.x + t * dx, a.y + t * dy))
}

/// Blends one straight-alpha RGBA pixel.
pub fn blend_pixel(pixel: &mut [u8; 4], color: [u8; 3], alpha: f32, composite: Composite) {
    let src_a = alpha.clamp(0.0, 1.0);
    let dst_a = pixel[3] as f32 / 255.0;
    if composite == Composite::DestinationOut {
        let out_a = dst_a * (1.0 - src_a);
        if out_a <= 0.0 {
            *pixel = [0, 0, 0, 0];
        } else {
            pixel[3] = to_channel(out_a);
        }
        return;
    }
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let dst = pixel[c] as f32 / 255.0;
        let mut src = color[c] as f32 / 255.0;
        if composite == Composite::Multiply {
            src = (1.0 - dst_a) * src + dst_a * src * dst;
        }
        let out = (src * src_a + dst * dst_a * (1.0 - src_a)) / out_a;
        pixel[c] = to_channel(out);
    }
    pixel[3] = to_channel(out_a);
}

fn to_channel(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Inverts color channels in place, leaving alpha.
pub fn invert_pixels(pixels: &mut [u8]) {
    for chunk in pixels.chunks_exact_mut(4) {
        chunk[0] = 255 - chunk[0];
        chunk[1] = 255 - chunk[1];
        chunk[2] = 255 - chunk[2];
    }
}
