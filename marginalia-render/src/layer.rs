//! Per-page layers and annotation replay.

use image::Rgba;
use marginalia_core::{
    Annotation, Color, Command, FontSpec, Point, RasterOutput, Rect, RenderImage, StrokeStyle,
    TextLayer,
};
use tracing::{debug, trace};

use crate::surface::{Composite, RasterSurface};
use crate::text::paint_text;

/// The surfaces a materialized page owns. Dropping it reclaims them.
#[derive(Debug, Clone)]
pub struct PageSurfaces {
    /// Base content from the rasterizer; white until the first render lands.
    pub base: RasterSurface,
    /// Highlight rectangles, composited onto the base with multiply.
    pub highlight: RasterSurface,
    /// Strokes and text; erasing only ever touches this layer.
    pub annotation: RasterSurface,
    pub text_layer: TextLayer,
    scale: f32,
}

impl PageSurfaces {
    pub fn new(width: u32, height: u32, scale: f32) -> Self {
        Self {
            base: white_surface(width, height),
            highlight: RasterSurface::new(width, height),
            annotation: RasterSurface::new(width, height),
            text_layer: TextLayer::default(),
            scale,
        }
    }

    /// Zoom the surfaces are laid out for.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn size(&self) -> (u32, u32) {
        (self.annotation.width(), self.annotation.height())
    }

    /// Reallocates every layer for a new zoom. The old base stays out of view until the
    /// next render lands.
    pub fn resize(&mut self, width: u32, height: u32, scale: f32) {
        self.base = white_surface(width, height);
        self.highlight.resize(width, height);
        self.annotation.resize(width, height);
        self.text_layer.clear();
        self.scale = scale;
    }

    /// Installs a finished base render and its text layer.
    pub fn apply_base(&mut self, output: RasterOutput) {
        let (width, height) = self.size();
        let image = output.image;
        if image.width == width && image.height == height {
            if let Some(surface) = RasterSurface::from_render_image(image) {
                self.base = surface;
            }
        } else {
            debug!(
                expected = ?(width, height),
                got = ?(image.width, image.height),
                "base render size differs from layout, copying overlap"
            );
            let mut base = white_surface(width, height);
            copy_overlap(&mut base, &image);
            self.base = base;
        }
        self.text_layer.populate(output.text);
    }

    /// Flattens base, highlight and annotation layers into one image.
    pub fn composite(&self, dark_mode: bool) -> RenderImage {
        let mut flat = self.base.clone();
        if dark_mode {
            flat.invert();
        }
        flat.composite_from(&self.highlight, Composite::Multiply);
        flat.composite_from(&self.annotation, Composite::SourceOver);
        flat.into_render_image()
    }
}

fn white_surface(width: u32, height: u32) -> RasterSurface {
    let mut surface = RasterSurface::new(width, height);
    surface.fill_rect(
        Rect::new(0.0, 0.0, width as f32, height as f32),
        Color::rgb(255, 255, 255),
        1.0,
        Composite::SourceOver,
    );
    surface
}

fn copy_overlap(target: &mut RasterSurface, image: &RenderImage) {
    let width = target.width().min(image.width);
    let height = target.height().min(image.height);
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * image.width + x) * 4) as usize;
            let Some(px) = image.pixels.get(idx..idx + 4) else {
                return;
            };
            let alpha = px[3] as f32 / 255.0;
            target.blend(x, y, Color::rgb(px[0], px[1], px[2]), alpha, Composite::SourceOver);
        }
    }
    trace!(width, height, "copied base overlap");
}

/// Replays command lists onto page layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerRenderer;

impl LayerRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Clears the highlight and annotation layers and replays every command in order.
    /// The base layer is never touched.
    pub fn redraw_page(&self, surfaces: &mut PageSurfaces, commands: &[Annotation]) {
        surfaces.highlight.clear();
        surfaces.annotation.clear();
        let scale = surfaces.scale;
        for annotation in commands {
            let command = annotation.at_scale(scale);
            match command.as_ref() {
                Command::Path { .. } | Command::Eraser { .. } => {
                    if let Some((style, points)) = command.stroke() {
                        surfaces.annotation.stroke_polyline(points, &style);
                    }
                }
                Command::Text {
                    content,
                    x,
                    y,
                    color,
                    font_size,
                    weight,
                    style,
                    alpha,
                    ..
                } => {
                    let font = FontSpec {
                        size: *font_size,
                        weight: *weight,
                        style: *style,
                    };
                    paint_text(
                        &mut surfaces.annotation,
                        content,
                        Point::new(*x, *y),
                        font,
                        *color,
                        *alpha,
                    );
                }
                Command::Highlight {
                    color,
                    alpha,
                    rects,
                    ..
                } => {
                    for rect in rects {
                        surfaces
                            .highlight
                            .fill_rect(*rect, *color, *alpha, Composite::Multiply);
                    }
                }
            }
        }
        trace!(commands = commands.len(), "page layers replayed");
    }

    /// Live preview of a stroke segment, drawn straight onto the annotation layer.
    /// The next full redraw replaces it.
    pub fn paint_preview(
        &self,
        surfaces: &mut PageSurfaces,
        from: Point,
        to: Point,
        style: &StrokeStyle,
    ) {
        surfaces.annotation.stroke_polyline(&[from, to], style);
    }
}

/// Pixel at (`x`, `y`) of a flattened image.
pub fn pixel_at(image: &RenderImage, x: u32, y: u32) -> Option<Rgba<u8>> {
    if x >= image.width || y >= image.height {
        return None;
    }
    let idx = ((y * image.width + x) * 4) as usize;
    image
        .pixels
        .get(idx..idx + 4)
        .map(|px| Rgba([px[0], px[1], px[2], px[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use marginalia_core::{BlendMode, FontStyle, FontWeight, TextLayout};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use uuid::Uuid;

    fn annotation(command: Command) -> Annotation {
        Annotation::new(command, 1.0)
    }

    fn random_commands(seed: u64, count: usize) -> Vec<Annotation> {
        let mut rng = StdRng::seed_from_u64(seed);
        let point =
            |rng: &mut StdRng| Point::new(rng.gen_range(0.0..64.0), rng.gen_range(0.0..64.0));
        (0..count)
            .map(|_| {
                let command = match rng.gen_range(0..4) {
                    0 => Command::Path {
                        page: 1,
                        color: Color::PALETTE[rng.gen_range(0..Color::PALETTE.len())],
                        stroke_width: rng.gen_range(1.0..6.0),
                        alpha: rng.gen_range(0.2..1.0),
                        blend_mode: if rng.gen_bool(0.5) {
                            BlendMode::Normal
                        } else {
                            BlendMode::Multiply
                        },
                        points: (0..rng.gen_range(2..6)).map(|_| point(&mut rng)).collect(),
                    },
                    1 => Command::Eraser {
                        page: 1,
                        stroke_width: rng.gen_range(1.0..4.0),
                        points: (0..rng.gen_range(2..5)).map(|_| point(&mut rng)).collect(),
                    },
                    2 => Command::Text {
                        page: 1,
                        content: "note".into(),
                        x: rng.gen_range(0.0..40.0),
                        y: rng.gen_range(0.0..50.0),
                        color: Color::SLATE,
                        font_size: rng.gen_range(8.0..16.0),
                        weight: FontWeight::Normal,
                        style: FontStyle::Italic,
                        alpha: 1.0,
                    },
                    _ => {
                        let origin = point(&mut rng);
                        Command::Highlight {
                            page: 1,
                            color: Color::YELLOW,
                            alpha: 0.4,
                            rects: vec![Rect::new(origin.x, origin.y, 20.0, 8.0)],
                        }
                    }
                };
                annotation(command)
            })
            .collect()
    }

    fn base_output(width: u32, height: u32, shade: u8) -> RasterOutput {
        RasterOutput {
            image: RenderImage {
                width,
                height,
                pixels: [shade, shade, shade, 255].repeat((width * height) as usize),
            },
            text: TextLayout::default(),
        }
    }

    #[test]
    fn replay_is_deterministic() {
        let renderer = LayerRenderer::new();
        let commands = random_commands(0x5eed, 40);

        let mut first = PageSurfaces::new(64, 64, 1.0);
        renderer.redraw_page(&mut first, &commands);
        let mut second = PageSurfaces::new(64, 64, 1.0);
        renderer.redraw_page(&mut second, &commands);
        assert_eq!(first.composite(false), second.composite(false));

        // Replaying over already painted layers gives the same result.
        renderer.redraw_page(&mut first, &commands);
        assert_eq!(first.composite(false), second.composite(false));
    }

    #[test]
    fn eraser_never_touches_the_base() {
        let renderer = LayerRenderer::new();
        let mut surfaces = PageSurfaces::new(32, 32, 1.0);
        surfaces.apply_base(base_output(32, 32, 90));
        let base_before = surfaces.base.image().clone();

        let commands = vec![
            annotation(Command::Path {
                page: 1,
                color: Color::RED,
                stroke_width: 4.0,
                alpha: 1.0,
                blend_mode: BlendMode::Normal,
                points: vec![Point::new(0.0, 16.0), Point::new(32.0, 16.0)],
            }),
            annotation(Command::Eraser {
                page: 1,
                stroke_width: 4.0,
                points: vec![Point::new(16.0, 0.0), Point::new(16.0, 32.0)],
            }),
        ];
        renderer.redraw_page(&mut surfaces, &commands);

        assert_eq!(surfaces.base.image(), &base_before);
        assert_eq!(surfaces.annotation.pixel(16, 16)[3], 0);
        assert_eq!(surfaces.annotation.pixel(4, 16)[3], 255);
        let flat = surfaces.composite(false);
        assert_eq!(pixel_at(&flat, 16, 16), Some(Rgba([90, 90, 90, 255])));
        assert_eq!(pixel_at(&flat, 4, 16), Some(Rgba([0xef, 0x44, 0x44, 255])));
    }

    #[test]
    fn highlights_and_strokes_live_on_separate_layers() {
        let renderer = LayerRenderer::new();
        let mut surfaces = PageSurfaces::new(20, 20, 1.0);
        let commands = vec![
            annotation(Command::Path {
                page: 1,
                color: Color::BLUE,
                stroke_width: 2.0,
                alpha: 1.0,
                blend_mode: BlendMode::Normal,
                points: vec![Point::new(0.0, 5.0), Point::new(20.0, 5.0)],
            }),
            annotation(Command::Highlight {
                page: 1,
                color: Color::YELLOW,
                alpha: 0.4,
                rects: vec![Rect::new(0.0, 0.0, 20.0, 10.0)],
            }),
            annotation(Command::Eraser {
                page: 1,
                stroke_width: 3.0,
                points: vec![Point::new(10.0, 0.0), Point::new(10.0, 10.0)],
            }),
        ];
        renderer.redraw_page(&mut surfaces, &commands);
        // The eraser cleared the stroke but left the highlight.
        assert_eq!(surfaces.annotation.pixel(10, 5)[3], 0);
        assert!(surfaces.highlight.pixel(10, 5)[3] > 0);
        assert_eq!(surfaces.annotation.pixel(2, 5)[3], 255);
    }

    #[test]
    fn commands_at_another_zoom_are_rescaled() {
        let renderer = LayerRenderer::new();
        let mut surfaces = PageSurfaces::new(40, 40, 2.0);
        let commands = vec![annotation(Command::Highlight {
            page: 1,
            color: Color::BLACK,
            alpha: 1.0,
            rects: vec![Rect::new(5.0, 5.0, 5.0, 5.0)],
        })];
        renderer.redraw_page(&mut surfaces, &commands);
        assert!(surfaces.highlight.pixel(18, 18)[3] > 0);
        assert_eq!(surfaces.highlight.pixel(22, 22)[3], 0);
    }

    #[test]
    fn dark_mode_inverts_only_the_base() {
        let mut surfaces = PageSurfaces::new(4, 4, 1.0);
        surfaces.apply_base(base_output(4, 4, 255));
        surfaces
            .annotation
            .blend(1, 1, Color::RED, 1.0, Composite::SourceOver);
        let flat = surfaces.composite(true);
        assert_eq!(pixel_at(&flat, 0, 0), Some(Rgba([0, 0, 0, 255])));
        assert_eq!(pixel_at(&flat, 1, 1), Some(Rgba([0xef, 0x44, 0x44, 255])));
    }

    #[test]
    fn mismatched_base_is_copied_into_layout_size() {
        let mut surfaces = PageSurfaces::new(4, 4, 1.0);
        surfaces.apply_base(base_output(3, 5, 10));
        assert_eq!(surfaces.base.width(), 4);
        assert_eq!(surfaces.base.pixel(0, 0), [10, 10, 10, 255]);
        assert_eq!(surfaces.base.pixel(3, 3), [255, 255, 255, 255]);
    }

    #[test]
    fn duplicate_commands_replay_independently() {
        let renderer = LayerRenderer::new();
        let command = Command::Path {
            page: 1,
            color: Color::BLACK,
            stroke_width: 2.0,
            alpha: 0.5,
            blend_mode: BlendMode::Normal,
            points: vec![Point::new(0.0, 2.0), Point::new(8.0, 2.0)],
        };
        let once = vec![Annotation {
            id: Uuid::new_v4(),
            scale: 1.0,
            command: command.clone(),
        }];
        let twice = vec![once[0].clone(), annotation(command)];
        let mut a = PageSurfaces::new(8, 4, 1.0);
        let mut b = PageSurfaces::new(8, 4, 1.0);
        renderer.redraw_page(&mut a, &once);
        renderer.redraw_page(&mut b, &twice);
        assert!(b.annotation.pixel(4, 1)[3] > a.annotation.pixel(4, 1)[3]);
    }
}
