//! Capabilities consumed from the PDF library: base page rasterization and text layout.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::RenderError;
use crate::geometry::{Point, Rect};
use crate::task::CancellationToken;
use crate::{DocumentInfo, PageNumber};

/// Unscaled page dimensions in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Canvas pixel dimensions at `scale`, floored like a canvas allocation.
    pub fn pixels(&self, scale: f32) -> (u32, u32) {
        let width = (self.width * scale).floor().max(1.0) as u32;
        let height = (self.height * scale).floor().max(1.0) as u32;
        (width, height)
    }
}

/// Base content is always produced in its original colors; dark mode is applied when
/// layers are composited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterRequest {
    pub page: PageNumber,
    pub scale: f32,
}

/// RGBA8 pixels, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// One positioned run of page text, in canvas pixels at the request's scale.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub bounds: Rect,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLayout {
    pub runs: Vec<TextRun>,
}

#[derive(Debug, Clone)]
pub struct RasterOutput {
    pub image: RenderImage,
    pub text: TextLayout,
}

/// Produces the base content of pages. Implementations should check the token between
/// expensive steps and return [`RenderError::Cancelled`] once it is set.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    async fn rasterize(
        &self,
        request: RasterRequest,
        cancel: CancellationToken,
    ) -> Result<RasterOutput, RenderError>;
}

#[async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn PageRasterizer>>;
}

/// Selectable text overlay of a materialized page.
#[derive(Debug, Clone, Default)]
pub struct TextLayer {
    runs: Vec<TextRun>,
}

impl TextLayer {
    pub fn populate(&mut self, layout: TextLayout) {
        self.runs = layout.runs;
    }

    pub fn clear(&mut self) {
        self.runs.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    /// Rectangles of the runs a drag from `start` to `end` selects, in reading order.
    pub fn select(&self, start: Point, end: Point) -> Vec<Rect> {
        let region = Rect::from_corners(start, end);
        self.runs
            .iter()
            .filter(|run| run.bounds.intersects(&region))
            .map(|run| run.bounds)
            .collect()
    }

    pub fn selected_text(&self, start: Point, end: Point) -> String {
        let region = Rect::from_corners(start, end);
        self.runs
            .iter()
            .filter(|run| run.bounds.intersects(&region))
            .map(|run| run.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
