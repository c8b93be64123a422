//! Page surfaces, annotation replay and base rendering for marginalia.

pub mod layer;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod surface;
pub mod text;
pub mod viewer;

pub use layer::{pixel_at, LayerRenderer, PageSurfaces};
#[cfg(feature = "pdf")]
pub use pdf::{PdfiumDocumentProvider, PDFIUM_LIBRARY_ENV};
pub use surface::{blend_pixel, invert_pixels, Composite, RasterSurface};
pub use text::paint_text;
pub use viewer::DocumentViewer;
