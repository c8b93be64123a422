//! Pdfium-backed base page rasterizer.

use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use marginalia_core::{
    document_id_for_path, CancellationToken, DocumentInfo, DocumentMetadata, DocumentProvider,
    PageNumber, PageRasterizer, PageSize, RasterOutput, RasterRequest, Rect, RenderError,
    RenderImage, TextLayout, TextRun,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

/// Overrides the pdfium library location at runtime.
pub const PDFIUM_LIBRARY_ENV: &str = "MARGINALIA_PDFIUM_LIBRARY_PATH";

pub struct PdfiumDocumentProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumDocumentProvider {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumDocumentProvider {
    async fn open(&self, path: &Path) -> Result<Arc<dyn PageRasterizer>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let info = build_document_info(&self.pdfium, &absolute)?;
        debug!(path = %absolute.display(), pages = info.page_count, "document opened");
        Ok(Arc::new(PdfiumDocument {
            handle: Arc::new(DocumentHandle::new(Arc::clone(&self.pdfium), absolute)),
            info,
        }))
    }
}

struct PdfiumDocument {
    handle: Arc<DocumentHandle>,
    info: DocumentInfo,
}

/// Lazily loaded pdfium document, shared with blocking render tasks.
struct DocumentHandle {
    document: Mutex<Option<PdfDocument<'static>>>,
    path: PathBuf,
    pdfium: Arc<Pdfium>,
}

impl DocumentHandle {
    fn new(pdfium: Arc<Pdfium>, path: PathBuf) -> Self {
        Self {
            document: Mutex::new(None),
            path,
            pdfium,
        }
    }

    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .with_context(|| format!("failed to open {:?}", self.path))?;
        // SAFETY: the document borrows the bindings owned by `self.pdfium`. It is cached in
        // `self.document`, which is declared before `pdfium` and therefore dropped first, so
        // the borrow never outlives the bindings.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            *guard = Some(self.open_document()?);
        }
        let document = guard
            .as_ref()
            .ok_or_else(|| anyhow!("document {:?} is not loaded", self.path))?;
        f(document)
    }

    fn render_internal(
        &self,
        document: &PdfDocument<'_>,
        request: &RasterRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<RasterOutput>> {
        let index = request
            .page
            .checked_sub(1)
            .ok_or_else(|| anyhow!("page numbers start at 1"))?;
        let page_index: PdfPageIndex = index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", request.page))?;
        let page = document
            .pages()
            .get(page_index)
            .with_context(|| format!("page {} out of range", request.page))?;

        let scale = request.scale.max(0.1);
        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", request.page))?;
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let pixels = bitmap.as_image().to_rgba8().into_raw();
        let image = RenderImage {
            width: u32::try_from(bitmap.width()).unwrap_or_default(),
            height: u32::try_from(bitmap.height()).unwrap_or_default(),
            pixels,
        };

        let text = match page.text() {
            Ok(text) => text_layout(&text, page.height().value, scale),
            Err(err) => {
                warn!(?err, page = request.page, "failed to extract text layer");
                TextLayout::default()
            }
        };
        Ok(Some(RasterOutput { image, text }))
    }
}

#[async_trait]
impl PageRasterizer for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    /// Pdfium work runs on the blocking pool; cancellation is checked around it.
    #[instrument(skip(self, cancel))]
    async fn rasterize(
        &self,
        request: RasterRequest,
        cancel: CancellationToken,
    ) -> Result<RasterOutput, RenderError> {
        let page = request.page;
        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled(page));
        }
        let handle = Arc::clone(&self.handle);
        let task_cancel = cancel.clone();
        let rendered = render_blocking(page, move || {
            handle.with_document(|document| handle.render_internal(document, &request, &task_cancel))
        })
        .await?;
        match rendered {
            Some(output) if !cancel.is_cancelled() => Ok(output),
            _ => Err(RenderError::Cancelled(page)),
        }
    }
}

/// Runs pdfium work on the blocking pool so render tasks never stall the runtime.
async fn render_blocking<T, F>(page: PageNumber, work: F) -> Result<T, RenderError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| RenderError::Failed {
            page,
            reason: format!("render task join error: {err}"),
        })?
        .map_err(|err| RenderError::Failed {
            page,
            reason: format!("{err:#}"),
        })
}

/// Text segments as runs in canvas pixels. Pdfium's origin is bottom-left.
fn text_layout(text: &PdfPageText<'_>, page_height: f32, scale: f32) -> TextLayout {
    let runs = text
        .segments()
        .iter()
        .filter_map(|segment| {
            let content = segment.text();
            if content.trim().is_empty() {
                return None;
            }
            let bounds = segment.bounds();
            let left = bounds.left().value;
            let right = bounds.right().value;
            let top = bounds.top().value;
            let bottom = bounds.bottom().value;
            Some(TextRun {
                text: content,
                bounds: Rect::new(
                    left * scale,
                    (page_height - top) * scale,
                    (right - left) * scale,
                    (top - bottom) * scale,
                ),
            })
        })
        .collect();
    TextLayout { runs }
}

fn build_document_info(pdfium: &Pdfium, path: &Path) -> Result<DocumentInfo> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .with_context(|| format!("failed to open {:?}", path))?;
    let page_sizes: Vec<PageSize> = document
        .pages()
        .iter()
        .map(|page| PageSize::new(page.width().value, page.height().value))
        .collect();
    let metadata = document.metadata();

    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().to_owned());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|t| t.value().to_owned());

    let page_count: PageNumber = page_sizes.len();
    Ok(DocumentInfo {
        id: document_id_for_path(path),
        path: path.to_path_buf(),
        page_count,
        page_sizes,
        metadata: DocumentMetadata { title, author },
    })
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    match std::env::var(PDFIUM_LIBRARY_ENV) {
        Ok(path) if !path.is_empty() => match Pdfium::bind_to_library(&path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!("failed to load Pdfium from {}={}: {}", PDFIUM_LIBRARY_ENV, path, err);
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                PDFIUM_LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}
