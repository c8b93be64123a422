//! Annotation engine and page lifecycle of the marginalia PDF viewer.
//!
//! [`AnnotationSession`] owns every annotation command of an open document together with
//! its undo history. [`InputController`] turns pointer, selection and keyboard input into
//! commands for the active tool, and [`PageLifecycleManager`] decides which pages hold
//! rendered surfaces at any moment. Drawing lives in `marginalia-render`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod command;
pub mod config;
pub mod error;
pub mod geometry;
pub mod history;
pub mod input;
pub mod lifecycle;
pub mod persistence;
pub mod raster;
pub mod session;
pub mod store;
pub mod task;
pub mod tool;

pub use command::{Annotation, BlendMode, Command, CommandId, FontSpec, FontStyle, FontWeight, StrokeStyle};
pub use config::{AnnotationDefaults, LifecycleConfig, ViewerConfig, ZoomMode};
pub use error::{AnnotationError, ConfigError, RenderError};
pub use geometry::{Color, Point, Rect};
pub use input::{
    shortcut_for, ApproximateMetrics, EditorOutcome, InputController, KeyChord, PointerOutcome,
    PointerTarget, SelectionEnd, Shortcut, TextEditor, TextMetrics,
};
pub use lifecycle::{
    LifecycleAction, PageLayout, PageLifecycleManager, PageRenderState, RenderCompletion, Viewport,
};
pub use persistence::{
    persist_session, restore_session, AnnotationSnapshot, AnnotationStore, FileAnnotationStore,
    MemoryAnnotationStore,
};
pub use raster::{
    DocumentProvider, PageRasterizer, PageSize, RasterOutput, RasterRequest, RenderImage,
    TextLayer, TextLayout, TextRun,
};
pub use session::{AnnotationSession, HistoryOutcome, SessionEvent};
pub use store::PageAnnotationSet;
pub use task::{CancellationToken, RenderTaskTracker, RenderTicket};
pub use tool::{PointerRouting, Tool, ToolState};

/// 1-indexed page number.
pub type PageNumber = usize;

pub type DocumentId = Uuid;

const DOCUMENT_NAMESPACE: Uuid = Uuid::from_u128(0x3f0c_2a9e_6d41_5b7a_9e12_c4d8_07a1_b5e3);

/// Stable id for a document, derived from its canonical path.
pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: usize,
    /// Unscaled size of every page, in page order.
    pub page_sizes: Vec<PageSize>,
    pub metadata: DocumentMetadata,
}

impl DocumentInfo {
    pub fn page_size(&self, page: PageNumber) -> Option<PageSize> {
        page.checked_sub(1)
            .and_then(|idx| self.page_sizes.get(idx))
            .copied()
    }
}
