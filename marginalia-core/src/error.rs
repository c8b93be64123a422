use thiserror::Error;

use crate::PageNumber;

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("page {page} is outside the document (1..={page_count})")]
    InvalidPage { page: PageNumber, page_count: usize },
    #[error("no text editor is open")]
    NoActiveEditor,
    #[error("unsupported annotation file version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Error)]
pub enum RenderError {
    /// The task was superseded or the page was evicted. Never shown to the user.
    #[error("render of page {0} was cancelled")]
    Cancelled(PageNumber),
    #[error("page {page} failed to render: {reason}")]
    Failed { page: PageNumber, reason: String },
}

impl RenderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RenderError::Cancelled(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid color {0:?}, expected #rgb or #rrggbb")]
    InvalidColor(String),
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("failed to read configuration file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration file")]
    Parse(#[from] toml::de::Error),
}
