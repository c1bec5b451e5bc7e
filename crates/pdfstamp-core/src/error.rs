use thiserror::Error;

pub type Result<T> = std::result::Result<T, StampError>;

#[derive(Error, Debug)]
pub enum StampError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("Page index {index} is out of range (document has {page_count} pages)")]
    PageIndex { index: usize, page_count: usize },

    #[error("Font '{name}' could not be resolved: {reason}")]
    FontResolution { name: String, reason: String },

    #[error("History index {index} is out of range (history has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid page selection: {0}")]
    MalformedSelection(String),

    #[error("Operation would produce no output: {0}")]
    EmptyResult(String),

    #[error("Invalid text operation: {0}")]
    InvalidOperation(String),

    #[error("PDF operation failed: {0}")]
    Operation(String),

    #[error("Rasterization failed: {0}")]
    Raster(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StampError {
    /// Errors that abort a render without producing any output.
    pub fn is_render_fatal(&self) -> bool {
        matches!(
            self,
            StampError::PageIndex { .. } | StampError::FontResolution { .. }
        )
    }
}
