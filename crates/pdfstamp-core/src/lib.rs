//! Layered text annotation for PDF documents
//!
//! An ordered history of positioned text operations is replayed onto an
//! immutable base document for every preview and export, so undo and
//! removal never have to reverse earlier edits.
//!
//! - [`RenderEngine`]: replays operations onto a fresh document instance
//! - [`AnnotationHistory`]: the ordered, editable list of committed operations
//! - [`DocumentSession`]: one uploaded document, its history and draft
//! - [`pages`]: selection parsing plus keep/drop/merge page-set operations

pub mod document;
pub mod error;
pub mod export;
pub mod fonts;
pub mod operations;
pub mod pages;
pub mod raster;
pub mod render;
pub mod session;

pub use document::{get_page_count, page_box, page_dimensions, PageBox, SaveOptions};
pub use error::{Result, StampError};
pub use export::{ExportArtifact, ExportKind};
pub use fonts::{FontCatalog, FontSource, DEFAULT_FONT_TABLE};
pub use operations::{AnnotationHistory, FontReference, Point, PositionedTextOp, Rgb, StandardFont};
pub use pages::{
    human_readable, merge_documents, parse_selection, select_drop, select_keep,
    try_parse_selection,
};
pub use raster::{PageRasterizer, RenderedPage, DEFAULT_PREVIEW_DPI};
pub use render::{RenderEngine, RenderedDocument};
pub use session::{DocumentSession, SessionConfig, TextDraft};

#[cfg(feature = "pdfium")]
pub use raster::PdfiumRasterizer;
