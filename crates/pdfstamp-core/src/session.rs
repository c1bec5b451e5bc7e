//! Editing session for a single uploaded document
//!
//! The session owns the immutable base bytes, the committed history and the
//! in-progress draft. Every preview and export re-derives the output from the
//! base bytes; nothing is rendered on top of an earlier render.

use crate::document::{get_page_count, SaveOptions};
use crate::error::{Result, StampError};
use crate::export::{ExportArtifact, ExportKind};
use crate::fonts::FontCatalog;
use crate::operations::{AnnotationHistory, FontReference, Point, PositionedTextOp, Rgb};
use crate::raster::{PageRasterizer, RenderedPage, DEFAULT_PREVIEW_DPI};
use crate::render::RenderEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Resolution of preview rasters
    pub preview_dpi: f32,
    /// Compact annotated exports
    pub compact_exports: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            preview_dpi: DEFAULT_PREVIEW_DPI,
            compact_exports: false,
        }
    }
}

/// The uncommitted op being edited
#[derive(Debug, Clone, PartialEq)]
pub struct TextDraft {
    pub page_index: usize,
    pub text: String,
    pub origin: Point,
    /// `None` when no font has been chosen
    pub font: Option<FontReference>,
    pub font_size: f64,
    pub line_spacing: f64,
    pub color: Rgb,
}

impl Default for TextDraft {
    fn default() -> Self {
        Self {
            page_index: 0,
            text: String::new(),
            origin: Point::new(50.0, 100.0),
            font: None,
            font_size: 30.0,
            line_spacing: 1.2,
            color: Rgb::RED,
        }
    }
}

impl TextDraft {
    /// The op this draft would commit, if it has both text and a font
    pub fn to_op(&self) -> Option<PositionedTextOp> {
        if self.text.is_empty() {
            return None;
        }
        Some(PositionedTextOp {
            page_index: self.page_index,
            text: self.text.clone(),
            origin: self.origin,
            font: self.font.clone()?,
            font_size: self.font_size,
            line_spacing: self.line_spacing,
            color: self.color,
        })
    }
}

pub struct DocumentSession {
    name: String,
    base: Arc<[u8]>,
    page_count: usize,
    history: AnnotationHistory,
    draft: TextDraft,
    fonts: FontCatalog,
    config: SessionConfig,
}

impl DocumentSession {
    /// Start a session on an uploaded document
    pub fn new(
        name: &str,
        bytes: Vec<u8>,
        fonts: FontCatalog,
        config: SessionConfig,
    ) -> Result<Self> {
        let page_count = get_page_count(&bytes)?;
        if page_count == 0 {
            return Err(StampError::EmptyResult(format!("'{}' has no pages", name)));
        }
        let draft = TextDraft {
            font: Some(fonts.default_reference()),
            ..TextDraft::default()
        };
        tracing::info!(name, page_count, "Opened document session");
        Ok(Self {
            name: name.to_string(),
            base: Arc::from(bytes),
            page_count,
            history: AnnotationHistory::new(),
            draft,
            fonts,
            config,
        })
    }

    /// Replace the document. History is discarded and the draft moves back
    /// to the first page.
    pub fn replace_document(&mut self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let page_count = get_page_count(&bytes)?;
        if page_count == 0 {
            return Err(StampError::EmptyResult(format!("'{}' has no pages", name)));
        }
        self.name = name.to_string();
        self.base = Arc::from(bytes);
        self.page_count = page_count;
        self.history.clear();
        self.draft.page_index = 0;
        tracing::info!(name, page_count, "Replaced session document");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Base bytes, shareable with concurrent readers
    pub fn base_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.base)
    }

    pub fn history(&self) -> &AnnotationHistory {
        &self.history
    }

    pub fn fonts(&self) -> &FontCatalog {
        &self.fonts
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn draft(&self) -> &TextDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut TextDraft {
        &mut self.draft
    }

    /// History entries with their current display index
    pub fn entries(&self) -> impl Iterator<Item = (usize, &PositionedTextOp)> {
        self.history.snapshot().iter().enumerate()
    }

    /// Commit the draft. Returns the new entry's index, or `None` when the
    /// draft has no text or its font does not resolve.
    pub fn commit(&mut self) -> Result<Option<usize>> {
        let Some(op) = self.draft.to_op() else {
            tracing::debug!("Draft incomplete, nothing to commit");
            return Ok(None);
        };
        if let Err(e) = self.fonts.resolve(&op.font) {
            tracing::debug!("Draft font unavailable, nothing to commit: {}", e);
            return Ok(None);
        }
        let index = self.history.append(op)?;
        tracing::info!(index, "Committed draft");
        Ok(Some(index))
    }

    /// Remove the most recent entry
    pub fn undo(&mut self) -> Option<PositionedTextOp> {
        let removed = self.history.pop();
        if removed.is_some() {
            tracing::info!(remaining = self.history.len(), "Undid last entry");
        }
        removed
    }

    /// Remove the entry at its current display index
    pub fn remove(&mut self, index: usize) -> Result<PositionedTextOp> {
        let removed = self.history.remove_at(index)?;
        tracing::info!(index, remaining = self.history.len(), "Removed entry");
        Ok(removed)
    }

    /// Rasterize `target_page_index` with the committed history plus
    /// `draft_op` when it targets that page
    pub fn render_preview(
        &self,
        target_page_index: usize,
        draft_op: Option<&PositionedTextOp>,
        rasterizer: &dyn PageRasterizer,
    ) -> Result<RenderedPage> {
        if target_page_index >= self.page_count {
            return Err(StampError::PageIndex {
                index: target_page_index,
                page_count: self.page_count,
            });
        }
        let draft_op = draft_op.filter(|op| op.page_index == target_page_index);
        RenderEngine::new(&self.fonts)
            .apply(&self.base, self.history.snapshot(), draft_op)?
            .rasterize(target_page_index, self.config.preview_dpi, rasterizer)
    }

    /// Preview the page the current draft sits on
    pub fn preview(&self, rasterizer: &dyn PageRasterizer) -> Result<RenderedPage> {
        let draft_op = self.draft.to_op();
        self.render_preview(self.draft.page_index, draft_op.as_ref(), rasterizer)
    }

    /// Serialize the committed history; the draft is never included
    pub fn render_final(&self, options: SaveOptions) -> Result<Vec<u8>> {
        RenderEngine::new(&self.fonts)
            .apply(&self.base, self.history.snapshot(), None)?
            .save(options)
    }

    /// The annotated document as a downloadable artifact
    pub fn export(&self) -> Result<ExportArtifact> {
        let options = SaveOptions {
            compact: self.config.compact_exports,
        };
        let bytes = self.render_final(options)?;
        tracing::info!(
            entries = self.history.len(),
            size = bytes.len(),
            "Exported annotated document"
        );
        Ok(ExportArtifact::new(
            ExportKind::Annotated,
            bytes,
            self.page_count,
        ))
    }
}
