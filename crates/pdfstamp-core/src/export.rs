//! Downloadable outputs

use serde::{Deserialize, Serialize};

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// The three products the tool can hand back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    Annotated,
    Merged,
    PageSubset,
}

impl ExportKind {
    /// Conventional download name
    pub fn file_name(&self) -> &'static str {
        match self {
            ExportKind::Annotated => "edited.pdf",
            ExportKind::Merged => "merged.pdf",
            ExportKind::PageSubset => "processed.pdf",
        }
    }
}

/// Serialized output plus what the caller needs to deliver it
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    kind: ExportKind,
    bytes: Vec<u8>,
    page_count: usize,
}

impl ExportArtifact {
    pub fn new(kind: ExportKind, bytes: Vec<u8>, page_count: usize) -> Self {
        Self {
            kind,
            bytes,
            page_count,
        }
    }

    pub fn kind(&self) -> ExportKind {
        self.kind
    }

    pub fn file_name(&self) -> &'static str {
        self.kind.file_name()
    }

    pub fn mime_type(&self) -> &'static str {
        PDF_MIME_TYPE
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Pages in the serialized document
    pub fn page_count(&self) -> usize {
        self.page_count
    }
}
