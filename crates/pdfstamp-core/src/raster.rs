//! Page rasterization for on-screen previews
//!
//! Rasterization is delegated to an external renderer behind the
//! [`PageRasterizer`] trait. Exports never go through this path; they always
//! use the serialized vector document.

use crate::error::{Result, StampError};

/// Preview resolution used when the caller does not choose one
pub const DEFAULT_PREVIEW_DPI: f32 = 150.0;

/// One rasterized page, PNG encoded
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
    pub dpi: f32,
    pub png: Vec<u8>,
}

/// Renders one page of a serialized PDF to an image
pub trait PageRasterizer {
    fn rasterize(&self, pdf_bytes: &[u8], page_index: usize, dpi: f32) -> Result<RenderedPage>;
}

/// Encode 8-bit RGBA pixels as PNG
pub fn encode_png(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(StampError::Raster(format!(
            "pixel buffer is {} bytes, expected {} for {}x{}",
            rgba.len(),
            expected,
            width,
            height
        )));
    }

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| StampError::Raster(e.to_string()))?;
        writer
            .write_image_data(rgba)
            .map_err(|e| StampError::Raster(e.to_string()))?;
    }
    Ok(out)
}

#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRasterizer;

#[cfg(feature = "pdfium")]
mod pdfium {
    use super::{encode_png, PageRasterizer, RenderedPage};
    use crate::error::{Result, StampError};
    use pdfium_render::prelude::*;
    use std::path::Path;

    /// Rasterizer backed by the PDFium library
    pub struct PdfiumRasterizer {
        pdfium: Pdfium,
    }

    impl PdfiumRasterizer {
        /// Bind to PDFium, looking next to the executable, then in the
        /// working directory, then in the system library paths
        pub fn new() -> Result<Self> {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(Path::to_path_buf));

            if let Some(dir) = exe_dir {
                if let Ok(bindings) =
                    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
                {
                    return Ok(Self {
                        pdfium: Pdfium::new(bindings),
                    });
                }
            }

            let bindings =
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                    .or_else(|_| Pdfium::bind_to_system_library())
                    .map_err(|e| StampError::Raster(format!("PDFium unavailable: {}", e)))?;
            Ok(Self {
                pdfium: Pdfium::new(bindings),
            })
        }
    }

    impl PageRasterizer for PdfiumRasterizer {
        fn rasterize(&self, pdf_bytes: &[u8], page_index: usize, dpi: f32) -> Result<RenderedPage> {
            let document = self
                .pdfium
                .load_pdf_from_byte_slice(pdf_bytes, None)
                .map_err(|e| StampError::Raster(e.to_string()))?;

            let index = u16::try_from(page_index).map_err(|_| StampError::PageIndex {
                index: page_index,
                page_count: document.pages().len() as usize,
            })?;
            let page = document
                .pages()
                .get(index)
                .map_err(|_| StampError::PageIndex {
                    index: page_index,
                    page_count: document.pages().len() as usize,
                })?;

            let config = PdfRenderConfig::new().scale_page_by_factor(dpi / 72.0);
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| StampError::Raster(e.to_string()))?;

            let width = bitmap.width() as u32;
            let height = bitmap.height() as u32;
            let png = encode_png(&bitmap.as_rgba_bytes(), width, height)?;

            tracing::debug!(page_index, dpi, width, height, "Rasterized page");
            Ok(RenderedPage {
                page_index,
                width,
                height,
                dpi,
                png,
            })
        }
    }
}
