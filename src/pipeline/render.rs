//! PDF rasterisation via pdfium.
//!
//! pdfium keeps thread-local state and its document handle borrows the
//! library binding, so the binding, the document and the [`PdfPageSource`]
//! all live on the chunker's blocking thread for the whole run.
//!
//! Pages render at a fixed scale of the page's 72-dpi user space (1.5× by
//! default), with the longest edge capped so an oversized page cannot
//! exhaust memory.

use crate::config::DraftConfig;
use crate::error::DraftError;
use crate::pipeline::chunk::{run_chunker, spawn_chunker, ChunkedDocument, PageSource};
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Rasterise and chunk an in-memory PDF.
pub async fn chunk_pdf(
    name: impl Into<String>,
    bytes: Vec<u8>,
    config: &DraftConfig,
) -> Result<ChunkedDocument, DraftError> {
    let name = name.into();
    let password = config.password.clone();
    let scale = config.render_scale;
    let max_px = config.max_rendered_pixels;
    let per_chunk = config.pages_per_chunk;
    let quality = config.jpeg_quality;

    spawn_chunker(move |ready, tx| {
        let pdfium = match bind_pdfium() {
            Ok(p) => p,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        let document = match pdfium.load_pdf_from_byte_slice(&bytes, password.as_deref()) {
            Ok(d) => d,
            Err(e) => {
                let _ = ready.send(Err(load_error(&name, password.is_some(), e)));
                return;
            }
        };
        info!("PDF loaded: {} pages", document.pages().len());

        let mut source = PdfPageSource::new(&document, scale, max_px);
        run_chunker(&name, &mut source, per_chunk, quality, ready, tx);
    })
    .await
}

/// Bind pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the
/// system library path.
fn bind_pdfium() -> Result<Pdfium, DraftError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| DraftError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn load_error(name: &str, had_password: bool, e: PdfiumError) -> DraftError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if had_password {
            DraftError::WrongPassword {
                name: name.to_string(),
            }
        } else {
            DraftError::PasswordRequired {
                name: name.to_string(),
            }
        }
    } else {
        DraftError::CorruptPdf {
            name: name.to_string(),
            detail: err_str,
        }
    }
}

/// [`PageSource`] over an open pdfium document.
pub struct PdfPageSource<'a, 'b> {
    document: &'a PdfDocument<'b>,
    render: PdfRenderConfig,
}

impl<'a, 'b> PdfPageSource<'a, 'b> {
    pub fn new(document: &'a PdfDocument<'b>, scale: f32, max_pixels: u32) -> Self {
        let render = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .set_maximum_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);
        Self { document, render }
    }
}

impl PageSource for PdfPageSource<'_, '_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render_page(&mut self, index: usize) -> Result<DynamicImage, DraftError> {
        let page = self
            .document
            .pages()
            .get(index as u16)
            .map_err(|e| DraftError::RasterisationFailed {
                page: index + 1,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&self.render).map_err(|e| {
            DraftError::RasterisationFailed {
                page: index + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}
