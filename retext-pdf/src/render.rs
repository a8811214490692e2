use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage};
use lopdf::Document;
use retext_core::signature;
use retext_core::{DocumentBuffer, EditorError, PageRenderer, RenderImage, RenderedPage};

use crate::objects::{self, decode_err};

const PAGE_BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);

/// Renders a blank white surface with the page's MediaBox dimensions. Needs
/// no native library; used when no rasterizer is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaBoxRenderer;

impl PageRenderer for MediaBoxRenderer {
    fn render(
        &self,
        buffer: &mut DocumentBuffer,
        page_index: usize,
        scale: f32,
    ) -> Result<RenderedPage, EditorError> {
        let bytes = buffer.take()?;
        signature::validate(&bytes)?;
        let doc =
            Document::load_mem(&bytes).map_err(|err| decode_err("failed to parse document", err))?;
        let page_id = objects::page_id(&doc, page_index)?;
        let bounds = objects::media_box(&doc, page_id);

        let scale = if scale > 0.0 && scale.is_finite() { scale } else { 1.0 };
        let width = (bounds.width * scale).round().max(1.0) as u32;
        let height = (bounds.height * scale).round().max(1.0) as u32;
        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, PAGE_BORDER);
                image.put_pixel(x, height - 1, PAGE_BORDER);
            }
            for y in 0..height {
                image.put_pixel(0, y, PAGE_BORDER);
                image.put_pixel(width - 1, y, PAGE_BORDER);
            }
        }

        Ok(RenderedPage {
            image: RenderImage {
                width,
                height,
                pixels: image.into_raw(),
            },
            native_width: bounds.width,
            native_height: bounds.height,
        })
    }
}

pub fn save_png(page: &RenderedPage, path: &Path) -> Result<()> {
    let image = RgbaImage::from_raw(page.image.width, page.image.height, page.image.pixels.clone())
        .ok_or_else(|| anyhow!("pixel buffer does not match {}x{}", page.image.width, page.image.height))?;
    image
        .save(path)
        .with_context(|| format!("failed to write {:?}", path))
}

#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRenderer;

#[cfg(feature = "pdfium")]
mod pdfium {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use parking_lot::Mutex;
    use pdfium_render::prelude::*;
    use retext_core::signature;
    use retext_core::{
        document_id_for_bytes, DocumentBuffer, DocumentId, EditorError, PageRenderer, RenderImage,
        RenderedPage,
    };
    use tracing::{instrument, warn};

    struct RenderCacheEntry {
        document: DocumentId,
        page_index: usize,
        scale: f32,
        page: RenderedPage,
    }

    /// Rasterizes pages with pdfium. The bindings are created once per
    /// renderer and reused for every page.
    pub struct PdfiumRenderer {
        pdfium: Arc<Pdfium>,
        cache: Mutex<Option<RenderCacheEntry>>,
    }

    impl PdfiumRenderer {
        pub fn new() -> Result<Self> {
            let pdfium = match bind_pdfium_from_env() {
                Some(pdfium) => pdfium,
                None => bind_pdfium_default()?,
            };
            Ok(Self {
                pdfium: Arc::new(pdfium),
                cache: Mutex::new(None),
            })
        }

        fn render_bytes(&self, bytes: Vec<u8>, page_index: usize, scale: f32) -> Result<RenderedPage> {
            let document = self
                .pdfium
                .load_pdf_from_byte_vec(bytes, None)
                .map_err(|err| anyhow!("failed to open document: {err}"))?;
            let index: PdfPageIndex = page_index
                .try_into()
                .map_err(|_| anyhow!("page {} is out of supported range", page_index))?;
            let page = document
                .pages()
                .get(index)
                .map_err(|err| anyhow!("page {page_index} unavailable: {err}"))?;

            let config = PdfRenderConfig::new().scale_page_by_factor(scale.max(0.1));
            let bitmap = page
                .render_with_config(&config)
                .map_err(|err| anyhow!("failed to render page {page_index}: {err}"))?;
            let image = bitmap.as_image().to_rgba8();

            Ok(RenderedPage {
                image: RenderImage {
                    width: image.width(),
                    height: image.height(),
                    pixels: image.into_raw(),
                },
                native_width: page.width().value,
                native_height: page.height().value,
            })
        }
    }

    impl PageRenderer for PdfiumRenderer {
        #[instrument(skip(self, buffer))]
        fn render(
            &self,
            buffer: &mut DocumentBuffer,
            page_index: usize,
            scale: f32,
        ) -> Result<RenderedPage, EditorError> {
            let bytes = buffer.take()?;
            signature::validate(&bytes)?;
            let document = document_id_for_bytes(&bytes);
            {
                let cache = self.cache.lock();
                if let Some(entry) = cache.as_ref() {
                    if entry.document == document
                        && entry.page_index == page_index
                        && (entry.scale - scale).abs() < f32::EPSILON
                    {
                        return Ok(entry.page.clone());
                    }
                }
            }

            let page = self
                .render_bytes(bytes, page_index, scale)
                .map_err(|err| EditorError::DecodeFailure(err.to_string()))?;

            *self.cache.lock() = Some(RenderCacheEntry {
                document,
                page_index,
                scale,
                page: page.clone(),
            });
            Ok(page)
        }
    }

    fn bind_pdfium_from_env() -> Option<Pdfium> {
        match std::env::var("RETEXT_PDFIUM_LIBRARY_PATH") {
            Ok(path) if !path.is_empty() => match Pdfium::bind_to_library(&path) {
                Ok(bindings) => Some(Pdfium::new(bindings)),
                Err(err) => {
                    warn!("failed to load pdfium from {}: {}", path, err);
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
            Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
        }

        match Pdfium::bind_to_system_library() {
            Ok(bindings) => Ok(Pdfium::new(bindings)),
            Err(err) => {
                errors.push(format!("system: {err}"));
                Err(anyhow!(
                    "failed to bind to a pdfium library; set RETEXT_PDFIUM_LIBRARY_PATH ({})",
                    errors.join(", ")
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn blank_render_matches_page_size_at_scale() {
        let mut buffer = DocumentBuffer::new(fixtures::three_line_pdf());
        let page = MediaBoxRenderer.render(&mut buffer, 0, 1.5).unwrap();
        assert_eq!((page.native_width, page.native_height), (612.0, 792.0));
        assert_eq!((page.image.width, page.image.height), (918, 1188));
        assert_eq!(page.image.pixels.len(), 918 * 1188 * 4);
        assert!(buffer.is_detached());
    }

    #[test]
    fn render_rejects_missing_page() {
        let mut buffer = DocumentBuffer::new(fixtures::three_line_pdf());
        assert_eq!(
            MediaBoxRenderer.render(&mut buffer, 2, 1.0).unwrap_err(),
            EditorError::PageOutOfRange { page: 2, page_count: 1 }
        );
    }
}
