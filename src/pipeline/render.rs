//! PDF rasterisation: render selected pages to `DynamicImage` via pdfium.
//!
//! pdfium is synchronous and CPU-bound, so all work happens inside
//! `spawn_blocking`. Pages render at `dpi / 72` scale with the longest edge
//! capped at `max_rendered_pixels`.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, PageError};
use crate::output::DocumentInfo;
use crate::pipeline::pdfium;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Pages rendered by [`render_pages`].
#[derive(Debug, Default)]
pub struct RenderedPages {
    /// Document page count.
    pub total_pages: usize,
    /// `(page_index_0based, image)` in ascending page order.
    pub images: Vec<(usize, DynamicImage)>,
    pub failures: Vec<PageError>,
}

/// Rasterise the pages at `page_indices` (0-based).
///
/// A page that fails to render is recorded in `failures`; the others still
/// render. Indices past the end of the document are skipped.
pub async fn render_pages(
    pdf_path: &Path,
    config: &ExtractionConfig,
    page_indices: &[usize],
) -> Result<RenderedPages, ExtractError> {
    let path = pdf_path.to_path_buf();
    let scale = config.dpi as f32 / 72.0;
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();
    let indices = page_indices.to_vec();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, scale, max_pixels, password.as_deref(), &indices)
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_pages_blocking(
    pdf_path: &Path,
    scale: f32,
    max_pixels: u32,
    password: Option<&str>,
    page_indices: &[usize],
) -> Result<RenderedPages, ExtractError> {
    let pdfium = pdfium::bind()?;
    let document = pdfium::open_document(&pdfium, pdf_path, password)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut out = RenderedPages {
        total_pages,
        ..Default::default()
    };

    for &idx in page_indices {
        if idx >= total_pages {
            warn!("Skipping page {} (out of range, total={})", idx + 1, total_pages);
            continue;
        }

        let rendered = pages
            .get(idx as PdfPageIndex)
            .and_then(|page| {
                page.render_with_config(&render_config)
                    .map(|bitmap| bitmap.as_image())
            });

        match rendered {
            Ok(image) => {
                debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
                out.images.push((idx, image));
            }
            Err(e) => {
                let err = PageError::RenderFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                };
                warn!("{}", err);
                out.failures.push(err);
            }
        }
    }

    Ok(out)
}

/// File name of the PNG for a 0-based page index.
pub fn image_filename(page_index: usize) -> String {
    format!("page_{:03}.png", page_index)
}

/// Write each image to `dir` as `page_NNN.png`, returning the paths in page order.
pub async fn save_page_images(
    images: &[(usize, DynamicImage)],
    dir: &Path,
) -> Result<Vec<PathBuf>, ExtractError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(ExtractError::write(dir))?;

    let mut paths = Vec::with_capacity(images.len());
    for (idx, image) in images {
        let path = dir.join(image_filename(*idx));
        let image = image.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || image.save_with_format(&target, image::ImageFormat::Png))
            .await
            .map_err(|e| ExtractError::Internal(format!("Image save task panicked: {}", e)))?
            .map_err(|e| ExtractError::OutputWriteFailed {
                path: path.clone(),
                source: std::io::Error::other(e),
            })?;
        paths.push(path);
    }

    info!("Saved {} page images to {}", paths.len(), dir.display());
    Ok(paths)
}

/// Document metadata without rendering any page.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentInfo, ExtractError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| ExtractError::Internal(format!("Metadata task panicked: {}", e)))?
}

fn extract_metadata_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentInfo, ExtractError> {
    let pdfium = pdfium::bind()?;
    let document = pdfium::open_document(&pdfium, pdf_path, password)?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(DocumentInfo {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
        is_encrypted: password.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn filenames_are_zero_padded() {
        assert_eq!(image_filename(0), "page_000.png");
        assert_eq!(image_filename(42), "page_042.png");
    }

    #[tokio::test]
    async fn saves_images_in_page_order() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        let paths = save_page_images(&[(2, img.clone()), (5, img)], &dir.path().join("images"))
            .await
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("page_002.png"));
        assert!(paths[1].exists());
    }

    #[tokio::test]
    async fn renders_generated_pdf_with_password_set() {
        if pdfium::bind().is_err() {
            println!("SKIP: pdfium library not available");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let pdf_path = dir.path().join("two_pages.pdf");
        let body = "Quarterly figures\n\n".repeat(120);
        let bytes = crate::export::pdf::markdown_to_pdf(&body, "Two pages").unwrap();
        std::fs::write(&pdf_path, bytes).unwrap();

        let config = ExtractionConfig::builder()
            .dpi(72)
            .max_rendered_pixels(200)
            .password("unused")
            .build()
            .unwrap();
        let out = render_pages(&pdf_path, &config, &[0, 1, 99]).await.unwrap();

        assert!(out.total_pages >= 2);
        assert!(out.failures.is_empty());
        assert_eq!(out.images.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1]);
        assert!(out.images.iter().all(|(_, img)| img.width().max(img.height()) <= 200));
    }
}
