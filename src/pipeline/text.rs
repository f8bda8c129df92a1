//! Text-layer extraction via pdfium.
//!
//! A page whose text layer cannot be read keeps its slot with empty text and
//! an error message, so page numbering stays aligned with the render stage.

use crate::error::{ExtractError, PageError};
use crate::output::{PageText, TextExtraction};
use crate::pipeline::{input, pdfium, write_json};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Extract the text of the pages at `indices` (0-based).
///
/// `total_pages` in the result is the document's page count, not the number
/// of selected pages.
pub async fn extract_text(
    pdf_path: &Path,
    password: Option<&str>,
    indices: &[usize],
) -> Result<TextExtraction, ExtractError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);
    let indices = indices.to_vec();

    tokio::task::spawn_blocking(move || extract_text_blocking(&path, password.as_deref(), &indices))
        .await
        .map_err(|e| ExtractError::Internal(format!("Text task panicked: {}", e)))?
}

fn extract_text_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    indices: &[usize],
) -> Result<TextExtraction, ExtractError> {
    let pdfium = pdfium::bind()?;
    let document = pdfium::open_document(&pdfium, pdf_path, password)?;
    let doc_pages = document.pages();
    let total_pages = doc_pages.len() as usize;

    let mut pages = Vec::with_capacity(indices.len());
    for &idx in indices.iter().filter(|&&i| i < total_pages) {
        let page_number = idx + 1;
        let text = doc_pages.get(idx as PdfPageIndex).and_then(|page| {
            let layer = page.text()?;
            Ok(layer.all())
        });

        match text {
            Ok(text) => {
                debug!("Page {}: {} chars of text", page_number, text.len());
                pages.push(PageText {
                    page_number,
                    text,
                    error: None,
                });
            }
            Err(e) => {
                let err = PageError::TextFailed {
                    page: page_number,
                    detail: format!("{:?}", e),
                };
                warn!("{}", err);
                pages.push(PageText {
                    page_number,
                    text: String::new(),
                    error: Some(err.to_string()),
                });
            }
        }
    }

    info!(
        "Extracted text from {}/{} pages of {}",
        pages.len(),
        total_pages,
        pdf_path.display()
    );

    Ok(TextExtraction {
        pdf_path: pdf_path.display().to_string(),
        pdf_name: input::pdf_name(pdf_path),
        total_pages,
        full_text: TextExtraction::join_pages(&pages),
        pages,
    })
}

/// Write a [`TextExtraction`] as pretty JSON, creating parent directories.
pub fn save_text_extraction(result: &TextExtraction, path: &Path) -> Result<(), ExtractError> {
    write_json(result, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::read_json;

    #[test]
    fn saved_extraction_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/q3_text.json");
        let pages = vec![
            PageText {
                page_number: 1,
                text: "Revenue grew".into(),
                error: None,
            },
            PageText {
                page_number: 2,
                text: String::new(),
                error: Some("Page 2: text extraction failed: x".into()),
            },
        ];
        let result = TextExtraction {
            pdf_path: "q3.pdf".into(),
            pdf_name: "q3".into(),
            total_pages: 2,
            full_text: TextExtraction::join_pages(&pages),
            pages,
        };
        save_text_extraction(&result, &path).unwrap();

        let back: TextExtraction = read_json(&path).unwrap();
        assert_eq!(back, result);
        assert_eq!(back.full_text, "Revenue grew\n\n");
    }
}
