//! Page image → base64 PNG `ImageData` for the vision request.
//!
//! PNG keeps digits in dense tables crisp. `detail: "high"` lets OpenAI-style
//! models tile the full image instead of a single low-res overview.

use crate::error::PageError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page (1-based `page_number`) for the model.
pub fn encode_page(page_number: usize, img: &DynamicImage) -> Result<ImageData, PageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PageError::RenderFailed {
            page: page_number,
            detail: format!("PNG encoding failed: {}", e),
        })?;

    let b64 = STANDARD.encode(&buf);
    debug!("Page {}: {} bytes base64", page_number, b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
