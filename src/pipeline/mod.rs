//! Pipeline stages for visual extraction.
//!
//! Each submodule implements one step and persists its own artefact, so any
//! step can be re-run from the files of the previous one.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ text ─────────────────────────────┐
//!   │                                         ▼
//!   └────▶ render ──▶ encode ──▶ detect ──▶ inject ──▶ clean ──▶ blend
//!          (pdfium)   (base64)   (VLM pool)  (tables)  (VLM)    (JSONL)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path or URL to a local file
//! 2. [`text`]: read the text layer of the selected pages
//! 3. [`render`]: rasterise the same pages; `spawn_blocking` because pdfium
//!    is synchronous
//! 4. [`encode`]: PNG + base64 for the multimodal request
//! 5. [`detect`]: bounded concurrent model calls, one per page, via [`llm`]
//! 6. [`inject`]: attach detected tables to their text pages
//! 7. [`clean`]: optional model pass removing duplicated table text
//! 8. [`blend`]: paragraphs, tables and figures as one element stream

pub mod blend;
pub mod clean;
pub mod detect;
pub mod encode;
pub mod inject;
pub mod input;
pub mod llm;
pub mod pdfium;
pub mod render;
pub mod repair;
pub mod text;

#[cfg(test)]
pub(crate) mod scripted;

use crate::error::ExtractError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Write `value` as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<(), ExtractError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(ExtractError::write(parent))?;
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(ExtractError::json(path.display().to_string()))?;
    std::fs::write(path, json).map_err(ExtractError::write(path))
}

/// Read a JSON artefact written by [`write_json`].
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ExtractError> {
    let raw = std::fs::read_to_string(path).map_err(ExtractError::read(path))?;
    serde_json::from_str(&raw).map_err(ExtractError::json(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_reports_bad_json_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = read_json::<serde_json::Value>(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Json { .. }));
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn read_missing_file() {
        let err = read_json::<serde_json::Value>(Path::new("/no/such/file.json")).unwrap_err();
        assert!(matches!(err, ExtractError::ReadFailed { .. }));
    }
}
