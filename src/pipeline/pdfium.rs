//! pdfium binding and document loading shared by the text and render stages.
//!
//! Library lookup order: `PDFIUM_LIB_PATH` (file or directory), the working
//! directory, then the system library search path.

use crate::error::ExtractError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming a pdfium library file or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to a pdfium library and return a ready instance.
///
/// Must be called from a blocking context; pdfium calls are synchronous.
pub fn bind() -> Result<Pdfium, ExtractError> {
    let from_env = std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from);

    let bindings = match from_env {
        Some(p) => {
            let lib = if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&p)
            } else {
                p
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ExtractError::PdfiumBindingFailed(e.to_string()))?;

    Ok(Pdfium::new(bindings))
}

/// Open `path`, mapping pdfium load failures to typed errors.
pub fn open_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, ExtractError> {
    pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| load_error(e, path, password.is_some()))
}

fn load_error(e: PdfiumError, path: &Path, had_password: bool) -> ExtractError {
    let path = path.to_path_buf();
    match e {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            if had_password {
                ExtractError::WrongPassword { path }
            } else {
                ExtractError::PasswordRequired { path }
            }
        }
        other => ExtractError::CorruptPdf {
            path,
            detail: format!("{:?}", other),
        },
    }
}
