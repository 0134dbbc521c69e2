//! Turning source files into plain text.
//!
//! Supported formats are PDF (all pages, concatenated) and plain text
//! (`.txt`, `.md`, `.csv`, anything `text/*`). The format comes from the file
//! name; files with no recognizable extension are sniffed for a PDF header.

mod decode;

pub use decode::{TextEncoding, decode_text};

use std::path::Path;

use mime_guess::mime;
use tracing::{debug, warn};

use crate::errors::ExtractionError;

/// A document ready for summarization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// File name, used to label output.
    pub name: String,
    pub text: String,
}

/// Formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    Text,
}

impl SourceFormat {
    /// Detect from the file name, falling back to the content for unknown names.
    pub fn detect(name: &str, bytes: &[u8]) -> Option<Self> {
        match mime_guess::from_path(name).first() {
            Some(m) if m.type_() == mime::APPLICATION && m.subtype() == mime::PDF => {
                Some(SourceFormat::Pdf)
            }
            Some(m) if m.type_() == mime::TEXT => Some(SourceFormat::Text),
            Some(_) => None,
            None if bytes.starts_with(b"%PDF-") => Some(SourceFormat::Pdf),
            None => None,
        }
    }
}

/// Extract text from the raw bytes of a file called `name`.
pub fn extract_bytes(name: &str, bytes: &[u8]) -> Result<SourceDocument, ExtractionError> {
    let format = SourceFormat::detect(name, bytes).ok_or_else(|| ExtractionError::Unsupported {
        name: name.to_string(),
    })?;

    let text = match format {
        SourceFormat::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractionError::Pdf {
                name: name.to_string(),
                message: e.to_string(),
            })?
        }
        SourceFormat::Text => {
            let (text, encoding) = decode_text(bytes);
            if encoding != TextEncoding::Utf8 {
                warn!(name, ?encoding, "file is not UTF-8, decoded with fallback");
            }
            text
        }
    };

    if text.trim().is_empty() {
        return Err(ExtractionError::Empty {
            name: name.to_string(),
        });
    }

    debug!(name, ?format, chars = text.len(), "extracted text");
    Ok(SourceDocument {
        name: name.to_string(),
        text,
    })
}

/// Read and extract a file from disk.
pub fn extract_path(path: &Path) -> Result<SourceDocument, ExtractionError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    extract_bytes(&name, &bytes)
}
