use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lopdf::{Document, Object};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use crate::error::{DetectError, Result};
use crate::patterns::decode_name_escapes;

/// Bind pdfium from an explicit library path or the system library.
pub fn bind_pdfium(pdfium_path: Option<&str>) -> Result<Pdfium> {
    let bindings = match pdfium_path {
        Some(path) => Pdfium::bind_to_library(path).map_err(|e| DetectError::CollaboratorUnavailable {
            tool: "pdfium".to_string(),
            reason: format!("failed to load pdfium from {path}: {e}"),
        })?,
        None => Pdfium::bind_to_system_library().map_err(|e| DetectError::CollaboratorUnavailable {
            tool: "pdfium".to_string(),
            reason: format!("failed to find pdfium ({e}); install pdfium-binaries or use --pdfium-path"),
        })?,
    };
    Ok(Pdfium::new(bindings))
}

/// Text layer of every page, pages separated by a line break.
pub fn pdfium_text(pdfium: &Pdfium, path: &Path) -> std::result::Result<String, String> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| format!("pdfium failed to load {}: {e}", path.display()))?;
    let mut text = String::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let page_text = page
            .text()
            .map_err(|e| format!("pdfium failed to load text for page {}: {e}", idx + 1))?;
        text.push_str(&page_text.all());
        text.push('\n');
    }
    Ok(text)
}

/// A PDF opened for metadata and fallback text extraction.
pub struct PdfFile {
    path: PathBuf,
    document: Document,
}

impl PdfFile {
    pub fn open(path: &Path) -> Result<Self> {
        let document = Document::load(path).map_err(|e| DetectError::unreadable(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Document-information dictionary. Keys keep their leading `/` and have
    /// name escapes decoded.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        let Ok(info) = self.document.trailer.get(b"Info") else {
            debug!(path = %self.path.display(), "no document information dictionary");
            return metadata;
        };
        let dict = match info {
            Object::Reference(id) => self.document.get_dictionary(*id),
            Object::Dictionary(dict) => Ok(dict),
            _ => return metadata,
        };
        let dict = match dict {
            Ok(dict) => dict,
            Err(e) => {
                warn!(path = %self.path.display(), "unreadable information dictionary: {e}");
                return metadata;
            }
        };
        for (key, value) in dict.iter() {
            let key = decode_name_escapes(&format!("/{}", String::from_utf8_lossy(key)));
            metadata.insert(key, self.value_string(value));
        }
        metadata
    }

    fn value_string(&self, value: &Object) -> String {
        match value {
            Object::Reference(id) => match self.document.get_object(*id) {
                Ok(Object::Reference(_)) | Err(_) => String::new(),
                Ok(target) => self.value_string(target),
            },
            other => object_string(other),
        }
    }

    /// Text from the content streams of every page.
    pub fn content_text(&self) -> std::result::Result<String, String> {
        let pages: Vec<u32> = self.document.get_pages().keys().copied().collect();
        if pages.is_empty() {
            return Ok(String::new());
        }
        self.document
            .extract_text(&pages)
            .map_err(|e| format!("lopdf failed to extract text from {}: {e}", self.path.display()))
    }
}

fn object_string(value: &Object) -> String {
    match value {
        Object::String(bytes, _) => decode_text_string(bytes),
        Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
        Object::Integer(i) => i.to_string(),
        Object::Real(r) => r.to_string(),
        Object::Boolean(b) => b.to_string(),
        _ => String::new(),
    }
}

/// PDF text strings: UTF-16BE or UTF-8 with a byte-order mark, otherwise
/// single-byte (read as Latin-1).
pub fn decode_text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
            char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        _ => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// `Some` when the text holds anything besides whitespace.
pub fn usable_text(text: String) -> Option<String> {
    if text.trim().is_empty() { None } else { Some(text) }
}
