use std::path::Path;

use pdfium_render::prelude::Pdfium;
use tracing::{info, warn};

use crate::cermine::{CermineExtractor, StructuralExtractor};
use crate::config::Config;
use crate::docx::DocxParser;
use crate::error::{DetectError, Result};
use crate::pdf_parser::PdfParser;
use crate::types::{DeclaredMetadata, FileKind, Outcome};

/// One parser per supported format.
pub trait ManuscriptParser {
    fn parse(&self, declared: &DeclaredMetadata) -> Result<Outcome>;
}

const EDITABLE_EXTENSIONS: [&str; 9] = [
    ".doc", ".html", ".htm", ".odt", ".ppt", ".pptx", ".rtf", ".tex", ".txt",
];

/// Format and lower-cased extension (with its dot) of `path`.
pub fn classify_extension(path: &Path) -> (FileKind, String) {
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    let kind = match ext.as_str() {
        ".pdf" => FileKind::Pdf,
        ".docx" => FileKind::Docx,
        e if EDITABLE_EXTENSIONS.contains(&e) => FileKind::EditableDocument,
        _ => FileKind::Unrecognized,
    };
    (kind, ext)
}

pub struct VersionDetector {
    config: Config,
    extractor: Box<dyn StructuralExtractor>,
    pdfium: Option<Pdfium>,
}

impl VersionDetector {
    pub fn new(config: Config) -> Self {
        let extractor = Box::new(CermineExtractor::new(&config.structural));
        Self {
            config,
            extractor,
            pdfium: None,
        }
    }

    /// Use pdfium as the first text extraction route for PDFs.
    pub fn with_pdfium(mut self, pdfium: Pdfium) -> Self {
        self.pdfium = Some(pdfium);
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn StructuralExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Detect, reporting structural failures as errors.
    pub fn try_detect(&self, path: &Path, declared: &DeclaredMetadata) -> Result<Outcome> {
        let (kind, ext) = classify_extension(path);
        info!(path = %path.display(), format = ?kind, "working on file");
        match kind {
            FileKind::Pdf => {
                PdfParser::new(path, &self.config, self.extractor.as_ref(), self.pdfium.as_ref())
                    .parse(declared)
            }
            FileKind::Docx => DocxParser::new(path, self.config.matching.clone()).parse(declared),
            FileKind::EditableDocument | FileKind::Unrecognized => {
                let ext = if ext.is_empty() { "(none)".to_string() } else { ext };
                Err(DetectError::UnsupportedExtension(ext))
            }
        }
    }

    /// Detect, folding structural failures into a rejection.
    pub fn detect(&self, path: &Path, declared: &DeclaredMetadata) -> Outcome {
        self.try_detect(path, declared).unwrap_or_else(|e| {
            warn!(path = %path.display(), "rejected: {e}");
            let mut outcome = Outcome::rejected(e.to_string());
            if let DetectError::UnsupportedExtension(_) = e {
                outcome.format = Some(classify_extension(path).0);
            }
            outcome
        })
    }
}
