//! PDF manuscripts.
//!
//! Metadata and page count come from the document-information dictionary.
//! Text comes from the first extraction route that yields any: the pdfium
//! text layer, lopdf's content-stream reader, then the CERMINE plain-text
//! sidecar. CERMINE runs at most once per parse and also supplies the
//! bibliographic XML, first-page images and page geometry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::unsync::OnceCell;
use pdfium_render::prelude::Pdfium;
use tracing::{debug, info, warn};

use crate::battery::{
    self, CC_MATCH_EXTRACTED_TEXT, DOI_FOUND_IN_CERMXML, DOI_MATCH_EXTRACTED_TEXT,
    FILE_METADATA_CONTAINS_PUBLISHER_TAGS, IMAGE_ON_FIRST_PAGE, MORE_THAN_THREE_PAGES,
    PROOF_MARKER_FOUND, RIGHTS_RESERVED_FOUND, TITLE_MATCH_CERMXML, TITLE_MATCH_EXTRACTED_TEXT,
    TITLE_MATCH_FILE_METADATA,
};
use crate::candidates::VersionCandidateSet;
use crate::cermine::{self, BibliographicRecord, SidecarPaths, StructuralExtractor};
use crate::config::Config;
use crate::detector::ManuscriptParser;
use crate::error::Result;
use crate::layout::{self, LayoutStats};
use crate::matcher::SearchText;
use crate::patterns::{PROOF_PATTERNS, RIGHTS_RESERVED_PATTERNS, find_publisher_tag};
use crate::pdf::{self, PdfFile, usable_text};
use crate::types::{
    DeclaredMetadata, ExtractedDocument, FileKind, Outcome, TestRecord, TestResult, TestResults,
    TextSource, VersionStage,
};

const TITLE_KEY: &str = "/Title";

pub struct PdfParser<'a> {
    path: PathBuf,
    config: &'a Config,
    extractor: &'a dyn StructuralExtractor,
    pdfium: Option<&'a Pdfium>,
}

impl<'a> PdfParser<'a> {
    pub fn new(
        path: impl Into<PathBuf>,
        config: &'a Config,
        extractor: &'a dyn StructuralExtractor,
        pdfium: Option<&'a Pdfium>,
    ) -> Self {
        Self {
            path: path.into(),
            config,
            extractor,
            pdfium,
        }
    }

    fn extract(&self, pdf: &PdfFile, sidecars: &Sidecars<'_>) -> Result<ExtractedDocument> {
        let (text, text_source) = match self.extract_text(pdf, sidecars)? {
            Some((text, source)) => (Some(text), Some(source)),
            None => (None, None),
        };
        debug!(source = ?text_source, "text extraction finished");
        Ok(ExtractedDocument {
            text,
            metadata: pdf.metadata(),
            page_count: Some(pdf.page_count()),
            text_source,
        })
    }

    fn extract_text(
        &self,
        pdf: &PdfFile,
        sidecars: &Sidecars<'_>,
    ) -> Result<Option<(String, TextSource)>> {
        if let Some(pdfium) = self.pdfium {
            match pdf::pdfium_text(pdfium, &self.path) {
                Ok(text) => match usable_text(text) {
                    Some(text) => return Ok(Some((text, TextSource::Pdfium))),
                    None => debug!("pdfium text layer is empty"),
                },
                Err(e) => warn!("{e}; trying lopdf"),
            }
        }

        match pdf.content_text() {
            Ok(text) => match usable_text(text) {
                Some(text) => return Ok(Some((text, TextSource::Lopdf))),
                None => debug!("content streams hold no text"),
            },
            Err(e) => warn!("{e}; trying {} text", cermine::TOOL),
        }

        let paths = sidecars.get()?;
        match std::fs::read_to_string(&paths.text) {
            Ok(text) => Ok(usable_text(text).map(|t| (t, TextSource::CermineSidecar))),
            Err(e) => {
                warn!(path = %paths.text.display(), "no {} text: {e}", cermine::TOOL);
                Ok(None)
            }
        }
    }

    fn layout(&self, structure: &Path) -> Option<LayoutStats> {
        if !structure.exists() {
            debug!(path = %structure.display(), "no structure sidecar");
            return None;
        }
        match layout::analyze_file(structure, &self.config.layout) {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("layout analysis skipped: {e}");
                None
            }
        }
    }
}

impl ManuscriptParser for PdfParser<'_> {
    fn parse(&self, declared: &DeclaredMetadata) -> Result<Outcome> {
        let pdf = PdfFile::open(&self.path)?;
        let sidecars = Sidecars::new(self.extractor, &self.path);
        let doc = self.extract(&pdf, &sidecars)?;
        let haystack = doc.text().map(SearchText::new);
        let m = &self.config.matching;

        let mut tests = TestResults::default();
        tests.record(
            TITLE_MATCH_FILE_METADATA,
            battery::title_matches_metadata(declared, &doc.metadata, TITLE_KEY, m.min_similarity),
        );
        tests.record(FILE_METADATA_CONTAINS_PUBLISHER_TAGS, publisher_tags(&doc.metadata));
        tests.record(
            MORE_THAN_THREE_PAGES,
            battery::extracted_text_long_enough(doc.text(), m.min_text_chars()),
        );
        tests.record(
            TITLE_MATCH_EXTRACTED_TEXT,
            battery::title_matches_extracted_text(
                declared,
                haystack.as_ref(),
                m.title_error_ratio,
                m.expected_span(),
            ),
        );
        tests.record(
            DOI_MATCH_EXTRACTED_TEXT,
            battery::doi_matches_extracted_text(haystack.as_ref()),
        );
        tests.record(
            CC_MATCH_EXTRACTED_TEXT,
            battery::license_statement_found(haystack.as_ref()),
        );
        tests.record(
            PROOF_MARKER_FOUND,
            battery::phrase_found(haystack.as_ref(), &PROOF_PATTERNS),
        );
        tests.record(
            RIGHTS_RESERVED_FOUND,
            battery::phrase_found(haystack.as_ref(), &RIGHTS_RESERVED_PATTERNS),
        );

        let paths = sidecars.get()?;
        let record = BibliographicRecord::parse_file(&paths.xml)?;
        tests.record(DOI_FOUND_IN_CERMXML, doi_in_record(&record));
        tests.record(
            TITLE_MATCH_CERMXML,
            battery::title_matches_value(declared, record.title.as_deref(), m.min_similarity),
        );
        tests.record(IMAGE_ON_FIRST_PAGE, first_page_image(&paths.images));
        let layout = self.layout(&paths.structure);

        let mut outcome =
            evaluate(&battery::file_name(&self.path), declared, tests).extracted_from(&doc);
        outcome.bibliographic = Some(record);
        outcome.layout = layout;
        info!(
            approved = outcome.approved,
            needs_review = outcome.needs_review,
            reason = %outcome.reason,
            "pdf decision"
        );
        Ok(outcome)
    }
}

/// CERMINE output for one parse, produced on first use.
struct Sidecars<'a> {
    extractor: &'a dyn StructuralExtractor,
    pdf: &'a Path,
    paths: OnceCell<SidecarPaths>,
}

impl<'a> Sidecars<'a> {
    fn new(extractor: &'a dyn StructuralExtractor, pdf: &'a Path) -> Self {
        Self {
            extractor,
            pdf,
            paths: OnceCell::new(),
        }
    }

    fn get(&self) -> Result<&SidecarPaths> {
        self.paths.get_or_try_init(|| self.extractor.run(self.pdf))
    }
}

// ── Sidecar-backed tests ───────────────────────────────────────────────────

fn publisher_tags(metadata: &BTreeMap<String, String>) -> TestRecord {
    match find_publisher_tag(metadata.keys().map(String::as_str)) {
        Some(tag) => {
            debug!(tag, "publisher metadata tag");
            TestRecord::with_detail(TestResult::Pass, tag)
        }
        None => TestRecord::new(TestResult::Fail),
    }
}

fn doi_in_record(record: &BibliographicRecord) -> TestRecord {
    match &record.doi {
        Some(doi) => TestRecord::with_detail(TestResult::Pass, doi.clone()),
        None => TestRecord::new(TestResult::Fail),
    }
}

fn first_page_image(images: &Path) -> TestRecord {
    match cermine::has_first_page_image(images) {
        Ok(found) => TestRecord::new(found.into()),
        Err(e) => {
            warn!(path = %images.display(), "cannot list images: {e}");
            TestRecord::new(TestResult::Indeterminate)
        }
    }
}

// ── Decision ───────────────────────────────────────────────────────────────

/// Decide from the PDF test battery.
pub fn evaluate(file_name: &str, declared: &DeclaredMetadata, tests: TestResults) -> Outcome {
    let sane = tests.passed(MORE_THAN_THREE_PAGES)
        && (tests.passed(TITLE_MATCH_FILE_METADATA)
            || tests.passed(TITLE_MATCH_EXTRACTED_TEXT)
            || tests.passed(TITLE_MATCH_CERMXML));
    if !sane {
        let reason = battery::failed_checks_reason(
            file_name,
            &tests,
            &[
                MORE_THAN_THREE_PAGES,
                TITLE_MATCH_FILE_METADATA,
                TITLE_MATCH_EXTRACTED_TEXT,
                TITLE_MATCH_CERMXML,
            ],
        );
        return Outcome::new(FileKind::Pdf, tests, VersionCandidateSet::full()).reject(reason);
    }

    let tagged = tests.passed(FILE_METADATA_CONTAINS_PUBLISHER_TAGS);
    let licensed = tests.passed(CC_MATCH_EXTRACTED_TEXT);
    let version = &declared.version;

    if tagged || licensed {
        let candidates = VersionCandidateSet::full().excluding(&VersionStage::AUTHOR_GENERATED);
        let outcome = Outcome::new(FileKind::Pdf, tests, candidates);
        if licensed {
            let licence = outcome
                .tests
                .get(CC_MATCH_EXTRACTED_TEXT)
                .and_then(|r| r.detail.clone())
                .unwrap_or_default();
            let mut outcome = outcome.approve(format!(
                "Creative Commons licence detected in extracted text ({licence}); declared version is {version}"
            ));
            outcome.needs_review = true;
            return outcome;
        }
        if version.is_author_generated() {
            return outcome.reject(format!(
                "PDF is publisher-generated; no evidence of CC licence. \
                 This contradicts the declared version {version}"
            ));
        }
        return outcome.reject("PDF is publisher-generated; no evidence of CC licence");
    }

    let outcome = Outcome::new(FileKind::Pdf, tests, VersionCandidateSet::full());
    if version.is_author_generated() {
        outcome.approve(format!(
            "Could not find any evidence that this PDF is publisher-generated; declared version is {version}"
        ))
    } else {
        outcome.reject(format!(
            "This is either a submitted or accepted version, but declared version is {version}"
        ))
    }
}
