//! DOCX manuscripts.
//!
//! A DOCX file is a ZIP archive; core properties live in `docProps/core.xml`
//! and the body in `word/document.xml`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::battery::{
    self, MORE_THAN_THREE_PAGES, TITLE_MATCH_EXTRACTED_TEXT, TITLE_MATCH_FILE_METADATA,
};
use crate::candidates::VersionCandidateSet;
use crate::config::MatchingConfig;
use crate::detector::ManuscriptParser;
use crate::error::{DetectError, Result};
use crate::matcher::SearchText;
use crate::types::{DeclaredMetadata, ExtractedDocument, FileKind, Outcome, TestResults, TextSource};

pub struct DocxParser {
    path: PathBuf,
    matching: MatchingConfig,
}

impl DocxParser {
    pub fn new(path: impl Into<PathBuf>, matching: MatchingConfig) -> Self {
        Self {
            path: path.into(),
            matching,
        }
    }
}

impl ManuscriptParser for DocxParser {
    fn parse(&self, declared: &DeclaredMetadata) -> Result<Outcome> {
        let doc = extract(&self.path)?;
        let haystack = doc.text().map(SearchText::new);
        let m = &self.matching;

        let mut tests = TestResults::default();
        tests.record(
            TITLE_MATCH_FILE_METADATA,
            battery::title_matches_metadata(declared, &doc.metadata, "title", m.min_similarity),
        );
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

        let outcome =
            evaluate(&battery::file_name(&self.path), declared, tests).extracted_from(&doc);
        info!(approved = outcome.approved, reason = %outcome.reason, "docx decision");
        Ok(outcome)
    }
}

/// Decide from the DOCX test battery.
pub fn evaluate(file_name: &str, declared: &DeclaredMetadata, tests: TestResults) -> Outcome {
    let sane = tests.passed(MORE_THAN_THREE_PAGES)
        && (tests.passed(TITLE_MATCH_FILE_METADATA) || tests.passed(TITLE_MATCH_EXTRACTED_TEXT));
    let outcome = Outcome::new(FileKind::Docx, tests, VersionCandidateSet::full());
    if !sane {
        let reason = battery::failed_checks_reason(
            file_name,
            &outcome.tests,
            &[MORE_THAN_THREE_PAGES, TITLE_MATCH_FILE_METADATA, TITLE_MATCH_EXTRACTED_TEXT],
        );
        return outcome.reject(format!("{reason}; declared version is {}", declared.version));
    }
    if declared.version.is_author_generated() {
        let reason = format!("Editable manuscript; declared version is {}", declared.version);
        outcome.approve(reason)
    } else {
        outcome.reject(format!(
            "This is either a submitted or accepted version, but declared version is {}",
            declared.version
        ))
    }
}

// ── Extraction ─────────────────────────────────────────────────────────────

/// Read core properties and body text. Only an unreadable archive is an
/// error; a missing body leaves the text unset.
pub fn extract(path: &Path) -> Result<ExtractedDocument> {
    let file = File::open(path).map_err(|e| DetectError::unreadable(path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| DetectError::unreadable(path, e))?;

    let metadata = read_member(&mut archive, "docProps/core.xml")
        .map(|xml| core_properties(&xml))
        .unwrap_or_default();
    let text = read_member(&mut archive, "word/document.xml")
        .and_then(|xml| match document_text(&xml) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(path = %path.display(), "could not parse document body: {e}");
                None
            }
        })
        .filter(|t| !t.trim().is_empty());
    debug!(
        properties = metadata.len(),
        chars = text.as_ref().map(|t| t.chars().count()),
        "extracted docx"
    );

    Ok(ExtractedDocument {
        text_source: text.as_ref().map(|_| TextSource::DocxBody),
        text,
        metadata,
        page_count: None,
    })
}

fn read_member(archive: &mut ZipArchive<File>, name: &str) -> Option<String> {
    let mut member = match archive.by_name(name) {
        Ok(member) => member,
        Err(e) => {
            debug!(name, "archive member unavailable: {e}");
            return None;
        }
    };
    let mut content = String::new();
    match member.read_to_string(&mut content) {
        Ok(_) => Some(content),
        Err(e) => {
            warn!(name, "could not read archive member: {e}");
            None
        }
    }
}

/// Map core property element names to metadata keys.
fn property_key(local_name: &[u8]) -> Option<&'static str> {
    Some(match local_name {
        b"creator" => "author",
        b"created" => "created",
        b"lastModifiedBy" => "last_modified_by",
        b"lastPrinted" => "last_printed",
        b"modified" => "modified",
        b"revision" => "revision",
        b"title" => "title",
        b"category" => "category",
        b"description" => "comments",
        b"identifier" => "identifier",
        b"keywords" => "keywords",
        b"language" => "language",
        b"subject" => "subject",
        b"version" => "version",
        b"contentStatus" => "content_status",
        _ => return None,
    })
}

fn core_properties(xml: &str) -> BTreeMap<String, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<&'static str> = None;
    let mut properties = BTreeMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => current = property_key(e.local_name().as_ref()),
            Ok(Event::Text(e)) => {
                if let (Some(key), Ok(text)) = (current, e.unescape()) {
                    let text = text.trim();
                    if !text.is_empty() {
                        properties.insert(key.to_string(), text.to_string());
                    }
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    properties
}

/// Plain text of the body: one line per paragraph, tabs and breaks kept.
fn document_text(xml: &str) -> std::result::Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_run_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Text(e) if in_run_text => text.push_str(&e.unescape()?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}
