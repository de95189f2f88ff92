use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

use tracing::debug;

use crate::matcher::{self, Query, Search, SearchText};
use crate::patterns::{CC_LICENCES, DOI_RE, LicenceField, PhrasePattern};
use crate::similarity::normalized_ratio;
use crate::types::{DeclaredMetadata, TestRecord, TestResult, TestResults};

// ── Test names ─────────────────────────────────────────────────────────────

pub const TITLE_MATCH_FILE_METADATA: &str = "title_match_file_metadata";
pub const FILE_METADATA_CONTAINS_PUBLISHER_TAGS: &str = "file_metadata_contains_publisher_tags";
pub const MORE_THAN_THREE_PAGES: &str = "more_than_three_pages";
pub const TITLE_MATCH_EXTRACTED_TEXT: &str = "title_match_extracted_text";
pub const DOI_MATCH_EXTRACTED_TEXT: &str = "doi_match_extracted_text";
pub const CC_MATCH_EXTRACTED_TEXT: &str = "cc_match_extracted_text";
pub const PROOF_MARKER_FOUND: &str = "proof_marker_found";
pub const RIGHTS_RESERVED_FOUND: &str = "rights_reserved_found";
pub const DOI_FOUND_IN_CERMXML: &str = "doi_found_in_cermxml";
pub const TITLE_MATCH_CERMXML: &str = "title_match_cermxml";
pub const IMAGE_ON_FIRST_PAGE: &str = "image_on_first_page";

// ── Defaults ───────────────────────────────────────────────────────────────

pub const DEFAULT_MIN_SIMILARITY: f64 = 0.9;
pub const DEFAULT_TITLE_ERROR_RATIO: f64 = 0.1;
pub const DEFAULT_MIN_PAGES: usize = 3;

/// Search the whole text rather than a window.
const ANYWHERE: Range<usize> = 0..usize::MAX;

// ── Title checks ───────────────────────────────────────────────────────────

/// Compare the declared title with a file metadata field.
pub fn title_matches_metadata(
    declared: &DeclaredMetadata,
    metadata: &BTreeMap<String, String>,
    key: &str,
    min_similarity: f64,
) -> TestRecord {
    let value = metadata.get(key).map(String::as_str);
    let record = title_matches_value(declared, value, min_similarity);
    debug!(key, result = %record.result, "title vs file metadata");
    record
}

/// Compare the declared title with any free value, e.g. a title pulled from
/// bibliographic XML.
pub fn title_matches_value(
    declared: &DeclaredMetadata,
    value: Option<&str>,
    min_similarity: f64,
) -> TestRecord {
    let (Some(title), Some(value)) = (declared.title(), value) else {
        return TestRecord::new(TestResult::Indeterminate);
    };
    let score = normalized_ratio(title, value);
    TestRecord::with_detail((score >= min_similarity).into(), format!("similarity {score:.3}"))
}

/// Look for the declared title in the extracted text.
pub fn title_matches_extracted_text(
    declared: &DeclaredMetadata,
    text: Option<&SearchText>,
    error_ratio: f64,
    expected_span: Range<usize>,
) -> TestRecord {
    let Some(title) = declared.title() else {
        return TestRecord::new(TestResult::Indeterminate);
    };
    let found = matcher::search(text, Query::Literal(title), expected_span, error_ratio);
    debug!(result = %found.result(), "title vs extracted text");
    match &found {
        Search::Found(m) => {
            let position = if m.in_expected_position {
                "on first page"
            } else {
                "outside first page"
            };
            TestRecord::with_detail(TestResult::Pass, format!("{:?} at {} ({position})", m.matched, m.start))
        }
        _ => TestRecord::new(found.result()),
    }
}

// ── Identifier and licence checks ──────────────────────────────────────────

pub fn doi_matches_extracted_text(text: Option<&SearchText>) -> TestRecord {
    let found = matcher::search(text, Query::Pattern(&DOI_RE), ANYWHERE, 0.0);
    debug!(result = %found.result(), "doi in extracted text");
    record_from_search(&found)
}

/// First Creative Commons licence mentioned in the text, by URL, long name or
/// short name.
pub fn license_statement_found(text: Option<&SearchText>) -> TestRecord {
    let Some(text) = text else {
        return TestRecord::new(TestResult::Indeterminate);
    };
    for licence in &CC_LICENCES {
        for (field, needle, error_ratio) in licence.variants() {
            if let Some(m) = text.find(Query::Literal(needle), ANYWHERE, error_ratio) {
                let via = match field {
                    LicenceField::Url => "url",
                    LicenceField::LongName => "name",
                    LicenceField::ShortName => "short name",
                };
                debug!(licence = licence.short_name, via, "licence statement found");
                return TestRecord::with_detail(
                    TestResult::Pass,
                    format!("{} ({via}: {:?})", licence.short_name, m.matched),
                );
            }
        }
    }
    debug!("no licence statement");
    TestRecord::new(TestResult::Fail)
}

/// Any of `patterns` present in the text.
pub fn phrase_found(text: Option<&SearchText>, patterns: &[PhrasePattern]) -> TestRecord {
    let Some(text) = text else {
        return TestRecord::new(TestResult::Indeterminate);
    };
    patterns
        .iter()
        .find_map(|p| text.find(Query::Literal(p.text), ANYWHERE, p.error_ratio))
        .map(|m| TestRecord::with_detail(TestResult::Pass, m.matched))
        .unwrap_or_else(|| TestRecord::new(TestResult::Fail))
}

// ── Length ─────────────────────────────────────────────────────────────────

/// Pass when the text holds at least `min_chars` characters.
pub fn extracted_text_long_enough(text: Option<&str>, min_chars: usize) -> TestRecord {
    let Some(text) = text else {
        return TestRecord::new(TestResult::Indeterminate);
    };
    let count = text.chars().count();
    debug!(count, min_chars, "extracted text length");
    TestRecord::with_detail((count >= min_chars).into(), format!("{count} characters"))
}

// ── Reasons ────────────────────────────────────────────────────────────────

/// File name as shown in reasons.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Rejection reason naming each listed test and its result.
pub fn failed_checks_reason(file_name: &str, tests: &TestResults, names: &[&str]) -> String {
    let listed = names
        .iter()
        .map(|name| format!("{name}: {}", tests.result(name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("File {file_name} failed automated checks. {listed}")
}

fn record_from_search(found: &Search) -> TestRecord {
    match found {
        Search::Found(m) => TestRecord::with_detail(TestResult::Pass, m.matched.clone()),
        other => TestRecord::new(other.result()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{DEFAULT_SPAN, PAGE_SIZE_CHARS};
    use crate::patterns::{PROOF_PATTERNS, RIGHTS_RESERVED_PATTERNS};

    fn declared(title: &str) -> DeclaredMetadata {
        DeclaredMetadata::new(Some(title), "accepted version")
    }

    #[test]
    fn verbatim_title_in_metadata_passes() {
        let mut metadata = BTreeMap::new();
        metadata.insert("title".to_string(), "Quantum Dots in Cell Imaging".to_string());
        let rec = title_matches_metadata(
            &declared("Quantum Dots in Cell Imaging"),
            &metadata,
            "title",
            DEFAULT_MIN_SIMILARITY,
        );
        assert_eq!(rec.result, TestResult::Pass);
    }

    #[test]
    fn metadata_title_tolerates_case_and_spacing() {
        let mut metadata = BTreeMap::new();
        metadata.insert("/Title".to_string(), "quantum dots  in cell imaging".to_string());
        let rec = title_matches_metadata(
            &declared("Quantum Dots in Cell Imaging"),
            &metadata,
            "/Title",
            DEFAULT_MIN_SIMILARITY,
        );
        assert!(rec.result.is_pass());
    }

    #[test]
    fn unrelated_metadata_title_fails() {
        let mut metadata = BTreeMap::new();
        metadata.insert("title".to_string(), "Microsoft Word - draft3.docx".to_string());
        let rec = title_matches_metadata(&declared("Quantum Dots"), &metadata, "title", 0.9);
        assert_eq!(rec.result, TestResult::Fail);
    }

    #[test]
    fn missing_key_or_title_is_indeterminate() {
        let metadata = BTreeMap::new();
        let rec = title_matches_metadata(&declared("Quantum Dots"), &metadata, "title", 0.9);
        assert_eq!(rec.result, TestResult::Indeterminate);
        let untitled = DeclaredMetadata::new(None, "accepted version");
        assert_eq!(
            title_matches_value(&untitled, Some("anything"), 0.9).result,
            TestResult::Indeterminate
        );
    }

    #[test]
    fn title_in_text_records_position() {
        let text = SearchText::new("Reprint\nQuantum Dots in\nCell Imaging\nAbstract ...");
        let rec = title_matches_extracted_text(
            &declared("Quantum Dots in Cell Imaging"),
            Some(&text),
            DEFAULT_TITLE_ERROR_RATIO,
            DEFAULT_SPAN,
        );
        assert_eq!(rec.result, TestResult::Pass);
        assert!(rec.detail.unwrap().contains("on first page"));
    }

    #[test]
    fn title_late_in_text_still_passes() {
        let text = SearchText::new(&format!("{} Quantum Dots", "filler ".repeat(500)));
        let rec = title_matches_extracted_text(&declared("Quantum Dots"), Some(&text), 0.1, DEFAULT_SPAN);
        assert_eq!(rec.result, TestResult::Pass);
        assert!(rec.detail.unwrap().contains("outside first page"));
    }

    #[test]
    fn title_without_text_is_indeterminate() {
        let rec = title_matches_extracted_text(&declared("Quantum Dots"), None, 0.1, DEFAULT_SPAN);
        assert_eq!(rec.result, TestResult::Indeterminate);
    }

    #[test]
    fn doi_found_anywhere() {
        let text = SearchText::new(&format!("{} doi:10.1016/j.cell.2020.01.001", "x ".repeat(4000)));
        let rec = doi_matches_extracted_text(Some(&text));
        assert_eq!(rec.result, TestResult::Pass);
        assert_eq!(rec.detail.as_deref(), Some("10.1016/j.cell.2020.01.001"));
        let none = SearchText::new("no identifiers here");
        assert_eq!(doi_matches_extracted_text(Some(&none)).result, TestResult::Fail);
        assert_eq!(doi_matches_extracted_text(None).result, TestResult::Indeterminate);
    }

    #[test]
    fn licence_detected_by_url_name_or_short_name() {
        let by_url = SearchText::new("licensed under https://creativecommons.org/licenses/by/4.0/ terms");
        let rec = license_statement_found(Some(&by_url));
        assert_eq!(rec.result, TestResult::Pass);
        assert!(rec.detail.unwrap().starts_with("CC BY (url"));

        let by_name = SearchText::new("This is an open access article under the Creative Commons Atribution licence");
        assert!(license_statement_found(Some(&by_name)).result.is_pass());

        let by_short = SearchText::new("Distributed under a CC BY-NC-ND licence.");
        assert!(license_statement_found(Some(&by_short)).result.is_pass());
    }

    #[test]
    fn no_licence_fails() {
        let text = SearchText::new("Copyright 2020 Elsevier Ltd.");
        assert_eq!(license_statement_found(Some(&text)).result, TestResult::Fail);
        assert_eq!(license_statement_found(None).result, TestResult::Indeterminate);
    }

    #[test]
    fn length_boundary_is_three_pages() {
        let min = DEFAULT_MIN_PAGES * PAGE_SIZE_CHARS;
        assert_eq!(min, 7800);
        let exact = "a".repeat(7800);
        let short = "a".repeat(7799);
        assert_eq!(extracted_text_long_enough(Some(&exact), min).result, TestResult::Pass);
        assert_eq!(extracted_text_long_enough(Some(&short), min).result, TestResult::Fail);
        assert_eq!(extracted_text_long_enough(None, min).result, TestResult::Indeterminate);
    }

    #[test]
    fn failure_reason_names_each_check() {
        let mut tests = TestResults::default();
        tests.record(MORE_THAN_THREE_PAGES, TestRecord::new(TestResult::Fail));
        tests.record(TITLE_MATCH_FILE_METADATA, TestRecord::new(TestResult::Indeterminate));
        let reason = failed_checks_reason(
            "paper.docx",
            &tests,
            &[MORE_THAN_THREE_PAGES, TITLE_MATCH_FILE_METADATA, TITLE_MATCH_EXTRACTED_TEXT],
        );
        assert_eq!(
            reason,
            "File paper.docx failed automated checks. more_than_three_pages: false, \
             title_match_file_metadata: indeterminate, title_match_extracted_text: indeterminate"
        );
    }

    #[test]
    fn proof_and_rights_phrases() {
        let proof = SearchText::new("JCEL 1234 UNCORECTED PROOF page 3");
        assert!(phrase_found(Some(&proof), &PROOF_PATTERNS).result.is_pass());
        let rights = SearchText::new("(c) 2021 The Authors. All rights reserved.");
        assert!(phrase_found(Some(&rights), &RIGHTS_RESERVED_PATTERNS).result.is_pass());
        let plain = SearchText::new("nothing of note");
        assert_eq!(phrase_found(Some(&plain), &PROOF_PATTERNS).result, TestResult::Fail);
    }
}
