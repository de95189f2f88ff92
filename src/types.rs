use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::candidates::VersionCandidateSet;
use crate::cermine::BibliographicRecord;
use crate::layout::LayoutStats;

/// NISO manuscript version stages (RP-8-2008).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum VersionStage {
    #[serde(rename = "submitted manuscript under review")]
    SubmittedManuscriptUnderReview,
    #[serde(rename = "accepted manuscript")]
    AcceptedManuscript,
    #[serde(rename = "proof")]
    Proof,
    #[serde(rename = "version of record")]
    VersionOfRecord,
}

impl VersionStage {
    pub const ALL: [VersionStage; 4] = [
        VersionStage::SubmittedManuscriptUnderReview,
        VersionStage::AcceptedManuscript,
        VersionStage::Proof,
        VersionStage::VersionOfRecord,
    ];

    /// Stages produced by authors rather than by a publisher's pipeline.
    pub const AUTHOR_GENERATED: [VersionStage; 2] = [
        VersionStage::SubmittedManuscriptUnderReview,
        VersionStage::AcceptedManuscript,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::SubmittedManuscriptUnderReview => "submitted manuscript under review",
            Self::AcceptedManuscript => "accepted manuscript",
            Self::Proof => "proof",
            Self::VersionOfRecord => "version of record",
        }
    }

    pub fn is_author_generated(self) -> bool {
        Self::AUTHOR_GENERATED.contains(&self)
    }

    /// Map a free-text version label onto the controlled vocabulary.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        match normalized.as_str() {
            "submitted"
            | "submitted version"
            | "submitted manuscript"
            | "submitted manuscript under review"
            | "smur"
            | "preprint" => Some(Self::SubmittedManuscriptUnderReview),
            "accepted"
            | "accepted version"
            | "accepted manuscript"
            | "author accepted manuscript"
            | "am"
            | "aam"
            | "postprint" => Some(Self::AcceptedManuscript),
            "proof" | "proofs" => Some(Self::Proof),
            "published"
            | "published version"
            | "version of record"
            | "vor"
            | "publisher version" => Some(Self::VersionOfRecord),
            _ => None,
        }
    }
}

impl fmt::Display for VersionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The version label a depositor supplied, kept verbatim for reason strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredVersion {
    pub label: String,
    pub stage: Option<VersionStage>,
}

impl DeclaredVersion {
    pub fn parse(label: &str) -> Self {
        Self {
            label: label.to_string(),
            stage: VersionStage::from_label(label),
        }
    }

    pub fn is_author_generated(&self) -> bool {
        self.stage.is_some_and(VersionStage::is_author_generated)
    }
}

impl fmt::Display for DeclaredVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    /// ORCID or any other persistent identifier.
    pub identifier: Option<String>,
}

impl Author {
    /// Parse `"Name"` or `"Name;identifier"`.
    pub fn parse(value: &str) -> Self {
        match value.split_once(';') {
            Some((name, id)) if !id.trim().is_empty() => Self {
                name: name.trim().to_string(),
                identifier: Some(id.trim().to_string()),
            },
            Some((name, _)) => Self {
                name: name.trim().to_string(),
                identifier: None,
            },
            None => Self {
                name: value.trim().to_string(),
                identifier: None,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationFields {
    pub doi: Option<String>,
    pub acceptance_date: Option<String>,
    pub publication_date: Option<String>,
}

/// What the depositor told us about the manuscript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredMetadata {
    pub title: Option<String>,
    pub version: DeclaredVersion,
    pub authors: Vec<Author>,
    pub citation: CitationFields,
}

impl DeclaredMetadata {
    pub fn new(title: Option<&str>, version: &str) -> Self {
        Self {
            title: title.map(str::to_string),
            version: DeclaredVersion::parse(version),
            authors: Vec::new(),
            citation: CitationFields::default(),
        }
    }

    /// Declared title, if one was given and is not blank.
    pub fn title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Which extraction route produced a document's plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    Pdfium,
    Lopdf,
    CermineSidecar,
    DocxBody,
}

/// File metadata and plain text pulled from a source file, built once per parse.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pub text: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub page_count: Option<usize>,
    pub text_source: Option<TextSource>,
}

impl ExtractedDocument {
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// Outcome of one heuristic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestResult {
    Pass,
    Fail,
    /// The check could not be run (missing input, failed extraction).
    Indeterminate,
}

impl TestResult {
    pub fn is_pass(self) -> bool {
        self == Self::Pass
    }

    pub fn as_option(self) -> Option<bool> {
        match self {
            Self::Pass => Some(true),
            Self::Fail => Some(false),
            Self::Indeterminate => None,
        }
    }
}

impl From<bool> for TestResult {
    fn from(found: bool) -> Self {
        if found { Self::Pass } else { Self::Fail }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("true"),
            Self::Fail => f.write_str("false"),
            Self::Indeterminate => f.write_str("indeterminate"),
        }
    }
}

impl Serialize for TestResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_option().serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestRecord {
    pub result: TestResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TestRecord {
    pub fn new(result: TestResult) -> Self {
        Self {
            result,
            detail: None,
        }
    }

    pub fn with_detail(result: TestResult, detail: impl Into<String>) -> Self {
        Self {
            result,
            detail: Some(detail.into()),
        }
    }
}

/// Named test records in the order the battery ran them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestResults {
    entries: Vec<(&'static str, TestRecord)>,
}

impl TestResults {
    pub fn record(&mut self, name: &'static str, record: TestRecord) -> TestResult {
        let result = record.result;
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = record,
            None => self.entries.push((name, record)),
        }
        result
    }

    pub fn get(&self, name: &str) -> Option<&TestRecord> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, r)| r)
    }

    /// Result for `name`; tests that never ran read as indeterminate.
    pub fn result(&self, name: &str) -> TestResult {
        self.get(name)
            .map(|r| r.result)
            .unwrap_or(TestResult::Indeterminate)
    }

    pub fn passed(&self, name: &str) -> bool {
        self.result(name).is_pass()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &TestRecord)> {
        self.entries.iter().map(|(n, r)| (*n, r))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for TestResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(n, r)| (*n, r)))
    }
}

/// File categories recognized by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Pdf,
    Docx,
    /// Recognized editable formats that are not parsed.
    EditableDocument,
    Unrecognized,
}

/// Decision returned for every file, whatever its format.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub approved: bool,
    pub reason: String,
    /// Approval rests on evidence a proof could also carry.
    pub needs_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FileKind>,
    pub tests: TestResults,
    pub candidates: VersionCandidateSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bibliographic: Option<BibliographicRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutStats>,
    /// Extraction route that supplied the text, if any did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_source: Option<TextSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
}

impl Outcome {
    pub fn new(format: FileKind, tests: TestResults, candidates: VersionCandidateSet) -> Self {
        Self {
            approved: false,
            reason: String::new(),
            needs_review: false,
            format: Some(format),
            tests,
            candidates,
            bibliographic: None,
            layout: None,
            text_source: None,
            page_count: None,
        }
    }

    /// Rejection that happened before any test ran.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
            needs_review: false,
            format: None,
            tests: TestResults::default(),
            candidates: VersionCandidateSet::full(),
            bibliographic: None,
            layout: None,
            text_source: None,
            page_count: None,
        }
    }

    /// Record how the document's text was obtained.
    pub fn extracted_from(mut self, doc: &ExtractedDocument) -> Self {
        self.text_source = doc.text_source;
        self.page_count = doc.page_count;
        self
    }

    pub fn approve(mut self, reason: impl Into<String>) -> Self {
        self.approved = true;
        self.reason = reason.into();
        self
    }

    pub fn reject(mut self, reason: impl Into<String>) -> Self {
        self.approved = false;
        self.reason = reason.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_labels_map_onto_niso_stages() {
        assert_eq!(
            VersionStage::from_label("Accepted version"),
            Some(VersionStage::AcceptedManuscript)
        );
        assert_eq!(
            VersionStage::from_label("  submitted   VERSION "),
            Some(VersionStage::SubmittedManuscriptUnderReview)
        );
        assert_eq!(
            VersionStage::from_label("Published version"),
            Some(VersionStage::VersionOfRecord)
        );
        assert_eq!(VersionStage::from_label("supporting information"), None);
    }

    #[test]
    fn unknown_label_is_not_author_generated() {
        let v = DeclaredVersion::parse("Supplementary material");
        assert!(v.stage.is_none());
        assert!(!v.is_author_generated());
        assert_eq!(v.to_string(), "Supplementary material");
    }

    #[test]
    fn author_spec_with_orcid() {
        let a = Author::parse("Jane Roe; 0000-0002-1825-0097");
        assert_eq!(a.name, "Jane Roe");
        assert_eq!(a.identifier.as_deref(), Some("0000-0002-1825-0097"));
        assert_eq!(Author::parse("Jane Roe").identifier, None);
    }

    #[test]
    fn blank_title_counts_as_missing() {
        let declared = DeclaredMetadata::new(Some("   "), "accepted version");
        assert_eq!(declared.title(), None);
    }

    #[test]
    fn results_keep_run_order_and_replace_duplicates() {
        let mut results = TestResults::default();
        results.record("b", TestRecord::new(TestResult::Fail));
        results.record("a", TestRecord::new(TestResult::Pass));
        results.record("b", TestRecord::new(TestResult::Indeterminate));
        let names: Vec<_> = results.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(results.result("b"), TestResult::Indeterminate);
        assert_eq!(results.result("missing"), TestResult::Indeterminate);
    }

    #[test]
    fn test_results_serialize_as_nullable_bools() {
        let mut results = TestResults::default();
        results.record("found", TestRecord::new(TestResult::Pass));
        results.record("unknown", TestRecord::new(TestResult::Indeterminate));
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["found"]["result"], serde_json::json!(true));
        assert!(json["unknown"]["result"].is_null());
    }
}
