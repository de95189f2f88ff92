use std::ops::Range;

use regex::Regex;
use tracing::debug;

use crate::types::TestResult;

/// Characters in an uninterrupted page of text (~1300 words).
pub const PAGE_SIZE_CHARS: usize = 2600;

/// Where a title is expected to appear: the first page.
pub const DEFAULT_SPAN: Range<usize> = 0..PAGE_SIZE_CHARS;

/// What to look for.
#[derive(Debug, Clone, Copy)]
pub enum Query<'a> {
    /// Matched as written, ignoring case, optionally with edit errors.
    Literal(&'a str),
    /// A pre-built expression such as the DOI pattern. Always exact.
    Pattern(&'a Regex),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    pub matched: String,
    /// Character offsets into the normalized text.
    pub start: usize,
    pub end: usize,
    pub in_expected_position: bool,
}

/// Outcome of searching text that may not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Search {
    Found(TextMatch),
    NotFound,
    TextUnavailable,
}

impl Search {
    pub fn result(&self) -> TestResult {
        match self {
            Self::Found(_) => TestResult::Pass,
            Self::NotFound => TestResult::Fail,
            Self::TextUnavailable => TestResult::Indeterminate,
        }
    }
}

/// Extracted text prepared for repeated searching.
#[derive(Debug, Clone)]
pub struct SearchText {
    normalized: String,
    chars: Vec<char>,
    /// Case-folded, one char per char of `normalized`.
    folded: String,
}

impl SearchText {
    pub fn new(raw: &str) -> Self {
        let normalized = normalize(raw);
        let chars: Vec<char> = normalized.chars().collect();
        let folded = chars.iter().map(|c| fold_char(*c)).collect();
        Self {
            normalized,
            chars,
            folded,
        }
    }

    pub fn find(
        &self,
        query: Query<'_>,
        expected_span: Range<usize>,
        allowed_error_ratio: f64,
    ) -> Option<TextMatch> {
        let span = match query {
            Query::Pattern(re) => self.find_pattern(re),
            Query::Literal(q) => self.find_literal(q, allowed_error_ratio),
        }?;
        let in_expected_position = span.start >= expected_span.start && span.end <= expected_span.end;
        let matched: String = self.chars[span.clone()].iter().collect();
        debug!(%matched, start = span.start, end = span.end, "match found");
        Some(TextMatch {
            matched,
            start: span.start,
            end: span.end,
            in_expected_position,
        })
    }

    fn find_pattern(&self, re: &Regex) -> Option<Range<usize>> {
        let m = re.find(&self.normalized)?;
        let start = self.normalized[..m.start()].chars().count();
        let end = start + m.as_str().chars().count();
        Some(start..end)
    }

    fn find_literal(&self, query: &str, allowed_error_ratio: f64) -> Option<Range<usize>> {
        let query: Vec<char> = query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .map(fold_char)
            .collect();
        if query.is_empty() {
            return None;
        }
        let max_errors = (allowed_error_ratio.max(0.0) * query.len() as f64).floor() as usize;
        if max_errors == 0 {
            let needle: String = query.iter().collect();
            let byte = self.folded.find(&needle)?;
            let start = self.folded[..byte].chars().count();
            return Some(start..start + query.len());
        }
        let text: Vec<char> = self.folded.chars().collect();
        approximate_find(&text, &query, max_errors)
    }
}

/// Collapse every whitespace run to one space. A line break glued to a
/// trailing `/` or `-` is dropped so wrapped URLs and identifiers re-join.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if !ch.is_whitespace() {
            out.push(ch);
            continue;
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if is_line_break(ch) && ends_with_glued_break_char(&out) {
            continue;
        }
        out.push(' ');
    }
    out
}

fn is_line_break(ch: char) -> bool {
    ch == '\n' || ch == '\r'
}

fn ends_with_glued_break_char(out: &str) -> bool {
    let mut tail = out.chars().rev();
    match (tail.next(), tail.next()) {
        (Some('/' | '-'), Some(prev)) => !prev.is_whitespace(),
        _ => false,
    }
}

fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Substring of `text` within `max_errors` edits of `query`. Starting from
/// the leftmost-ending hit, the cheapest end within reach of it wins; ties go
/// to the earlier end.
fn approximate_find(text: &[char], query: &[char], max_errors: usize) -> Option<Range<usize>> {
    let m = query.len();
    // cost[i]: edits to turn query[..i] into the best text substring ending here.
    // from[i]: where that substring starts.
    let mut cost: Vec<usize> = (0..=m).collect();
    let mut from: Vec<usize> = vec![0; m + 1];
    let mut next_cost = vec![0; m + 1];
    let mut next_from = vec![0; m + 1];
    let mut best: Option<(usize, Range<usize>)> = None;
    // Past this end no substring can still overlap the first hit.
    let mut window_end: Option<usize> = None;

    for (j, t) in text.iter().enumerate() {
        next_cost[0] = 0;
        next_from[0] = j + 1;
        for i in 1..=m {
            let diagonal = cost[i - 1] + usize::from(query[i - 1] != *t);
            let skip_text = cost[i] + 1;
            let skip_query = next_cost[i - 1] + 1;
            if diagonal <= skip_text && diagonal <= skip_query {
                next_cost[i] = diagonal;
                next_from[i] = from[i - 1];
            } else if skip_query <= skip_text {
                next_cost[i] = skip_query;
                next_from[i] = next_from[i - 1];
            } else {
                next_cost[i] = skip_text;
                next_from[i] = from[i];
            }
        }
        std::mem::swap(&mut cost, &mut next_cost);
        std::mem::swap(&mut from, &mut next_from);

        let end = j + 1;
        if window_end.is_some_and(|limit| end > limit) {
            break;
        }
        if cost[m] <= max_errors && best.as_ref().is_none_or(|(c, _)| cost[m] < *c) {
            if best.is_none() {
                window_end = Some(end + m + max_errors);
            }
            best = Some((cost[m], from[m]..end));
            if cost[m] == 0 {
                break;
            }
        }
    }
    best.map(|(_, range)| range)
}

/// Search `text` for `query`. `None` means no match, not a failed extraction.
pub fn find_match(
    text: &str,
    query: Query<'_>,
    expected_span: Range<usize>,
    allowed_error_ratio: f64,
) -> Option<TextMatch> {
    SearchText::new(text).find(query, expected_span, allowed_error_ratio)
}

/// Like [`find_match`] but distinguishes missing text from a miss.
pub fn search(
    text: Option<&SearchText>,
    query: Query<'_>,
    expected_span: Range<usize>,
    allowed_error_ratio: f64,
) -> Search {
    let Some(text) = text else {
        return Search::TextUnavailable;
    };
    match text.find(query, expected_span, allowed_error_ratio) {
        Some(m) => Search::Found(m),
        None => Search::NotFound,
    }
}
