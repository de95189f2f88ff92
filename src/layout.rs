use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::zones::{self, Corners, Page, StructuralDocument, Zone};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    /// Pages sampled on either side of the middle page.
    pub sample_radius: usize,
    /// Body zones wider than this (pt) count as full-width text.
    pub wide_zone_min_width: f64,
    pub min_line_numbers: usize,
    pub max_line_number_exceptions: usize,
    /// Allowed drift (pt) between consecutive line-number margins.
    pub margin_tolerance: f64,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            sample_radius: 2,
            // c. 110 mm
            wide_zone_min_width: 312.0,
            min_line_numbers: 5,
            max_line_number_exceptions: 3,
            margin_tolerance: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnLayout {
    Single,
    Multi,
}

/// Document-level layout statistics. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutStats {
    pub pages: usize,
    pub sampled_pages: Vec<usize>,
    pub line_spacing: Option<f64>,
    pub columns: Option<ColumnLayout>,
    pub numbered_lines: bool,
}

pub fn analyze_file(path: &Path, settings: &LayoutSettings) -> Result<LayoutStats> {
    let doc = zones::parse_file(path)?;
    Ok(analyze(&doc, settings))
}

pub fn analyze(doc: &StructuralDocument, settings: &LayoutSettings) -> LayoutStats {
    let sampled = sample_pages(doc, settings.sample_radius);
    let line_spacing = line_spacing(doc, &sampled);
    if line_spacing.is_none() {
        warn!("could not detect spacing of body content zones");
    }
    let candidates = line_number_candidates(doc, &sampled);
    LayoutStats {
        pages: doc.pages.len(),
        line_spacing,
        columns: column_layout(doc, &sampled, settings),
        numbered_lines: has_numbered_lines(&candidates, settings),
        sampled_pages: sampled,
    }
}

/// Page indices in `[middle - radius, middle + radius]`, clamped to the document.
pub fn sample_pages(doc: &StructuralDocument, radius: usize) -> Vec<usize> {
    let count = doc.pages.len();
    if count == 0 {
        return Vec::new();
    }
    let middle = count / 2;
    let first = middle.saturating_sub(radius);
    let last = (middle + radius).min(count - 1);
    (first..=last).collect()
}

fn body_zones<'a>(doc: &'a StructuralDocument, pages: &'a [usize]) -> impl Iterator<Item = (usize, &'a Zone)> {
    pages.iter().filter_map(move |i| doc.pages.get(*i).map(|p| (*i, p))).flat_map(|(i, page)| {
        page.zones
            .iter()
            .filter(|z| z.is_body_content())
            .map(move |z| (i, z))
    })
}

// ── Line spacing ───────────────────────────────────────────────────────────

/// Baseline distance over line height, taken from the zone's last line pair
/// with a non-zero height. `None` with fewer than two lines.
pub fn zone_line_spacing(zone: &Zone) -> Option<f64> {
    let mut previous_baseline: Option<f64> = None;
    let mut spacing = None;
    for line in &zone.lines {
        let (Some(top), Some(baseline)) = (line.corners.top(), line.corners.baseline()) else {
            continue;
        };
        let height = baseline - top;
        if let Some(prev) = previous_baseline
            && height != 0.0
        {
            spacing = Some((baseline - prev) / height);
        }
        previous_baseline = Some(baseline);
    }
    spacing
}

/// Median zone spacing over the sampled body-content zones.
pub fn line_spacing(doc: &StructuralDocument, pages: &[usize]) -> Option<f64> {
    let mut values: Vec<f64> = body_zones(doc, pages)
        .filter_map(|(_, z)| zone_line_spacing(z))
        .collect();
    median(&mut values)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

// ── Columns ────────────────────────────────────────────────────────────────

pub fn column_layout(
    doc: &StructuralDocument,
    pages: &[usize],
    settings: &LayoutSettings,
) -> Option<ColumnLayout> {
    let (mut wide, mut narrow) = (0usize, 0usize);
    for (_, zone) in body_zones(doc, pages) {
        match zone.corners.width() {
            Some(w) if w > settings.wide_zone_min_width => wide += 1,
            Some(_) => narrow += 1,
            None => {}
        }
    }
    debug!(wide, narrow, "body zone widths");
    if wide + narrow == 0 {
        None
    } else if wide > narrow {
        Some(ColumnLayout::Single)
    } else {
        Some(ColumnLayout::Multi)
    }
}

// ── Numbered lines ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineNumber {
    pub number: u64,
    pub page: usize,
    pub left: f64,
    pub right: f64,
}

/// Lines in sampled body zones that start with an all-digit word.
pub fn line_number_candidates(doc: &StructuralDocument, pages: &[usize]) -> Vec<LineNumber> {
    body_zones(doc, pages)
        .flat_map(|(page, zone)| zone.lines.iter().map(move |l| (page, l)))
        .filter_map(|(page, line)| {
            let word = line.words.first()?;
            let text = word.text();
            if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            Some(LineNumber {
                number: text.parse().ok()?,
                page,
                left: word.corners.left_margin()?,
                right: word.corners.right_margin()?,
            })
        })
        .collect()
}

/// Numbers increase within a page and sit at a steady margin, with a few
/// exceptions tolerated.
pub fn has_numbered_lines(candidates: &[LineNumber], settings: &LayoutSettings) -> bool {
    if candidates.len() < settings.min_line_numbers {
        return false;
    }
    let exceptions: usize = candidates
        .windows(2)
        .map(|pair| {
            let (prev, cur) = (pair[0], pair[1]);
            let out_of_order = cur.page == prev.page && cur.number <= prev.number;
            let drifted = (cur.left - prev.left).abs() > settings.margin_tolerance
                || (cur.right - prev.right).abs() > settings.margin_tolerance;
            usize::from(out_of_order) + usize::from(drifted)
        })
        .sum();
    debug!(candidates = candidates.len(), exceptions, "line number candidates");
    exceptions <= settings.max_line_number_exceptions
}

// ── Diagnostics ────────────────────────────────────────────────────────────

/// One line per body zone on the sampled pages.
pub fn describe_zones(doc: &StructuralDocument, settings: &LayoutSettings) -> Vec<String> {
    let sampled = sample_pages(doc, settings.sample_radius);
    body_zones(doc, &sampled)
        .map(|(page, zone)| {
            let width = zone.corners.width().unwrap_or(0.0);
            let spacing = zone_line_spacing(zone)
                .map(|s| format!("{s:5.2}"))
                .unwrap_or_else(|| "    -".to_string());
            let preview: String = zone
                .lines
                .first()
                .map(|l| l.text())
                .unwrap_or_default()
                .chars()
                .take(60)
                .collect();
            format!(
                "p{} z{:<4} w={width:6.1} lines={:<3} spacing={spacing} | {preview}",
                page + 1,
                zone.id,
                zone.lines.len()
            )
        })
        .collect()
}

/// Standalone LaTeX/TikZ drawing of one page: zones red, lines blue, words
/// green, characters yellow with their text.
pub fn tikz_page(page: &Page) -> String {
    let mut s = String::from(
        "\\documentclass[a4paper,8pt]{extarticle}\n\\usepackage{geometry, tikz}\n\\geometry{margin=0pt}\n\
         \\renewcommand{\\familydefault}{\\ttdefault}\n\\begin{document}\n\\pagestyle{empty}\n\
         \\begin{tikzpicture}[x=1pt,y=1pt]\n",
    );
    for zone in &page.zones {
        for line in &zone.lines {
            for word in &line.words {
                for ch in &word.characters {
                    rectangle(&mut s, &ch.corners, "yellow");
                    if let (Some(a), Some(b)) = (ch.corners.vertex(0), ch.corners.vertex(2)) {
                        let _ = writeln!(
                            s,
                            "\\draw ({},{}) node {{{}}};",
                            (a.x + b.x) / 2.0,
                            (a.y + b.y) / 2.0,
                            tex_escape(&ch.value)
                        );
                    }
                }
                rectangle(&mut s, &word.corners, "green");
            }
            rectangle(&mut s, &line.corners, "blue");
        }
        rectangle(&mut s, &zone.corners, "red");
    }
    s.push_str("\\end{tikzpicture}\n\\end{document}\n");
    s
}

fn rectangle(s: &mut String, corners: &Corners, colour: &str) {
    if let (Some(a), Some(b)) = (corners.vertex(0), corners.vertex(2)) {
        let _ = writeln!(
            s,
            "\\draw[draw={colour}] ({},{}) rectangle ({},{});",
            a.x, a.y, b.x, b.y
        );
    }
}

fn tex_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(ch);
            }
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\^{}"),
            '\\' => out.push_str("\\textbackslash{}"),
            '<' => out.push_str("\\textless{}"),
            '>' => out.push_str("\\textgreater{}"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::BODY_CONTENT;
    use crate::zones::tests::trueviz;

    fn doc(xml: &str) -> StructuralDocument {
        zones::parse_str(xml).unwrap()
    }

    /// Body zone with evenly spaced lines: height 10, baseline step `step`.
    fn spaced_zone(step: f64, lines: usize) -> (&'static str, f64, f64, Vec<(f64, f64, Vec<&'static str>)>) {
        let lines = (0..lines)
            .map(|i| {
                let top = i as f64 * step;
                (top, top + 10.0, vec!["text"])
            })
            .collect();
        (BODY_CONTENT, 50.0, 450.0, lines)
    }

    #[test]
    fn sample_window_is_centered_and_clamped() {
        let blank = |n: usize| doc(&trueviz(&vec![vec![]; n]));
        assert_eq!(sample_pages(&blank(10), 2), vec![3, 4, 5, 6, 7]);
        assert_eq!(sample_pages(&blank(3), 2), vec![0, 1, 2]);
        assert_eq!(sample_pages(&blank(1), 2), vec![0]);
        assert!(sample_pages(&blank(0), 2).is_empty());
    }

    #[test]
    fn double_spacing_reads_as_two() {
        let d = doc(&trueviz(&[vec![spaced_zone(20.0, 4)]]));
        let spacing = line_spacing(&d, &[0]).unwrap();
        assert!((spacing - 2.0).abs() < 1e-9);
    }

    #[test]
    fn single_line_zone_has_no_spacing() {
        let d = doc(&trueviz(&[vec![spaced_zone(20.0, 1)]]));
        assert_eq!(zone_line_spacing(&d.pages[0].zones[0]), None);
        assert_eq!(line_spacing(&d, &[0]), None);
    }

    #[test]
    fn median_over_zones() {
        let d = doc(&trueviz(&[vec![
            spaced_zone(12.0, 3),
            spaced_zone(15.0, 3),
            spaced_zone(30.0, 3),
        ]]));
        assert!((line_spacing(&d, &[0]).unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn wide_zones_mean_single_column() {
        let settings = LayoutSettings::default();
        let wide = doc(&trueviz(&[vec![spaced_zone(12.0, 2)]]));
        assert_eq!(column_layout(&wide, &[0], &settings), Some(ColumnLayout::Single));

        let narrow = (BODY_CONTENT, 50.0, 290.0, vec![(0.0, 10.0, vec!["a"])]);
        let two_col = doc(&trueviz(&[vec![narrow.clone(), narrow]]));
        assert_eq!(column_layout(&two_col, &[0], &settings), Some(ColumnLayout::Multi));

        let empty = doc(&trueviz(&[vec![]]));
        assert_eq!(column_layout(&empty, &[0], &settings), None);
    }

    #[test]
    fn tie_between_wide_and_narrow_is_multi_column() {
        let narrow = (BODY_CONTENT, 50.0, 290.0, vec![(0.0, 10.0, vec!["a"])]);
        let d = doc(&trueviz(&[vec![spaced_zone(12.0, 2), narrow]]));
        assert_eq!(
            column_layout(&d, &[0], &LayoutSettings::default()),
            Some(ColumnLayout::Multi)
        );
    }

    #[test]
    fn non_body_zones_are_ignored() {
        let header = ("GEN_HEADER", 50.0, 290.0, vec![(0.0, 10.0, vec!["1"])]);
        let d = doc(&trueviz(&[vec![header]]));
        assert_eq!(column_layout(&d, &[0], &LayoutSettings::default()), None);
        assert!(line_number_candidates(&d, &[0]).is_empty());
    }

    fn numbered_zone(numbers: &[&'static str]) -> (&'static str, f64, f64, Vec<(f64, f64, Vec<&'static str>)>) {
        let lines = numbers
            .iter()
            .enumerate()
            .map(|(i, n)| {
                let top = i as f64 * 14.0;
                (top, top + 10.0, vec![*n, "body"])
            })
            .collect();
        (BODY_CONTENT, 40.0, 450.0, lines)
    }

    #[test]
    fn steady_increasing_numbers_are_line_numbers() {
        let d = doc(&trueviz(&[vec![numbered_zone(&["1", "2", "3", "4", "5", "6"])]]));
        let candidates = line_number_candidates(&d, &[0]);
        assert_eq!(candidates.len(), 6);
        assert!(has_numbered_lines(&candidates, &LayoutSettings::default()));
    }

    #[test]
    fn too_few_candidates_is_not_numbered() {
        let d = doc(&trueviz(&[vec![numbered_zone(&["1", "2", "3", "4"])]]));
        let candidates = line_number_candidates(&d, &[0]);
        assert!(!has_numbered_lines(&candidates, &LayoutSettings::default()));
    }

    #[test]
    fn scrambled_numbers_are_not_line_numbers() {
        let d = doc(&trueviz(&[vec![numbered_zone(&["9", "3", "7", "2", "8", "1", "5", "4"])]]));
        let candidates = line_number_candidates(&d, &[0]);
        assert!(!has_numbered_lines(&candidates, &LayoutSettings::default()));
    }

    #[test]
    fn drifting_margins_count_as_exceptions() {
        let settings = LayoutSettings::default();
        let at = |number, left| LineNumber {
            number,
            page: 0,
            left,
            right: left + 10.0,
        };
        let steady: Vec<_> = (1..=6).map(|n| at(n, 40.0)).collect();
        assert!(has_numbered_lines(&steady, &settings));
        let zigzag: Vec<_> = (1..=6)
            .map(|n| at(n, if n % 2 == 0 { 40.0 } else { 300.0 }))
            .collect();
        assert!(!has_numbered_lines(&zigzag, &settings));
    }

    #[test]
    fn analyze_collects_everything() {
        let pages: Vec<_> = (0..5).map(|_| vec![spaced_zone(20.0, 3)]).collect();
        let stats = analyze(&doc(&trueviz(&pages)), &LayoutSettings::default());
        assert_eq!(stats.pages, 5);
        assert_eq!(stats.sampled_pages, vec![0, 1, 2, 3, 4]);
        assert_eq!(stats.columns, Some(ColumnLayout::Single));
        assert!(!stats.numbered_lines);
        assert!((stats.line_spacing.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn tikz_escapes_special_characters() {
        assert_eq!(tex_escape("a_b&c"), "a\\_b\\&c");
        let d = doc(&trueviz(&[vec![spaced_zone(20.0, 2)]]));
        let tex = tikz_page(&d.pages[0]);
        assert!(tex.contains("\\draw[draw=red] (50,0)"));
        assert!(tex.ends_with("\\end{document}\n"));
    }
}
