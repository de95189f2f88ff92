use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;

use crate::error::{DetectError, Result};

/// Zone category CERMINE assigns to running body text.
pub const BODY_CONTENT: &str = "BODY_CONTENT";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

/// Corner vertices in TrueViz order: top-left, top-right, bottom-right,
/// bottom-left (y grows downwards).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Corners(Vec<Vertex>);

impl Corners {
    pub fn vertex(&self, i: usize) -> Option<Vertex> {
        self.0.get(i).copied()
    }

    pub fn top(&self) -> Option<f64> {
        self.vertex(0).map(|v| v.y)
    }

    pub fn baseline(&self) -> Option<f64> {
        self.vertex(2).map(|v| v.y)
    }

    pub fn width(&self) -> Option<f64> {
        Some(self.vertex(1)?.x - self.vertex(0)?.x)
    }

    pub fn left_margin(&self) -> Option<f64> {
        self.vertex(3).map(|v| v.x)
    }

    pub fn right_margin(&self) -> Option<f64> {
        self.vertex(2).map(|v| v.x)
    }

    fn push(&mut self, v: Vertex) {
        self.0.push(v);
    }
}

#[derive(Debug, Clone, Default)]
pub struct StructuralDocument {
    pub pages: Vec<Page>,
}

impl StructuralDocument {
    /// Page by its 1-based number.
    pub fn page(&self, number: usize) -> Option<&Page> {
        self.pages.get(number.checked_sub(1)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub id: String,
    pub zones: Vec<Zone>,
}

#[derive(Debug, Clone, Default)]
pub struct Zone {
    pub id: String,
    pub corners: Corners,
    pub category: String,
    pub lines: Vec<Line>,
}

impl Zone {
    pub fn is_body_content(&self) -> bool {
        self.category == BODY_CONTENT
    }
}

#[derive(Debug, Clone, Default)]
pub struct Line {
    pub id: String,
    pub corners: Corners,
    pub words: Vec<Word>,
}

impl Line {
    pub fn text(&self) -> String {
        self.words.iter().map(Word::text).collect::<Vec<_>>().join(" ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Word {
    pub id: String,
    pub corners: Corners,
    pub characters: Vec<Character>,
}

impl Word {
    pub fn text(&self) -> String {
        self.characters.iter().map(|c| c.value.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Character {
    pub id: String,
    pub corners: Corners,
    pub value: String,
}

// ── Parsing ────────────────────────────────────────────────────────────────

/// An element still open while reading.
enum Open {
    Page(Page),
    Zone(Zone),
    Line(Line),
    Word(Word),
    Character(Character),
}

impl Open {
    fn from_name(name: &[u8]) -> Option<Self> {
        Some(match name {
            b"Page" => Self::Page(Page::default()),
            b"Zone" => Self::Zone(Zone::default()),
            b"Line" => Self::Line(Line::default()),
            b"Word" => Self::Word(Word::default()),
            b"Character" => Self::Character(Character::default()),
            _ => return None,
        })
    }

    fn set_id(&mut self, id: String) {
        match self {
            Self::Page(p) => p.id = id,
            Self::Zone(z) => z.id = id,
            Self::Line(l) => l.id = id,
            Self::Word(w) => w.id = id,
            Self::Character(c) => c.id = id,
        }
    }

    fn corners_mut(&mut self) -> Option<&mut Corners> {
        match self {
            Self::Page(_) => None,
            Self::Zone(z) => Some(&mut z.corners),
            Self::Line(l) => Some(&mut l.corners),
            Self::Word(w) => Some(&mut w.corners),
            Self::Character(c) => Some(&mut c.corners),
        }
    }
}

pub fn parse_file(path: &Path) -> Result<StructuralDocument> {
    let xml = std::fs::read_to_string(path)?;
    parse_str(&xml).map_err(|reason| DetectError::xml(path, reason))
}

/// Parse a TrueViz document. Unknown elements are skipped.
pub fn parse_str(xml: &str) -> std::result::Result<StructuralDocument, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut doc = StructuralDocument::default();
    let mut stack: Vec<Open> = Vec::new();
    let mut in_corners = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name();
                if let Some(open) = Open::from_name(name.as_ref()) {
                    stack.push(open);
                } else if name.as_ref().ends_with(b"Corners") {
                    in_corners = true;
                } else {
                    apply_leaf(e, &mut stack, in_corners);
                }
            }
            Ok(Event::Empty(ref e)) => {
                if let Some(open) = Open::from_name(e.name().as_ref()) {
                    close(open, &mut stack, &mut doc);
                } else {
                    apply_leaf(e, &mut stack, in_corners);
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                if name.as_ref().ends_with(b"Corners") {
                    in_corners = false;
                } else if Open::from_name(name.as_ref()).is_some()
                    && let Some(open) = stack.pop()
                {
                    close(open, &mut stack, &mut doc);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "error at position {}: {e}",
                    reader.buffer_position()
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err("unexpected end of document".to_string());
    }
    Ok(doc)
}

/// Attach a finished element to its parent.
fn close(open: Open, stack: &mut [Open], doc: &mut StructuralDocument) {
    match (stack.last_mut(), open) {
        (None, Open::Page(p)) => doc.pages.push(p),
        (Some(Open::Page(p)), Open::Zone(z)) => p.zones.push(z),
        (Some(Open::Zone(z)), Open::Line(l)) => z.lines.push(l),
        (Some(Open::Line(l)), Open::Word(w)) => l.words.push(w),
        (Some(Open::Word(w)), Open::Character(c)) => w.characters.push(c),
        // Misplaced elements are dropped.
        _ => {}
    }
}

fn apply_leaf(e: &BytesStart<'_>, stack: &mut [Open], in_corners: bool) {
    let Some(top) = stack.last_mut() else {
        return;
    };
    let name = e.name();
    let name = name.as_ref();
    match name {
        b"Vertex" if in_corners => {
            let x = attr(e, b"x").and_then(|v| v.parse().ok());
            let y = attr(e, b"y").and_then(|v| v.parse().ok());
            if let (Some(x), Some(y), Some(corners)) = (x, y, top.corners_mut()) {
                corners.push(Vertex { x, y });
            }
        }
        b"Category" => {
            if let (Open::Zone(z), Some(value)) = (top, attr(e, b"Value")) {
                z.category = value;
            }
        }
        b"GT_Text" => {
            if let (Open::Character(c), Some(value)) = (top, attr(e, b"Value")) {
                c.value = value;
            }
        }
        _ if name.ends_with(b"ID") => {
            if let Some(value) = attr(e, b"Value") {
                top.set_id(value);
            }
        }
        _ => {}
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}
