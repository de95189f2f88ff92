use once_cell::sync::Lazy;
use regex::Regex;

// ── Identifiers ────────────────────────────────────────────────────────────

/// Crossref's recommended DOI expression, case-insensitive.
pub static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)10\.\d{4,9}/[-._;()/:a-z0-9]+").unwrap());

// ── Creative Commons licences ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenceField {
    Url,
    LongName,
    ShortName,
}

#[derive(Debug, Clone, Copy)]
pub struct Licence {
    pub short_name: &'static str,
    pub long_name: &'static str,
    pub url: &'static str,
}

impl Licence {
    /// Variants in search order with their allowed error ratio.
    /// Exact strings get no tolerance; prose gets a little.
    pub fn variants(&self) -> [(LicenceField, &'static str, f64); 3] {
        [
            (LicenceField::Url, self.url, 0.0),
            (LicenceField::LongName, self.long_name, 0.1),
            (LicenceField::ShortName, self.short_name, 0.0),
        ]
    }
}

pub const CC_LICENCES: [Licence; 7] = [
    Licence {
        short_name: "CC0",
        long_name: "Public domain",
        url: "https://creativecommons.org/publicdomain/zero/1.0/",
    },
    Licence {
        short_name: "CC BY",
        long_name: "Creative Commons Attribution",
        url: "https://creativecommons.org/licenses/by/4.0/",
    },
    Licence {
        short_name: "CC BY-NC",
        long_name: "Creative Commons Attribution-NonCommercial",
        url: "https://creativecommons.org/licenses/by-nc/4.0/",
    },
    Licence {
        short_name: "CC BY-ND",
        long_name: "Creative Commons Attribution-NoDerivatives",
        url: "https://creativecommons.org/licenses/by-nd/4.0/",
    },
    Licence {
        short_name: "CC BY-SA",
        long_name: "Creative Commons Attribution-ShareAlike",
        url: "https://creativecommons.org/licenses/by-sa/4.0/",
    },
    Licence {
        short_name: "CC BY-NC-ND",
        long_name: "Creative Commons Attribution-NonCommercial-NoDerivatives",
        url: "https://creativecommons.org/licenses/by-nc-nd/4.0/",
    },
    Licence {
        short_name: "CC BY-NC-SA",
        long_name: "Creative Commons Attribution-NonCommercial-ShareAlike",
        url: "https://creativecommons.org/licenses/by-nc-sa/4.0/",
    },
];

// ── Version-indicative phrases ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct PhrasePattern {
    pub text: &'static str,
    pub error_ratio: f64,
}

pub const PROOF_PATTERNS: [PhrasePattern; 2] = [
    PhrasePattern {
        text: "UNCORRECTED PROOF",
        error_ratio: 0.1,
    },
    PhrasePattern {
        text: "Available online xxx",
        error_ratio: 0.0,
    },
];

pub const RIGHTS_RESERVED_PATTERNS: [PhrasePattern; 1] = [PhrasePattern {
    text: "All rights reserved.",
    error_ratio: 0.1,
}];

// ── Publisher PDF metadata ─────────────────────────────────────────────────

/// Document-information keys written by publishers' production pipelines.
/// Spelled as they appear in the raw file, name escapes included.
pub const PUBLISHER_PDF_METADATA_TAGS: [&str; 7] = [
    "/CrossMarkDomains#5B1#5D",
    "/CrossMarkDomains#5B2#5D",
    "/CrossmarkDomainExclusive",
    "/CrossmarkMajorVersionDate",
    "/doi",
    "/ElsevierWebPDFSpecifications",
    "/Keywords",
];

/// Find the first publisher tag among `keys`, comparing decoded names.
pub fn find_publisher_tag<'a, I>(keys: I) -> Option<&'static str>
where
    I: IntoIterator<Item = &'a str>,
{
    let decoded: Vec<String> = keys.into_iter().map(decode_name_escapes).collect();
    PUBLISHER_PDF_METADATA_TAGS
        .into_iter()
        .find(|tag| decoded.contains(&decode_name_escapes(tag)))
}

/// Decode `#xx` hex escapes in a PDF name (`CrossMarkDomains#5B1#5D` →
/// `CrossMarkDomains[1]`). Malformed escapes are kept as written.
pub fn decode_name_escapes(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'#'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
            && let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3])
            && let Ok(value) = u8::from_str_radix(hex, 16)
        {
            out.push(value);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
