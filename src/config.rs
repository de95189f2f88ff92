use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{DetectError, Result};
use crate::layout::LayoutSettings;

/// Detector configuration, loaded from `~/.config/vordetect/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub matching: MatchingConfig,
    pub structural: StructuralConfig,
    pub layout: LayoutSettings,
    pub pdf: PdfConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Characters in one page of uninterrupted text.
    pub page_size_chars: usize,
    pub min_pages: usize,
    pub min_similarity: f64,
    pub title_error_ratio: f64,
    /// Where the title is expected in the extracted text.
    pub expected_span_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StructuralConfig {
    pub java: PathBuf,
    pub jar: PathBuf,
    pub timeout_secs: u64,
    pub reuse_sidecars: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    pub pdfium_path: Option<String>,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            page_size_chars: 2600,
            min_pages: 3,
            min_similarity: 0.9,
            title_error_ratio: 0.1,
            expected_span_chars: 2600,
        }
    }
}

impl Default for StructuralConfig {
    fn default() -> Self {
        Self {
            java: PathBuf::from("java"),
            jar: PathBuf::from("cermine-impl-1.13-jar-with-dependencies.jar"),
            timeout_secs: 300,
            reuse_sidecars: true,
        }
    }
}

impl MatchingConfig {
    pub fn min_text_chars(&self) -> usize {
        self.min_pages * self.page_size_chars
    }

    pub fn expected_span(&self) -> Range<usize> {
        0..self.expected_span_chars
    }
}

impl StructuralConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ─── Load ──────────────────────────────────────────────────

impl Config {
    /// Standard config file path, overridable with `VORDETECT_CONFIG`.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("VORDETECT_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("vordetect")
            .join("config.toml")
    }

    /// Load from `explicit` when given (it must exist), else from the
    /// standard path, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) if !path.exists() => Err(DetectError::Config(format!(
                "config file {} does not exist",
                path.display()
            ))),
            Some(path) => Self::load_from(path),
            None => Self::load_from(&Self::config_path()),
        }
    }

    /// Load from a specific path, falling back to defaults if it is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|e| DetectError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_three_pages_of_text() {
        let cfg = Config::default();
        assert_eq!(cfg.matching.min_text_chars(), 7800);
        assert_eq!(cfg.matching.expected_span(), 0..2600);
        assert_eq!(cfg.structural.timeout(), Duration::from_secs(300));
        assert_eq!(cfg.layout.sample_radius, 2);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg = Config::from_toml(
            "[structural]\njar = \"/opt/cermine.jar\"\ntimeout_secs = 30\n\n[layout]\nsample_radius = 1\n",
        )
        .unwrap();
        assert_eq!(cfg.structural.jar, PathBuf::from("/opt/cermine.jar"));
        assert_eq!(cfg.structural.timeout_secs, 30);
        assert_eq!(cfg.structural.java, PathBuf::from("java"));
        assert_eq!(cfg.layout.sample_radius, 1);
        assert_eq!(cfg.layout.wide_zone_min_width, 312.0);
        assert_eq!(cfg.matching.min_similarity, 0.9);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.matching.min_pages, 3);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, DetectError::Config(_)));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[matching\nmin_pages = ").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, DetectError::Config(_)));
    }
}
