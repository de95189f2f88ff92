use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::StructuralConfig;
use crate::error::{DetectError, Result};

pub const TOOL: &str = "CERMINE";
const MAIN_CLASS: &str = "pl.edu.icm.cermine.ContentExtractor";
const OUTPUTS: &str = "jats,text,zones,trueviz,images";
const STDERR_TAIL_LINES: usize = 10;

/// Files CERMINE writes next to the source PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarPaths {
    /// Bibliographic metadata (JATS).
    pub xml: PathBuf,
    pub text: PathBuf,
    pub images: PathBuf,
    /// Page geometry (TrueViz).
    pub structure: PathBuf,
}

impl SidecarPaths {
    pub fn for_source(source: &Path) -> Self {
        Self {
            xml: source.with_extension("cermxml"),
            text: source.with_extension("cermtxt"),
            images: source.with_extension("images"),
            structure: source.with_extension("cermstr"),
        }
    }
}

/// Produces structural sidecars for a PDF.
pub trait StructuralExtractor {
    fn run(&self, pdf: &Path) -> Result<SidecarPaths>;
}

pub struct CermineExtractor {
    java: PathBuf,
    jar: PathBuf,
    timeout: Duration,
    reuse_sidecars: bool,
}

impl CermineExtractor {
    pub fn new(config: &StructuralConfig) -> Self {
        Self {
            java: config.java.clone(),
            jar: config.jar.clone(),
            timeout: config.timeout(),
            reuse_sidecars: config.reuse_sidecars,
        }
    }

    fn command(&self, dir: &Path) -> Command {
        let mut cmd = Command::new(&self.java);
        cmd.arg("-cp")
            .arg(&self.jar)
            .arg(MAIN_CLASS)
            .arg("-path")
            .arg(dir)
            .arg("-outputs")
            .arg(OUTPUTS);
        cmd
    }
}

impl StructuralExtractor for CermineExtractor {
    fn run(&self, pdf: &Path) -> Result<SidecarPaths> {
        let sidecars = SidecarPaths::for_source(pdf);
        if self.reuse_sidecars && sidecars.xml.exists() {
            debug!(path = %sidecars.xml.display(), "reusing existing sidecars");
            return Ok(sidecars);
        }
        let dir = pdf
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        info!(dir = %dir.display(), "running {TOOL}");
        run_supervised(self.command(dir), TOOL, self.timeout)?;
        Ok(sidecars)
    }
}

/// Run `cmd` to completion, killing it once `timeout` has elapsed.
pub fn run_supervised(mut cmd: Command, tool: &str, timeout: Duration) -> Result<()> {
    let mut child = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            error!(tool, %err, "failed to start");
            DetectError::CollaboratorUnavailable {
                tool: tool.to_string(),
                reason: if err.kind() == std::io::ErrorKind::NotFound {
                    "executable not found".to_string()
                } else {
                    format!("failed to start: {err}")
                },
            }
        })?;

    // Drained on its own thread so a chatty child never blocks on a full pipe.
    let stderr = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    let status = wait_with_timeout(&mut child, tool, timeout)?;
    if !status.success() {
        let tail = stderr
            .and_then(|reader| reader.join().ok())
            .map(|text| stderr_tail(&text))
            .unwrap_or_default();
        error!(tool, %status, stderr = %tail, "exited unsuccessfully");
        let reason = if tail.is_empty() {
            format!("exited with {status}")
        } else {
            format!("exited with {status}: {tail}")
        };
        return Err(DetectError::CollaboratorUnavailable {
            tool: tool.to_string(),
            reason,
        });
    }
    Ok(())
}

/// Last non-blank lines of a diagnostic stream, joined on one line.
fn stderr_tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

fn wait_with_timeout(child: &mut Child, tool: &str, timeout: Duration) -> Result<ExitStatus> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    error!(tool, ?timeout, "timed out");
                    return Err(DetectError::CollaboratorTimeout {
                        tool: tool.to_string(),
                        timeout,
                    });
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                error!(tool, %err, "lost track of child process");
                return Err(DetectError::CollaboratorUnavailable {
                    tool: tool.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }
}

// ── Bibliographic XML ──────────────────────────────────────────────────────

/// Fields CERMINE recovered from the article front matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BibliographicRecord {
    pub doi: Option<String>,
    pub title: Option<String>,
    pub journal_title: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Doi,
    Title,
    JournalTitle,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Self::Doi => "DOI",
            Self::Title => "title",
            Self::JournalTitle => "journal title",
        }
    }
}

impl BibliographicRecord {
    pub fn parse_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DetectError::MissingSidecar(path.to_path_buf()));
        }
        let xml = std::fs::read_to_string(path)?;
        Self::parse_str(&xml).map_err(|reason| DetectError::xml(path, reason))
    }

    /// Read a JATS document. A field seen twice keeps the later value.
    pub fn parse_str(xml: &str) -> std::result::Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();
        let mut record = Self::default();
        let mut open: Vec<Vec<u8>> = Vec::new();
        // Field being read, the depth it opened at, and its text so far.
        let mut capture: Option<(Field, usize, String)> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    if capture.is_none()
                        && let Some(field) = field_for(e, &open)
                    {
                        capture = Some((field, open.len(), String::new()));
                    }
                    open.push(e.name().as_ref().to_vec());
                }
                Ok(Event::Text(ref e)) => {
                    if let Some((_, _, text)) = capture.as_mut() {
                        match e.unescape() {
                            Ok(t) => text.push_str(&t),
                            Err(_) => {
                                let raw: &[u8] = e;
                                text.push_str(&String::from_utf8_lossy(raw));
                            }
                        }
                    }
                }
                Ok(Event::CData(ref e)) => {
                    if let Some((_, _, text)) = capture.as_mut() {
                        let raw: &[u8] = e;
                        text.push_str(&String::from_utf8_lossy(raw));
                    }
                }
                Ok(Event::End(_)) => {
                    open.pop();
                    if capture.as_ref().is_some_and(|(_, depth, _)| *depth == open.len())
                        && let Some((field, _, text)) = capture.take()
                    {
                        record.set(field, &text);
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
        Ok(record)
    }

    fn set(&mut self, field: Field, text: &str) {
        let value = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if value.is_empty() {
            return;
        }
        let slot = match field {
            Field::Doi => &mut self.doi,
            Field::Title => &mut self.title,
            Field::JournalTitle => &mut self.journal_title,
        };
        if let Some(previous) = slot.as_deref() {
            warn!(
                "previously detected {} {previous:?} will be overwritten by {value:?}",
                field.name()
            );
        }
        *slot = Some(value);
    }
}

fn field_for(e: &BytesStart<'_>, open: &[Vec<u8>]) -> Option<Field> {
    match e.name().as_ref() {
        b"article-id" => {
            let is_doi = e
                .attributes()
                .flatten()
                .any(|a| a.key.as_ref() == b"pub-id-type" && a.value.as_ref() == b"doi");
            is_doi.then_some(Field::Doi)
        }
        b"article-title" if open.iter().any(|n| n == b"front") => Some(Field::Title),
        b"journal-title" => Some(Field::JournalTitle),
        _ => None,
    }
}

// ── Images ─────────────────────────────────────────────────────────────────

/// Whether any image extracted from page 1 is present. A missing directory
/// means no images were extracted.
pub fn has_first_page_image(images_dir: &Path) -> Result<bool> {
    if !images_dir.is_dir() {
        debug!(path = %images_dir.display(), "no images directory");
        return Ok(false);
    }
    for entry in std::fs::read_dir(images_dir)? {
        if entry?.file_name().to_string_lossy().contains("img_1_") {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const JATS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE article PUBLIC "-//NLM//DTD JATS (Z39.96) Journal Archiving and Interchange DTD v1.0 20120330//EN" "JATS-archivearticle1.dtd">
<article>
  <front>
    <journal-meta>
      <journal-title-group><journal-title>Journal of Examples</journal-title></journal-title-group>
    </journal-meta>
    <article-meta>
      <article-id pub-id-type="doi">10.1234/example.5678</article-id>
      <title-group><article-title>Deep <italic>learning</italic> &amp; layout</article-title></title-group>
    </article-meta>
  </front>
  <back>
    <ref-list><ref><mixed-citation><article-title>A cited paper</article-title></mixed-citation></ref></ref-list>
  </back>
</article>"#;

    #[test]
    fn reads_front_matter_fields() {
        let record = BibliographicRecord::parse_str(JATS).unwrap();
        assert_eq!(record.doi.as_deref(), Some("10.1234/example.5678"));
        assert_eq!(record.title.as_deref(), Some("Deep learning & layout"));
        assert_eq!(record.journal_title.as_deref(), Some("Journal of Examples"));
    }

    #[test]
    fn later_value_overwrites_earlier() {
        let xml = r#"<article><front><article-meta>
            <article-id pub-id-type="doi">10.1/first</article-id>
            <article-id pub-id-type="pmid">123</article-id>
            <article-id pub-id-type="doi">10.1/second</article-id>
            </article-meta></front></article>"#;
        let record = BibliographicRecord::parse_str(xml).unwrap();
        assert_eq!(record.doi.as_deref(), Some("10.1/second"));
        assert_eq!(record.title, None);
    }

    #[test]
    fn missing_sidecar_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = BibliographicRecord::parse_file(&dir.path().join("paper.cermxml")).unwrap_err();
        assert!(matches!(err, DetectError::MissingSidecar(_)));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("paper.cermxml");
        std::fs::write(&path, "<article><front></article>").unwrap();
        let err = BibliographicRecord::parse_file(&path).unwrap_err();
        assert!(matches!(err, DetectError::Xml { .. }));
    }

    #[test]
    fn sidecars_replace_the_extension() {
        let paths = SidecarPaths::for_source(Path::new("/deposits/paper.pdf"));
        assert_eq!(paths.xml, PathBuf::from("/deposits/paper.cermxml"));
        assert_eq!(paths.text, PathBuf::from("/deposits/paper.cermtxt"));
        assert_eq!(paths.images, PathBuf::from("/deposits/paper.images"));
        assert_eq!(paths.structure, PathBuf::from("/deposits/paper.cermstr"));
    }

    #[test]
    fn first_page_images_by_name() {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("paper.images");
        assert!(!has_first_page_image(&images).unwrap());
        std::fs::create_dir(&images).unwrap();
        std::fs::write(images.join("img_2_1.png"), b"").unwrap();
        assert!(!has_first_page_image(&images).unwrap());
        std::fs::write(images.join("img_1_3.png"), b"").unwrap();
        assert!(has_first_page_image(&images).unwrap());
    }

    #[test]
    fn existing_sidecars_are_reused_without_running() {
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("paper.pdf");
        std::fs::write(dir.path().join("paper.cermxml"), "<article/>").unwrap();
        let config = StructuralConfig {
            java: PathBuf::from("/nonexistent/java"),
            ..StructuralConfig::default()
        };
        let sidecars = CermineExtractor::new(&config).run(&pdf).unwrap();
        assert_eq!(sidecars.xml, dir.path().join("paper.cermxml"));
    }

    #[test]
    fn missing_executable_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let config = StructuralConfig {
            java: PathBuf::from("/nonexistent/java"),
            reuse_sidecars: false,
            ..StructuralConfig::default()
        };
        let err = CermineExtractor::new(&config)
            .run(&dir.path().join("paper.pdf"))
            .unwrap_err();
        assert!(matches!(err, DetectError::CollaboratorUnavailable { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn slow_child_is_killed_at_timeout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 5");
        let started = Instant::now();
        let err = run_supervised(cmd, "sleeper", Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, DetectError::CollaboratorTimeout { .. }));
        assert_eq!(err.to_string(), "sleeper did not finish within 200ms");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn failing_child_is_unavailable() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exit 3");
        let err = run_supervised(cmd, "failer", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, DetectError::CollaboratorUnavailable { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn failure_reason_carries_the_stderr_tail() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo starting >&2; echo 'Exception: bad xref table' >&2; exit 3");
        let err = run_supervised(cmd, "failer", Duration::from_secs(5)).unwrap_err();
        let reason = match err {
            DetectError::CollaboratorUnavailable { reason, .. } => reason,
            other => panic!("unexpected error: {other}"),
        };
        assert!(reason.starts_with("exited with"), "{reason}");
        assert!(reason.ends_with("starting | Exception: bad xref table"), "{reason}");
    }

    #[test]
    fn stderr_tail_keeps_the_last_lines() {
        let text: String = (1..=15).map(|i| format!("line {i}\n\n")).collect();
        let tail = stderr_tail(&text);
        assert!(tail.starts_with("line 6 | "));
        assert!(tail.ends_with("line 15"));
        assert_eq!(stderr_tail("  \n"), "");
    }
}
