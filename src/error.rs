use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures that abort a whole parse. Individual heuristics never produce
/// these; they fold into an indeterminate test result instead.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("{0} is not a supported file extension")]
    UnsupportedExtension(String),

    #[error("could not read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("{tool} unavailable: {reason}")]
    CollaboratorUnavailable { tool: String, reason: String },

    #[error("{tool} did not finish within {timeout:?}")]
    CollaboratorTimeout { tool: String, timeout: Duration },

    #[error("expected structural extraction output is missing: {0}")]
    MissingSidecar(PathBuf),

    #[error("malformed XML in {path}: {reason}")]
    Xml { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DetectError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Unreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn xml(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Xml {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectError>;
