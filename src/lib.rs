pub mod battery;
pub mod candidates;
pub mod cermine;
pub mod config;
pub mod detector;
pub mod docx;
pub mod error;
pub mod layout;
pub mod matcher;
pub mod patterns;
pub mod pdf;
pub mod pdf_parser;
pub mod similarity;
pub mod types;
pub mod zones;

pub use candidates::VersionCandidateSet;
pub use config::Config;
pub use detector::{ManuscriptParser, VersionDetector};
pub use error::{DetectError, Result};
pub use types::{DeclaredMetadata, Outcome, TestResult, VersionStage};
