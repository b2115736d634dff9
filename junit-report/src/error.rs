//! Error types for report parsing and handoff output.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while reading a JUnit report or writing handoff output.
///
/// All variants are fatal for the calling tool; each names the file involved.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("JUnit XML file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Permission denied reading {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read JUnit XML file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid XML format in {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Failed to write handoff output {}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReportError {
    /// Map an I/O error from opening a report into the matching variant.
    pub fn from_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Read { path, source },
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
