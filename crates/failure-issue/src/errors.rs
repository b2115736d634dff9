//! Error taxonomy with retry classification.
//!
//! Callers query `retry_category()` / `is_retriable()` instead of matching on
//! message text.
//!
//! ## Retry categories
//!
//! | Category   | Retriable | Examples                                    |
//! |------------|-----------|---------------------------------------------|
//! | Transient  | yes       | network failure, timeout, HTTP 5xx          |
//! | Permanent  | no        | HTTP 4xx (bad request, auth, not found)     |
//! | Terminal   | no        | configuration, unreadable input files       |

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Classification used by the retry driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Retrying may succeed (network blip, server overload).
    Transient,
    /// Retrying cannot succeed (bad request, bad credential).
    Permanent,
    /// Not a remote call failure at all; surfaces immediately.
    Terminal,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

/// Unified error type for issue generation.
#[derive(Debug, Error)]
pub enum IssueError {
    // ── Retriable ─────────────────────────────────────────────────────────
    /// Request never produced a response (connect, timeout, body read).
    #[error("Gemini API request failed: {0}")]
    Transport(String),

    /// Server-side failure (5xx and other non-success statuses outside 4xx).
    #[error("Gemini API error: HTTP {status}")]
    ServiceStatus { status: u16 },

    // ── Non-retriable ─────────────────────────────────────────────────────
    /// The service rejected the request itself (4xx).
    #[error("Gemini API client error (HTTP {status})")]
    ClientRejected { status: u16 },

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A pre-rendered input file could not be read.
    #[error("Failed to read {description} file {}", path.display())]
    InputFile {
        description: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IssueError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Transport(_) | Self::ServiceStatus { .. } => RetryCategory::Transient,
            Self::ClientRejected { .. } => RetryCategory::Permanent,
            Self::Configuration(_) | Self::InputFile { .. } => RetryCategory::Terminal,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        if (400..500).contains(&status) {
            Self::ClientRejected { status }
        } else {
            Self::ServiceStatus { status }
        }
    }

    pub fn input_file(
        description: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::InputFile {
            description,
            path: path.into(),
            source,
        }
    }
}
