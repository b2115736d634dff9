//! Report data model: summary statistics and failed-test records.

use serde::{Deserialize, Serialize};

/// Separator between a testcase's classname and its name.
pub const NAME_SEPARATOR: &str = "::";

/// Summary counts derived once per parse.
///
/// `failed` is failures + errors. `timed_out` counts the failed records whose
/// message looks like a timeout; it is a heuristic subset of `failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunStatistics {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub timed_out: u64,
}

impl TestRunStatistics {
    /// Whether `passed + failed + skipped == total` and `timed_out <= failed`.
    pub fn is_consistent(&self) -> bool {
        self.passed + self.failed + self.skipped == self.total && self.timed_out <= self.failed
    }
}

/// Which child element marked the testcase as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// `<failure>`: an assertion or test-reported failure
    Failure,
    /// `<error>`: the test errored (panic, crash, setup problem)
    Error,
}

/// One failing testcase, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTestRecord {
    /// Fully-qualified name (`classname::name` when a classname is present)
    pub name: String,
    /// Short failure message (the `message` attribute)
    pub message: String,
    /// Long-form failure text, trimmed; may be empty
    pub details: String,
    /// Message contains "timeout" or "timed out" (case-insensitive)
    pub is_timeout: bool,
    pub kind: FailureKind,
}

impl FailedTestRecord {
    pub fn new(
        name: impl Into<String>,
        message: impl Into<String>,
        details: impl AsRef<str>,
        kind: FailureKind,
    ) -> Self {
        let message = message.into();
        Self {
            name: name.into(),
            is_timeout: is_timeout_message(&message),
            details: details.as_ref().trim().to_string(),
            message,
            kind,
        }
    }
}

/// Parse result: statistics plus failed records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JunitReport {
    pub statistics: TestRunStatistics,
    pub failures: Vec<FailedTestRecord>,
}

/// Timeout heuristic applied to failure messages.
///
/// Substring match, so an assertion message that merely mentions a timeout
/// is counted too.
pub fn is_timeout_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("timeout") || lower.contains("timed out")
}

/// Join an optional classname and a test name.
pub fn qualified_name(classname: Option<&str>, name: &str) -> String {
    match classname {
        Some(class) if !class.is_empty() => format!("{class}{NAME_SEPARATOR}{name}"),
        _ => name.to_string(),
    }
}
