//! Markdown formatting of failed tests for issue bodies.

use crate::model::FailedTestRecord;

/// Appended to the name of a test whose failure looks like a timeout.
pub const TIMEOUT_SUFFIX: &str = " (タイムアウト)";

fn suffix(record: &FailedTestRecord) -> &'static str {
    if record.is_timeout {
        TIMEOUT_SUFFIX
    } else {
        ""
    }
}

/// Bullet list of failed test names, one per line.
pub fn format_failed_tests_list(records: &[FailedTestRecord]) -> String {
    records
        .iter()
        .map(|r| format!("- {}{}", r.name, suffix(r)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Per-test sections with the failure message and a fenced details block.
pub fn format_failed_tests_with_errors(records: &[FailedTestRecord]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for record in records {
        lines.push(format!("### {}{}", record.name, suffix(record)));
        lines.push(String::new());
        if !record.message.is_empty() {
            lines.push(format!("**Error**: {}", record.message));
            lines.push(String::new());
        }
        if !record.details.is_empty() {
            lines.push("```".to_string());
            lines.push(record.details.clone());
            lines.push("```".to_string());
            lines.push(String::new());
        }
    }
    lines.join("\n")
}
