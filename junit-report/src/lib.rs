//! JUnit report toolkit for CI failure reporting
//!
//! This library provides:
//! - A streaming parser for JUnit-style XML reports (nextest, pytest, surefire, ...)
//! - Summary statistics and per-failure records with timeout detection
//! - Markdown formatting of failed tests for issue bodies
//! - Handoff output for a calling pipeline (`key=value` lines plus temp files)
//!
//! # Usage
//!
//! ```rust,ignore
//! use junit_report::{parse_file, format_failed_tests_list};
//!
//! let report = parse_file("target/nextest/ci/junit.xml")?;
//! println!("{} of {} failed", report.statistics.failed, report.statistics.total);
//! println!("{}", format_failed_tests_list(&report.failures));
//! ```

pub mod error;
pub mod format;
pub mod handoff;
pub mod model;
pub mod parser;

pub use error::ReportError;
pub use format::{format_failed_tests_list, format_failed_tests_with_errors, TIMEOUT_SUFFIX};
pub use handoff::{render_stdout_report, write_github_output, write_github_output_in, HandoffFiles};
pub use model::{
    is_timeout_message, qualified_name, FailedTestRecord, FailureKind, JunitReport,
    TestRunStatistics, NAME_SEPARATOR,
};
pub use parser::{parse_file, parse_str};
