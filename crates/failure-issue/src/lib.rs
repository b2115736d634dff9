//! Test-failure issue generation for CI pipelines
//!
//! Turns a parsed JUnit report (or the handoff files written by
//! `failure-issue parse`) into a Markdown issue body, optionally led by a
//! Japanese translation of the failure details obtained from the Gemini API.
//!
//! # Usage
//!
//! ```rust,ignore
//! use failure_issue::{build_issue_body, IssueInputs, RunMetadata, TranslationConfig, Translator};
//!
//! let report = junit_report::parse_file("junit.xml")?;
//! let inputs = IssueInputs::from_report("失敗", &report, RunMetadata::default());
//! let translator = Translator::from_config(&TranslationConfig::from_env(), cancel)?;
//! println!("{}", build_issue_body(&inputs, &translator).await?);
//! ```

pub mod config;
pub mod errors;
pub mod render;
pub mod retry;
pub mod translate;

pub use config::{MissingKeyPolicy, TranslationConfig};
pub use errors::{IssueError, RetryCategory};
pub use render::{
    build_issue_body, IssueInputs, IssueReportDocument, RunMetadata, Section, SummaryCounts,
};
pub use retry::{run_with_retry, Attempt, RetryOutcome, RetryPolicy, Sleeper, TokioSleeper};
pub use translate::{GeminiClient, TextGenerator, Translator};
