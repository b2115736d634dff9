//! Issue body assembly.
//!
//! A document is a fixed sequence of sections assembled once from the run's
//! inputs and then rendered to Markdown text:
//!
//! ```text
//! [Translation] → FailedTests → Summary → Metadata → [ErrorDetails] → ArtifactFooter
//! ```

use std::fmt;

use junit_report::{
    format_failed_tests_list, format_failed_tests_with_errors, JunitReport, TestRunStatistics,
};
use serde::{Deserialize, Serialize};

use crate::errors::IssueError;
use crate::translate::Translator;

pub const DEFAULT_ARTIFACT_NAME: &str = "test-logs";

/// Counts as they should appear in the body; rendered verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub total: String,
    pub passed: String,
    pub failed: String,
    pub timed_out: String,
}

impl From<&TestRunStatistics> for SummaryCounts {
    fn from(stats: &TestRunStatistics) -> Self {
        Self {
            total: stats.total.to_string(),
            passed: stats.passed.to_string(),
            failed: stats.failed.to_string(),
            timed_out: stats.timed_out.to_string(),
        }
    }
}

/// Identifies the CI run that produced the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub workflow: String,
    pub job: String,
    pub run_id: String,
    pub run_attempt: String,
    pub git_ref: String,
    pub commit: String,
    pub server_url: String,
    pub repository: String,
    pub artifact_name: String,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            workflow: String::new(),
            job: String::new(),
            run_id: String::new(),
            run_attempt: String::new(),
            git_ref: String::new(),
            commit: String::new(),
            server_url: String::new(),
            repository: String::new(),
            artifact_name: DEFAULT_ARTIFACT_NAME.to_string(),
        }
    }
}

impl RunMetadata {
    pub fn run_url(&self) -> String {
        format!(
            "{}/{}/actions/runs/{}",
            self.server_url, self.repository, self.run_id
        )
    }
}

/// Everything the body is built from, apart from the translation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueInputs {
    pub status: String,
    pub counts: SummaryCounts,
    pub failed_tests_list: String,
    pub error_details: String,
    pub metadata: RunMetadata,
}

impl IssueInputs {
    /// Inputs for a parsed report, formatted the same way as the handoff
    /// files.
    pub fn from_report(status: impl Into<String>, report: &JunitReport, metadata: RunMetadata) -> Self {
        Self {
            status: status.into(),
            counts: SummaryCounts::from(&report.statistics),
            failed_tests_list: format_failed_tests_list(&report.failures),
            error_details: format_failed_tests_with_errors(&report.failures),
            metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    Translation(String),
    FailedTests(String),
    Summary { status: String, counts: SummaryCounts },
    Metadata(RunMetadata),
    ErrorDetails(String),
    ArtifactFooter { artifact_name: String },
}

impl Section {
    fn push_lines(&self, out: &mut Vec<String>) {
        match self {
            Self::Translation(text) => {
                out.push(text.clone());
                out.push(String::new());
                out.push("---".into());
                out.push(String::new());
            }
            Self::FailedTests(list) => {
                out.push("## 失敗したテスト".into());
                out.push(String::new());
                out.push(list.clone());
                out.push(String::new());
                out.push("---".into());
                out.push(String::new());
            }
            Self::Summary { status, counts } => {
                out.push(format!("**ステータス**: {status}"));
                out.push(String::new());
                out.push("### テストサマリー".into());
                out.push(format!("- **総テスト数**: {}", counts.total));
                out.push(format!("- **成功**: {}", counts.passed));
                out.push(format!("- **失敗**: {}", counts.failed));
                out.push(format!("- **タイムアウト**: {}", counts.timed_out));
                out.push(String::new());
            }
            Self::Metadata(meta) => {
                out.push("### 詳細".into());
                out.push(format!("- Workflow: {}", meta.workflow));
                out.push(format!("- Job: {}", meta.job));
                out.push(format!("- Run: {}", meta.run_url()));
                out.push(format!("- Commit: {}", meta.commit));
                out.push(format!("- Ref: {}", meta.git_ref));
                out.push(String::new());
            }
            Self::ErrorDetails(details) => {
                out.push("<details>".into());
                out.push("<summary>詳細なエラーメッセージ（クリックして展開）</summary>".into());
                out.push(String::new());
                out.push(details.clone());
                out.push(String::new());
                out.push("</details>".into());
                out.push(String::new());
            }
            Self::ArtifactFooter { artifact_name } => {
                out.push(format!(
                    "**アーティファクト**: 完全なログは上記のRunリンクから `{artifact_name}` をダウンロード"
                ));
            }
        }
    }
}

/// Assembled issue body. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueReportDocument {
    sections: Vec<Section>,
}

impl IssueReportDocument {
    pub fn assemble(inputs: &IssueInputs, translation: Option<&str>) -> Self {
        let mut sections = Vec::with_capacity(6);
        if let Some(text) = translation.filter(|t| !t.trim().is_empty()) {
            sections.push(Section::Translation(text.to_string()));
        }
        sections.push(Section::FailedTests(inputs.failed_tests_list.clone()));
        sections.push(Section::Summary {
            status: inputs.status.clone(),
            counts: inputs.counts.clone(),
        });
        sections.push(Section::Metadata(inputs.metadata.clone()));
        if !inputs.error_details.trim().is_empty() {
            sections.push(Section::ErrorDetails(inputs.error_details.clone()));
        }
        sections.push(Section::ArtifactFooter {
            artifact_name: inputs.metadata.artifact_name.clone(),
        });
        Self { sections }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn has_translation(&self) -> bool {
        matches!(self.sections.first(), Some(Section::Translation(_)))
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for section in &self.sections {
            section.push_lines(&mut lines);
        }
        lines.join("\n")
    }
}

impl fmt::Display for IssueReportDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Translate (when there is anything to translate) and render the body.
///
/// Only a configuration error from the translator is fatal; any other
/// translation problem renders the body without a translation.
pub async fn build_issue_body(
    inputs: &IssueInputs,
    translator: &Translator,
) -> Result<IssueReportDocument, IssueError> {
    let translation = if inputs.error_details.is_empty() {
        None
    } else {
        translator.translate(&inputs.error_details).await?
    };
    Ok(IssueReportDocument::assemble(inputs, translation.as_deref()))
}
