//! Handoff of parse results to a calling CI pipeline.
//!
//! Step outputs are `key=value` lines appended to a file the pipeline
//! provides (`$GITHUB_OUTPUT`). The failure list and detailed errors can be
//! large, so they go to temp files and only their paths are written as
//! outputs. The consuming step owns cleanup of those files once handed off;
//! this module deletes them if the handoff fails part-way.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::ReportError;
use crate::format::{format_failed_tests_list, format_failed_tests_with_errors};
use crate::model::{JunitReport, TestRunStatistics};

pub const FAILED_TESTS_MARKER: &str = "---FAILED_TESTS---";
pub const ERROR_DETAILS_MARKER: &str = "---ERROR_DETAILS---";

/// Temp files written for the consuming step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffFiles {
    pub failed_tests_list: PathBuf,
    pub error_details: PathBuf,
}

fn statistics_lines(stats: &TestRunStatistics) -> String {
    format!(
        "total_tests={}\npassed={}\nfailed={}\ntimed_out={}\n",
        stats.total, stats.passed, stats.failed, stats.timed_out
    )
}

/// Write the handoff: two temp files plus `key=value` lines in `output_file`.
///
/// Returns the kept temp file paths. On error no temp file is left behind.
pub fn write_github_output(
    output_file: impl AsRef<Path>,
    report: &JunitReport,
) -> Result<HandoffFiles, ReportError> {
    write_github_output_in(output_file, report, std::env::temp_dir())
}

/// Like [`write_github_output`], staging the temp files in `temp_dir`.
pub fn write_github_output_in(
    output_file: impl AsRef<Path>,
    report: &JunitReport,
    temp_dir: impl AsRef<Path>,
) -> Result<HandoffFiles, ReportError> {
    let output_file = output_file.as_ref();
    let temp_dir = temp_dir.as_ref();

    let list = stage(
        temp_dir,
        "failed_tests_list_",
        &format_failed_tests_list(&report.failures),
    )?;
    let details = match stage(
        temp_dir,
        "error_details_",
        &format_failed_tests_with_errors(&report.failures),
    ) {
        Ok(file) => file,
        Err(e) => {
            discard(list);
            return Err(e);
        }
    };

    // Persist both files before any output line points at them.
    let failed_tests_list = match keep(list) {
        Ok(path) => path,
        Err(e) => {
            discard(details);
            return Err(e);
        }
    };
    let error_details = match keep(details) {
        Ok(path) => path,
        Err(e) => {
            remove_best_effort(&failed_tests_list);
            return Err(e);
        }
    };

    let mut lines = statistics_lines(&report.statistics);
    let _ = writeln!(lines, "failed_tests_list_file={}", failed_tests_list.display());
    let _ = writeln!(lines, "error_details_file={}", error_details.display());

    if let Err(source) = append(output_file, &lines) {
        remove_best_effort(&failed_tests_list);
        remove_best_effort(&error_details);
        return Err(ReportError::Output {
            path: output_file.to_path_buf(),
            source,
        });
    }

    debug!(
        output = %output_file.display(),
        list = %failed_tests_list.display(),
        details = %error_details.display(),
        "Wrote step outputs"
    );
    Ok(HandoffFiles {
        failed_tests_list,
        error_details,
    })
}

/// Plain-text rendering for runs without an output file.
pub fn render_stdout_report(report: &JunitReport) -> String {
    let mut out = statistics_lines(&report.statistics);
    let _ = writeln!(out, "{FAILED_TESTS_MARKER}");
    let _ = writeln!(out, "{}", format_failed_tests_list(&report.failures));
    let _ = writeln!(out, "{ERROR_DETAILS_MARKER}");
    let _ = writeln!(out, "{}", format_failed_tests_with_errors(&report.failures));
    out
}

fn stage(dir: &Path, prefix: &str, content: &str) -> Result<NamedTempFile, ReportError> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".txt")
        .tempfile_in(dir)
        .map_err(|source| ReportError::Output {
            path: dir.to_path_buf(),
            source,
        })?;

    if let Err(source) = file.write_all(content.as_bytes()).and_then(|_| file.flush()) {
        let path = file.path().to_path_buf();
        discard(file);
        return Err(ReportError::Output { path, source });
    }
    Ok(file)
}

fn append(path: &Path, lines: &str) -> std::io::Result<()> {
    let mut out = OpenOptions::new().create(true).append(true).open(path)?;
    out.write_all(lines.as_bytes())?;
    out.flush()
}

fn keep(file: NamedTempFile) -> Result<PathBuf, ReportError> {
    match file.keep() {
        Ok((_, path)) => Ok(path),
        Err(e) => {
            let path = e.file.path().to_path_buf();
            discard(e.file);
            Err(ReportError::Output {
                path,
                source: e.error,
            })
        }
    }
}

fn discard(file: NamedTempFile) {
    let path = file.path().to_path_buf();
    if let Err(e) = file.close() {
        warn!(path = %path.display(), error = %e, "Failed to delete temp file");
    }
}

fn remove_best_effort(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Failed to delete temp file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FailedTestRecord, FailureKind};

    fn sample_report() -> JunitReport {
        JunitReport {
            statistics: TestRunStatistics {
                total: 3,
                passed: 1,
                failed: 2,
                skipped: 0,
                timed_out: 1,
            },
            failures: vec![
                FailedTestRecord::new("m::slow", "timed out", "", FailureKind::Failure),
                FailedTestRecord::new("m::bad", "assert failed", "left != right", FailureKind::Failure),
            ],
        }
    }

    fn output_map(content: &str) -> Vec<(String, String)> {
        content
            .lines()
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn writes_outputs_and_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("github_output");
        std::fs::write(&output, "earlier=1\n").unwrap();

        let files = write_github_output_in(&output, &sample_report(), dir.path()).unwrap();

        let content = std::fs::read_to_string(&output).unwrap();
        assert!(content.starts_with("earlier=1\n"), "output must be appended");
        let map = output_map(&content);
        let get = |k: &str| map.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
        assert_eq!(get("total_tests").as_deref(), Some("3"));
        assert_eq!(get("passed").as_deref(), Some("1"));
        assert_eq!(get("failed").as_deref(), Some("2"));
        assert_eq!(get("timed_out").as_deref(), Some("1"));
        assert_eq!(
            get("failed_tests_list_file").map(PathBuf::from),
            Some(files.failed_tests_list.clone())
        );

        let list = std::fs::read_to_string(&files.failed_tests_list).unwrap();
        assert_eq!(list, "- m::slow (タイムアウト)\n- m::bad");
        let details = std::fs::read_to_string(&files.error_details).unwrap();
        assert!(details.contains("left != right"));

        let list_name = files.failed_tests_list.file_name().unwrap().to_string_lossy();
        assert!(list_name.starts_with("failed_tests_list_"));
        assert!(list_name.ends_with(".txt"));
        assert_ne!(files.failed_tests_list, files.error_details);
    }

    #[test]
    fn failed_append_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let output = dir.path().join("not-a-file");
        std::fs::create_dir(&output).unwrap();

        let err = write_github_output_in(&output, &sample_report(), staging.path()).unwrap_err();
        assert!(matches!(err, ReportError::Output { .. }));
        assert!(err.to_string().contains("not-a-file"));

        let leaked: Vec<_> = std::fs::read_dir(staging.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        assert!(leaked.is_empty(), "leaked temp files: {leaked:?}");
    }

    #[test]
    fn every_written_path_exists() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("github_output");

        write_github_output_in(&output, &sample_report(), dir.path()).unwrap();

        let content = std::fs::read_to_string(&output).unwrap();
        let paths: Vec<PathBuf> = output_map(&content)
            .into_iter()
            .filter(|(k, _)| k.ends_with("_file"))
            .map(|(_, v)| PathBuf::from(v))
            .collect();
        assert_eq!(paths.len(), 2);
        for path in paths {
            assert!(path.is_file(), "{} was handed off but does not exist", path.display());
        }
    }

    #[test]
    fn missing_staging_dir_is_an_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("github_output");
        let err = write_github_output_in(&output, &sample_report(), dir.path().join("absent"))
            .unwrap_err();
        assert!(matches!(err, ReportError::Output { .. }));
        assert!(!output.exists(), "no outputs are written without temp files");
    }

    #[test]
    fn stdout_report_has_markers_in_order() {
        let out = render_stdout_report(&sample_report());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            &lines[..5],
            &[
                "total_tests=3",
                "passed=1",
                "failed=2",
                "timed_out=1",
                FAILED_TESTS_MARKER
            ]
        );
        let marker = out.find(ERROR_DETAILS_MARKER).unwrap();
        assert!(out.find("- m::bad").unwrap() < marker);
        assert!(out[marker..].contains("**Error**: assert failed"));
    }
}
