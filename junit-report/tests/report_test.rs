use std::io::Write;

use junit_report::{
    format_failed_tests_list, format_failed_tests_with_errors, parse_file, write_github_output_in,
    FailureKind, ReportError,
};

const PYTEST_REPORT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<testsuites>
  <testsuite name="pytest" errors="1" failures="2" skipped="0" tests="5" time="12.5">
    <testcase classname="tests.test_api" name="test_ok" time="0.1"/>
    <testcase classname="tests.test_api" name="test_status" time="0.2">
      <failure message="AssertionError: expected 200, got 500">def test_status():
&gt;       assert resp.status == 200
E       AssertionError</failure>
    </testcase>
    <testcase classname="tests.test_api" name="test_slow" time="30.0">
      <failure message="Failed: Timeout &gt;30.0s"><![CDATA[+++ Timeout +++
stack dump]]></failure>
    </testcase>
    <testcase classname="tests.test_db" name="test_connect" time="0.0">
      <error message="fixture 'db' not found">setup failed</error>
    </testcase>
    <testcase classname="tests.test_db" name="test_query" time="0.0"/>
  </testsuite>
</testsuites>
"#;

fn write_fixture(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".xml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn parses_pytest_report_from_disk() {
    let fixture = write_fixture(PYTEST_REPORT);
    let report = parse_file(fixture.path()).unwrap();

    assert_eq!(report.statistics.total, 5);
    assert_eq!(report.statistics.failed, 3);
    assert_eq!(report.statistics.passed, 2);
    assert_eq!(report.statistics.timed_out, 1);

    let names: Vec<&str> = report.failures.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "tests.test_api::test_status",
            "tests.test_api::test_slow",
            "tests.test_db::test_connect"
        ]
    );
    assert_eq!(report.failures[2].kind, FailureKind::Error);
    assert_eq!(report.failures[1].message, "Failed: Timeout >30.0s");
    assert!(report.failures[1].is_timeout);
    assert!(report.failures[0].details.contains(">       assert resp.status == 200"));
    assert_eq!(report.failures[1].details, "+++ Timeout +++\nstack dump");
}

#[test]
fn every_name_and_message_survives_formatting() {
    let fixture = write_fixture(PYTEST_REPORT);
    let report = parse_file(fixture.path()).unwrap();

    let list = format_failed_tests_list(&report.failures);
    let details = format_failed_tests_with_errors(&report.failures);
    for record in &report.failures {
        assert!(list.contains(&record.name), "{} missing from list", record.name);
        assert!(details.contains(&format!("### {}", record.name)));
        assert!(details.contains(&format!("**Error**: {}", record.message)));
    }
    assert!(list.contains("- tests.test_api::test_slow (タイムアウト)"));
}

#[test]
fn report_serializes_to_json() {
    let fixture = write_fixture(PYTEST_REPORT);
    let report = parse_file(fixture.path()).unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["statistics"]["failed"], 3);
    assert_eq!(json["failures"][2]["kind"], "error");
    assert_eq!(json["failures"][1]["is_timeout"], true);
}

#[test]
fn handoff_files_hold_formatted_sections() {
    let fixture = write_fixture(PYTEST_REPORT);
    let report = parse_file(fixture.path()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("github_output");

    let files = write_github_output_in(&output, &report, dir.path()).unwrap();

    let outputs = std::fs::read_to_string(&output).unwrap();
    assert!(outputs.contains("total_tests=5\n"));
    assert!(outputs.contains("timed_out=1\n"));
    assert_eq!(
        std::fs::read_to_string(&files.failed_tests_list).unwrap(),
        format_failed_tests_list(&report.failures)
    );
    assert_eq!(
        std::fs::read_to_string(&files.error_details).unwrap(),
        format_failed_tests_with_errors(&report.failures)
    );
}

#[test]
fn malformed_file_names_the_path() {
    let fixture = write_fixture("<testsuite tests=\"1\"><testcase name=\"a\">");
    let err = parse_file(fixture.path()).unwrap_err();
    assert!(matches!(err, ReportError::Malformed { .. }));
    assert!(err.to_string().contains(&fixture.path().display().to_string()));
}
