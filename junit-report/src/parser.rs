//! Streaming JUnit XML parser.
//!
//! Accepts the common JUnit shapes:
//!
//! ```text
//! <testsuites>                      <testsuite tests=".." failures="..">
//!   <testsuite tests=".." ...>        <testcase name=".." classname="..">
//!     <testcase ...>                    <failure message="..">details</failure>
//!       <failure message="..">...       </testcase>
//!       <error message="..">...       </testsuite>
//! ```
//!
//! Counts come from `testsuite` attributes (summed over outermost suites);
//! when the document has no `testsuite` element the root's own attributes
//! are used. Failure records come from every `testcase` with a direct
//! `failure` or `error` child.

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::error::ReportError;
use crate::model::{qualified_name, FailedTestRecord, FailureKind, JunitReport, TestRunStatistics};

/// Read and parse a JUnit XML report from disk.
pub fn parse_file(path: impl AsRef<Path>) -> Result<JunitReport, ReportError> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|e| ReportError::from_read(path, e))?;
    parse_str(&xml, path)
}

/// Parse an in-memory JUnit XML document. `source` labels errors.
pub fn parse_str(xml: &str, source: impl AsRef<Path>) -> Result<JunitReport, ReportError> {
    let source = source.as_ref();
    let report = ReportScanner::default()
        .scan(xml)
        .and_then(ReportScanner::into_report)
        .map_err(|reason| ReportError::malformed(source, reason))?;

    debug!(
        source = %source.display(),
        total = report.statistics.total,
        failed = report.statistics.failed,
        timed_out = report.statistics.timed_out,
        records = report.failures.len(),
        "Parsed JUnit report"
    );
    Ok(report)
}

/// Raw counter attributes of one suite (or of the root fallback).
#[derive(Debug, Default, Clone, Copy)]
struct SuiteCounts {
    tests: u64,
    failures: u64,
    errors: u64,
    skipped: u64,
}

impl SuiteCounts {
    fn from_attributes(attrs: &[(String, String)]) -> Result<Self, String> {
        Ok(Self {
            tests: count_attr(attrs, "tests")?,
            failures: count_attr(attrs, "failures")?,
            errors: count_attr(attrs, "errors")?,
            skipped: count_attr(attrs, "skipped")?,
        })
    }

    fn add(&mut self, other: SuiteCounts) {
        self.tests = self.tests.saturating_add(other.tests);
        self.failures = self.failures.saturating_add(other.failures);
        self.errors = self.errors.saturating_add(other.errors);
        self.skipped = self.skipped.saturating_add(other.skipped);
    }
}

/// First `failure`/`error` child seen for the open testcase.
#[derive(Debug)]
struct PendingFailure {
    message: String,
    text: String,
}

#[derive(Debug)]
struct PendingCase {
    name: String,
    classname: Option<String>,
    depth: usize,
    failure: Option<PendingFailure>,
    error: Option<PendingFailure>,
}

impl PendingCase {
    fn into_record(self) -> Option<FailedTestRecord> {
        let (kind, found) = match (self.failure, self.error) {
            (Some(f), _) => (FailureKind::Failure, f),
            (None, Some(e)) => (FailureKind::Error, e),
            (None, None) => return None,
        };
        Some(FailedTestRecord::new(
            qualified_name(self.classname.as_deref(), &self.name),
            found.message,
            &found.text,
            kind,
        ))
    }
}

/// Text collection target while inside a failure/error element.
#[derive(Debug, Clone, Copy)]
struct Collecting {
    kind: FailureKind,
    depth: usize,
}

#[derive(Debug, Default)]
struct ReportScanner {
    depth: usize,
    /// Raw root attributes; only parsed when the document has no suites.
    root_attrs: Option<Vec<(String, String)>>,
    root_closed: bool,
    suite_counts: Option<SuiteCounts>,
    open_suites: usize,
    case: Option<PendingCase>,
    collecting: Option<Collecting>,
    failures: Vec<FailedTestRecord>,
}

impl ReportScanner {
    fn scan(mut self, xml: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(xml);

        loop {
            let event = reader
                .read_event()
                .map_err(|e| format!("{e} (at byte {})", reader.buffer_position()))?;
            match event {
                Event::Start(e) => {
                    self.reject_after_root(&reader)?;
                    self.open_element(&e, false)?;
                    self.depth += 1;
                }
                Event::Empty(e) => {
                    self.reject_after_root(&reader)?;
                    self.open_element(&e, true)?;
                    self.root_closed = self.depth == 0;
                }
                Event::End(e) => {
                    self.depth = self.depth.checked_sub(1).ok_or_else(|| {
                        format!("unexpected closing tag at byte {}", reader.buffer_position())
                    })?;
                    let local = e.local_name();
                    self.close_element(local.as_ref());
                    self.root_closed = self.depth == 0;
                }
                Event::Text(t) => {
                    if self.root_closed && !t.iter().all(u8::is_ascii_whitespace) {
                        self.reject_after_root(&reader)?;
                    }
                    if self.collecting.is_some() {
                        let text = t.unescape().map_err(|e| e.to_string())?;
                        self.push_text(&text);
                    }
                }
                Event::CData(c) => {
                    self.reject_after_root(&reader)?;
                    if self.collecting.is_some() {
                        let raw = c.into_inner();
                        self.push_text(&String::from_utf8_lossy(&raw));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if self.depth != 0 {
            return Err(format!(
                "unexpected end of document: {} unclosed element(s)",
                self.depth
            ));
        }
        if self.root_attrs.is_none() {
            return Err("document has no root element".to_string());
        }
        Ok(self)
    }

    fn reject_after_root(&self, reader: &Reader<&[u8]>) -> Result<(), String> {
        if self.root_closed {
            return Err(format!(
                "content after the root element at byte {}",
                reader.buffer_position()
            ));
        }
        Ok(())
    }

    fn open_element(&mut self, e: &BytesStart<'_>, is_empty: bool) -> Result<(), String> {
        let local = e.local_name();
        let tag = local.as_ref();

        if self.root_attrs.is_none() {
            self.root_attrs = Some(attributes(e)?);
        }

        match tag {
            b"testsuite" => {
                if self.open_suites == 0 {
                    let counts = SuiteCounts::from_attributes(&attributes(e)?)?;
                    self.suite_counts.get_or_insert_with(SuiteCounts::default).add(counts);
                }
                if !is_empty {
                    self.open_suites += 1;
                }
            }
            b"testcase" if !is_empty => {
                let attrs = attributes(e)?;
                self.case = Some(PendingCase {
                    name: attr(&attrs, "name").unwrap_or("unknown").to_string(),
                    classname: attr(&attrs, "classname").map(str::to_string),
                    depth: self.depth,
                    failure: None,
                    error: None,
                });
            }
            b"failure" | b"error" => {
                let kind = if tag == b"failure" {
                    FailureKind::Failure
                } else {
                    FailureKind::Error
                };
                let depth = self.depth;
                let Some(case) = self.case.as_mut() else {
                    return Ok(());
                };
                if depth != case.depth + 1 {
                    return Ok(());
                }
                let slot = match kind {
                    FailureKind::Failure => &mut case.failure,
                    FailureKind::Error => &mut case.error,
                };
                if slot.is_some() {
                    return Ok(());
                }
                let attrs = attributes(e)?;
                *slot = Some(PendingFailure {
                    message: attr(&attrs, "message").unwrap_or_default().to_string(),
                    text: String::new(),
                });
                if !is_empty {
                    self.collecting = Some(Collecting { kind, depth });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close_element(&mut self, tag: &[u8]) {
        if let Some(collecting) = self.collecting {
            if self.depth == collecting.depth {
                self.collecting = None;
            }
        }

        match tag {
            b"testsuite" => self.open_suites = self.open_suites.saturating_sub(1),
            b"testcase" => {
                let closes_case = self.case.as_ref().is_some_and(|c| c.depth == self.depth);
                if closes_case {
                    if let Some(record) = self.case.take().and_then(PendingCase::into_record) {
                        self.failures.push(record);
                    }
                }
            }
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        let (Some(collecting), Some(case)) = (self.collecting, self.case.as_mut()) else {
            return;
        };
        // Only direct text of the failure element, nested markup is skipped.
        if self.depth != collecting.depth + 1 {
            return;
        }
        let slot = match collecting.kind {
            FailureKind::Failure => case.failure.as_mut(),
            FailureKind::Error => case.error.as_mut(),
        };
        if let Some(pending) = slot {
            pending.text.push_str(text);
        }
    }

    fn into_report(self) -> Result<JunitReport, String> {
        let counts = match (self.suite_counts, &self.root_attrs) {
            (Some(counts), _) => counts,
            (None, Some(attrs)) => SuiteCounts::from_attributes(attrs)?,
            (None, None) => SuiteCounts::default(),
        };
        let failed = counts.failures.saturating_add(counts.errors);
        let passed = counts
            .tests
            .checked_sub(failed.saturating_add(counts.skipped))
            .unwrap_or_else(|| {
                warn!(
                    total = counts.tests,
                    failed,
                    skipped = counts.skipped,
                    "Suite counts exceed total; reporting passed=0"
                );
                0
            });
        let timed_out = self.failures.iter().filter(|r| r.is_timeout).count() as u64;
        if timed_out > failed {
            warn!(
                timed_out,
                failed, "More timeout records than failed count in suite attributes"
            );
        }

        Ok(JunitReport {
            statistics: TestRunStatistics {
                total: counts.tests,
                passed,
                failed,
                skipped: counts.skipped,
                timed_out,
            },
            failures: self.failures,
        })
    }
}

fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, String> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|err| err.to_string())?;
        out.push((key, value.into_owned()));
    }
    Ok(out)
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn count_attr(attrs: &[(String, String)], key: &str) -> Result<u64, String> {
    match attr(attrs, key) {
        None => Ok(0),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("attribute {key}=\"{raw}\" is not a non-negative integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> JunitReport {
        parse_str(xml, "inline.xml").unwrap()
    }

    #[test]
    fn basic_counts_and_records() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites>
  <testsuite name="test-suite" tests="10" failures="2" errors="0" skipped="0">
    <testcase name="passed_test_0" classname="test_module"/>
    <testcase name="server_basic_test" classname="tests::integration">
      <failure message="Connection refused">Server not responding</failure>
    </testcase>
    <testcase name="client_connect" classname="tests::integration">
      <failure message="Failed to connect">Network error</failure>
    </testcase>
  </testsuite>
</testsuites>"#;
        let report = parse(xml);

        assert_eq!(report.statistics.total, 10);
        assert_eq!(report.statistics.passed, 8);
        assert_eq!(report.statistics.failed, 2);
        assert_eq!(report.statistics.timed_out, 0);
        assert!(report.statistics.is_consistent());

        assert_eq!(report.failures.len(), 2);
        let first = &report.failures[0];
        assert_eq!(first.name, "tests::integration::server_basic_test");
        assert_eq!(first.message, "Connection refused");
        assert_eq!(first.details, "Server not responding");
        assert!(!first.is_timeout);
        assert_eq!(first.kind, FailureKind::Failure);
        assert_eq!(report.failures[1].name, "tests::integration::client_connect");
    }

    #[test]
    fn timeout_messages_are_counted() {
        let xml = r#"<testsuites><testsuite tests="2" failures="2">
  <testcase name="test_timeout" classname="test_module">
    <failure message="Test timed out after 60 seconds">Timeout details</failure>
  </testcase>
  <testcase name="test_failure" classname="test_module">
    <failure message="Assertion failed">Regular failure</failure>
  </testcase>
</testsuite></testsuites>"#;
        let report = parse(xml);

        assert_eq!(report.statistics.timed_out, 1);
        assert_eq!(report.statistics.passed, 0);
        assert!(report.failures[0].is_timeout);
        assert!(!report.failures[1].is_timeout);
    }

    #[test]
    fn errors_count_as_failed() {
        let xml = r#"<testsuite tests="5" failures="1" errors="1" skipped="1">
  <testcase name="a"><failure message="boom"/></testcase>
  <testcase name="b"><error message="panicked">thread 'b' panicked</error></testcase>
</testsuite>"#;
        let report = parse(xml);

        assert_eq!(report.statistics.failed, 2);
        assert_eq!(report.statistics.skipped, 1);
        assert_eq!(report.statistics.passed, 2);
        assert_eq!(report.failures[0].name, "a");
        assert_eq!(report.failures[0].details, "");
        assert_eq!(report.failures[1].kind, FailureKind::Error);
        assert_eq!(report.failures[1].details, "thread 'b' panicked");
    }

    #[test]
    fn failure_preferred_over_error() {
        let xml = r#"<testsuite tests="1" failures="1">
  <testcase name="both">
    <error message="from error">e</error>
    <failure message="from failure">f</failure>
  </testcase>
</testsuite>"#;
        let report = parse(xml);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].message, "from failure");
        assert_eq!(report.failures[0].details, "f");
    }

    #[test]
    fn root_without_testsuite_is_the_suite() {
        let xml = r#"<results tests="3" failures="1">
  <testcase name="lonely"><failure message="nope"/></testcase>
</results>"#;
        let report = parse(xml);
        assert_eq!(report.statistics.total, 3);
        assert_eq!(report.statistics.passed, 2);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn counts_sum_over_outermost_suites() {
        let xml = r#"<testsuites tests="99" failures="99">
  <testsuite name="bin-a" tests="4" failures="1">
    <testcase name="x" classname="a"><failure message="m"/></testcase>
  </testsuite>
  <testsuite name="bin-b" tests="6" failures="0" errors="1" skipped="2">
    <testcase name="y" classname="b"><error message="e"/></testcase>
  </testsuite>
</testsuites>"#;
        let report = parse(xml);
        assert_eq!(report.statistics.total, 10);
        assert_eq!(report.statistics.failed, 2);
        assert_eq!(report.statistics.skipped, 2);
        assert_eq!(report.statistics.passed, 6);
        let names: Vec<_> = report.failures.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a::x", "b::y"]);
    }

    #[test]
    fn entities_and_cdata_are_decoded() {
        let xml = r#"<testsuite tests="1" failures="1">
  <testcase name="cmp&lt;T&gt;" classname="mod">
    <failure message="left &amp; right differ"><![CDATA[
assert_eq!(a < b)
]]></failure>
  </testcase>
</testsuite>"#;
        let report = parse(xml);
        let record = &report.failures[0];
        assert_eq!(record.name, "mod::cmp<T>");
        assert_eq!(record.message, "left & right differ");
        assert_eq!(record.details, "assert_eq!(a < b)");
    }

    #[test]
    fn nextest_style_rerun_elements_are_ignored() {
        let xml = r#"<testsuites><testsuite tests="1" failures="0">
  <testcase name="flaky" classname="crate">
    <flakyFailure message="first try failed">trace</flakyFailure>
    <system-out>output</system-out>
  </testcase>
</testsuite></testsuites>"#;
        let report = parse(xml);
        assert!(report.failures.is_empty());
        assert_eq!(report.statistics.passed, 1);
    }

    #[test]
    fn missing_name_defaults_to_unknown() {
        let xml = r#"<testsuite tests="1" failures="1"><testcase><failure/></testcase></testsuite>"#;
        let report = parse(xml);
        assert_eq!(report.failures[0].name, "unknown");
        assert_eq!(report.failures[0].message, "");
    }

    #[test]
    fn inconsistent_counts_saturate_passed() {
        let xml = r#"<testsuite tests="1" failures="2"/>"#;
        let report = parse(xml);
        assert_eq!(report.statistics.passed, 0);
        assert_eq!(report.statistics.failed, 2);
    }

    #[test]
    fn mismatched_tags_are_malformed() {
        let err = parse_str("<testsuite><testcase></testsuite>", "bad.xml").unwrap_err();
        assert!(matches!(err, ReportError::Malformed { .. }));
        assert!(err.to_string().contains("bad.xml"));
    }

    #[test]
    fn truncated_document_is_malformed() {
        let err = parse_str(r#"<testsuites><testsuite tests="1">"#, "cut.xml").unwrap_err();
        assert!(matches!(err, ReportError::Malformed { .. }));
    }

    #[test]
    fn empty_document_is_malformed() {
        let err = parse_str("   ", "empty.xml").unwrap_err();
        assert!(err.to_string().contains("no root element"));
    }

    #[test]
    fn wrapper_counts_ignored_when_suites_exist() {
        let xml = r#"<testsuites tests="" failures="n/a">
  <testsuite tests="3" failures="1">
    <testcase name="a"><failure message="boom"/></testcase>
  </testsuite>
</testsuites>"#;
        let report = parse(xml);
        assert_eq!(report.statistics.total, 3);
        assert_eq!(report.statistics.failed, 1);
        assert_eq!(report.statistics.passed, 2);
    }

    #[test]
    fn bad_root_counts_without_suites_are_malformed() {
        let err = parse_str(r#"<results tests="n/a"><testcase name="a"/></results>"#, "root.xml")
            .unwrap_err();
        assert!(matches!(err, ReportError::Malformed { .. }));
        assert!(err.to_string().contains("tests=\"n/a\""));
    }

    #[test]
    fn sibling_root_elements_are_malformed() {
        let xml = r#"<testsuite tests="1"/><testsuite tests="5" failures="5"/>"#;
        let err = parse_str(xml, "two.xml").unwrap_err();
        assert!(matches!(err, ReportError::Malformed { .. }));
        assert!(err.to_string().contains("content after the root element"));
    }

    #[test]
    fn text_after_root_is_malformed() {
        let err = parse_str("<testsuite tests=\"1\"></testsuite>\ntrailing", "tail.xml")
            .unwrap_err();
        assert!(err.to_string().contains("content after the root element"));
    }

    #[test]
    fn trailing_whitespace_and_comments_are_accepted() {
        let report = parse("<testsuite tests=\"2\"></testsuite>\n<!-- generated -->\n\n");
        assert_eq!(report.statistics.total, 2);
    }

    #[test]
    fn non_numeric_count_is_malformed() {
        let err = parse_str(r#"<testsuite tests="many"/>"#, "nan.xml").unwrap_err();
        assert!(err.to_string().contains("tests=\"many\""));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_file(dir.path().join("nope.xml")).unwrap_err();
        assert!(matches!(err, ReportError::NotFound { .. }));
    }
}
