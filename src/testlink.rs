//! Test execution XML parsing.
//!
//! Reads JUnit style `test.xml` reports and turns every testcase carrying
//! verification properties into links from the test to the needs it
//! verifies:
//!
//! ```xml
//! <testcase name="test_schema" file="src/test_schema.py" line="12">
//!   <properties>
//!     <property name="PartiallyVerifies" value="[tool_req__docs_schema, tool_req__docs_ids]"/>
//!     <property name="TestType" value="requirements-based"/>
//!     <property name="DerivationTechnique" value="requirements-analysis"/>
//!   </properties>
//! </testcase>
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use quick_xml::escape::{resolve_html5_entity, resolve_predefined_entity};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::ansi::strip_ansi;
use crate::error::{DocsError, Result};

/// File name of the per-target report written by the test runner.
pub const TEST_XML_NAME: &str = "test.xml";

/// Default directory holding the test reports.
pub const DEFAULT_TEST_LOG_DIR: &str = "bazel-testlogs";

// ============================================================================
// Data types
// ============================================================================

/// Outcome of a single testcase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
    Disabled,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Disabled => "disabled",
        };
        f.write_str(text)
    }
}

/// How much of a need a test verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyType {
    Partially,
    Fully,
}

/// Link from one test to one need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataForTestLink {
    pub name: String,
    pub file: PathBuf,
    pub line: u32,
    pub need: String,
    pub verify_type: VerifyType,
    pub result: TestOutcome,
    pub result_text: String,
}

/// A testcase parsed from a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataOfTestCase {
    pub name: String,
    pub file: String,
    pub line: u32,
    pub result: TestOutcome,
    pub result_text: String,
    pub test_type: String,
    pub derivation_technique: String,
    pub partially_verifies: Option<String>,
    pub fully_verifies: Option<String>,
}

/// Strip ANSI escapes, unescape entities, join lines and trim.
#[must_use]
pub fn clean_text(raw: &str) -> String {
    let stripped = strip_ansi(raw);
    unescape_entities(&stripped).replace('\n', " ").trim().to_string()
}

/// Decode named (HTML5) and numeric character references one at a time.
/// A `&` that does not start a known reference is kept as is.
fn unescape_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .and_then(|end| resolve_entity(&after[..end]).map(|value| (value, end)));
        match decoded {
            Some((value, end)) => {
                out.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_entity(name: &str) -> Option<String> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => number.parse().ok(),
        };
        return code.and_then(char::from_u32).map(String::from);
    }
    resolve_predefined_entity(name)
        .or_else(|| resolve_html5_entity(name))
        .map(str::to_string)
}

fn split_ids(list: Option<&str>) -> impl Iterator<Item = &str> {
    list.into_iter()
        .flat_map(|l| l.split(','))
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

impl DataOfTestCase {
    /// One link per verified need ID.
    #[must_use]
    pub fn test_links(&self) -> Vec<DataForTestLink> {
        let partially = split_ids(self.partially_verifies.as_deref()).map(|n| (n, VerifyType::Partially));
        let fully = split_ids(self.fully_verifies.as_deref()).map(|n| (n, VerifyType::Fully));

        partially
            .chain(fully)
            .map(|(need, verify_type)| DataForTestLink {
                name: self.name.clone(),
                file: PathBuf::from(&self.file),
                line: self.line,
                need: need.to_string(),
                verify_type,
                result: self.result,
                result_text: self.result_text.clone(),
            })
            .collect()
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Testcases of one or more reports plus the testcases that were rejected.
#[derive(Debug, Default)]
pub struct ParsedTestReport {
    pub cases: Vec<DataOfTestCase>,
    pub errors: Vec<DocsError>,
}

impl ParsedTestReport {
    /// Links of all accepted testcases.
    #[must_use]
    pub fn test_links(&self) -> Vec<DataForTestLink> {
        self.cases.iter().flat_map(DataOfTestCase::test_links).collect()
    }
}

#[derive(Default)]
struct PendingCase {
    attributes: HashMap<String, String>,
    result: Option<(TestOutcome, String)>,
    properties: HashMap<String, String>,
    has_properties: bool,
}

fn attributes(element: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value()?.to_string();
        map.insert(key, value);
    }
    Ok(map)
}

fn property_value(value: &str) -> String {
    if value.starts_with('[') {
        value
            .replace(['[', ']'], "")
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        value.to_string()
    }
}

impl PendingCase {
    fn apply_child(&mut self, name: &[u8], attrs: HashMap<String, String>) {
        match name {
            b"failure" => {
                let message = attrs.get("message").cloned().unwrap_or_default();
                self.result = Some((TestOutcome::Failed, message));
            }
            b"skipped" if !matches!(self.result, Some((TestOutcome::Failed, _))) => {
                let message = attrs.get("message").cloned().unwrap_or_default();
                self.result = Some((TestOutcome::Skipped, message));
            }
            b"properties" => self.has_properties = true,
            b"property" => {
                let name = attrs.get("name").cloned().unwrap_or_default();
                if name == "Description" {
                    return;
                }
                let value = attrs.get("value").map(String::as_str).unwrap_or_default();
                self.properties.insert(name, property_value(value));
            }
            _ => {}
        }
    }

    fn finish(self) -> Result<DataOfTestCase> {
        let name = self
            .attributes
            .get("name")
            .cloned()
            .ok_or_else(|| DocsError::test_case("<unnamed>", "missing 'name' attribute"))?;
        let file = self
            .attributes
            .get("file")
            .cloned()
            .ok_or_else(|| DocsError::test_case(&name, "missing 'file' attribute"))?;
        let line_text = self
            .attributes
            .get("line")
            .ok_or_else(|| DocsError::test_case(&name, format!("located in {file}, missing 'line' attribute")))?;
        let line = line_text.trim().parse::<u32>().map_err(|_| {
            DocsError::test_case(&name, format!("located in {file}, invalid line '{line_text}'"))
        })?;

        if !self.has_properties {
            return Err(DocsError::test_case(
                &name,
                format!(
                    "located in {file}:{line}, does not have any properties. Properties \
                     'TestType', 'DerivationTechnique' and either 'PartiallyVerifies' or \
                     'FullyVerifies' are mandatory."
                ),
            ));
        }

        let mut properties = self.properties;
        let mut mandatory = |key: &str| {
            properties.remove(key).ok_or_else(|| {
                DocsError::test_case(
                    &name,
                    format!("located in {file}:{line}, missing mandatory property '{key}'"),
                )
            })
        };
        let test_type = mandatory("TestType")?;
        let derivation_technique = mandatory("DerivationTechnique")?;

        let partially_verifies = properties.remove("PartiallyVerifies");
        let fully_verifies = properties.remove("FullyVerifies");
        if partially_verifies.is_none() && fully_verifies.is_none() {
            return Err(DocsError::test_case(
                &name,
                format!(
                    "located in {file}:{line}. Either 'PartiallyVerifies' or 'FullyVerifies' \
                     must be provided."
                ),
            ));
        }

        let is_disabled = self.attributes.get("status").map(String::as_str) == Some("notrun");
        let (result, text) = if is_disabled {
            (TestOutcome::Disabled, String::new())
        } else {
            self.result.unwrap_or((TestOutcome::Passed, String::new()))
        };

        Ok(DataOfTestCase {
            name,
            file,
            line,
            result,
            result_text: clean_text(&text),
            test_type,
            derivation_technique,
            partially_verifies,
            fully_verifies,
        })
    }
}

/// Parse the testcases of one report.
///
/// Testcases lacking mandatory data are collected in
/// [`ParsedTestReport::errors`]; malformed XML fails the whole report.
pub fn parse_test_xml(content: &str, source: &Path) -> Result<ParsedTestReport> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut report = ParsedTestReport::default();
    let mut current: Option<PendingCase> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| DocsError::test_report(source, e.to_string()))?;
        match event {
            Event::Start(e) if e.name().as_ref() == b"testcase" => {
                current = Some(PendingCase {
                    attributes: attributes(&e)?,
                    ..Default::default()
                });
            }
            Event::Empty(e) if e.name().as_ref() == b"testcase" => {
                let case = PendingCase {
                    attributes: attributes(&e)?,
                    ..Default::default()
                };
                push_case(&mut report, case);
            }
            Event::Start(e) | Event::Empty(e) => {
                if let Some(case) = current.as_mut() {
                    case.apply_child(e.name().as_ref(), attributes(&e)?);
                }
            }
            Event::End(e) if e.name().as_ref() == b"testcase" => {
                if let Some(case) = current.take() {
                    push_case(&mut report, case);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    debug!(
        "Parsed {} testcases from {} ({} rejected)",
        report.cases.len(),
        source.display(),
        report.errors.len()
    );
    Ok(report)
}

fn push_case(report: &mut ParsedTestReport, case: PendingCase) {
    match case.finish() {
        Ok(case) => report.cases.push(case),
        Err(e) => {
            error!("{}", e);
            report.errors.push(e);
        }
    }
}

/// Parse a report file.
pub fn read_test_xml(path: &Path) -> Result<ParsedTestReport> {
    let content = std::fs::read_to_string(path)?;
    parse_test_xml(&content, path)
}

/// Every `test.xml` below `dir`, sorted by path.
#[must_use]
pub fn find_xml_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == TEST_XML_NAME)
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Parse every report below `dir` into one result.
pub fn collect_test_reports(dir: &Path) -> Result<ParsedTestReport> {
    let mut combined = ParsedTestReport::default();
    let files = find_xml_files(dir);
    for file in &files {
        let report = read_test_xml(file)?;
        combined.cases.extend(report.cases);
        combined.errors.extend(report.errors);
    }
    info!(
        "Collected {} testcases from {} reports in {}",
        combined.cases.len(),
        files.len(),
        dir.display()
    );
    Ok(combined)
}

// ============================================================================
// Storage
// ============================================================================

/// Write test links as JSON.
pub fn store_test_links(path: &Path, links: &[DataForTestLink]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(links)?)?;
    Ok(())
}

/// Read links written by [`store_test_links`].
pub fn load_test_links(path: &Path) -> Result<Vec<DataForTestLink>> {
    if !path.exists() {
        return Err(DocsError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

// ============================================================================
// Merging
// ============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SuiteCounters {
    tests: u64,
    failures: u64,
    errors: u64,
    skipped: u64,
}

impl SuiteCounters {
    fn add(&mut self, attrs: &HashMap<String, String>) {
        let get = |key: &str| {
            attrs
                .get(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0)
        };
        self.tests += get("tests");
        self.failures += get("failures");
        self.errors += get("errors");
        self.skipped += get("skipped");
    }
}

/// Merge the `<testsuite>` elements of several JUnit reports into one
/// `<testsuites>` document. Returns the number of merged suites.
pub fn merge_junit(inputs: &[PathBuf], output: &Path) -> Result<usize> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let mut suites = Vec::new();
    let mut counters = SuiteCounters::default();

    {
        let mut body = Writer::new(&mut suites);
        for input in inputs {
            let content = std::fs::read_to_string(input)?;
            let mut reader = Reader::from_str(&content);
            reader.config_mut().trim_text(true);
            let mut depth = 0usize;

            loop {
                let event = reader
                    .read_event()
                    .map_err(|e| DocsError::test_report(input, e.to_string()))?;
                match &event {
                    Event::Eof => break,
                    Event::Start(e) if depth == 0 && e.name().as_ref() == b"testsuite" => {
                        counters.add(&attributes(e)?);
                        depth = 1;
                        body.write_event(event.borrow())?;
                        continue;
                    }
                    Event::Empty(e) if depth == 0 && e.name().as_ref() == b"testsuite" => {
                        counters.add(&attributes(e)?);
                        body.write_event(event.borrow())?;
                        continue;
                    }
                    _ => {}
                }
                if depth > 0 {
                    match &event {
                        Event::Start(_) => depth += 1,
                        Event::End(_) => depth -= 1,
                        _ => {}
                    }
                    body.write_event(event.borrow())?;
                }
            }
        }
    }

    writer.write_event(Event::Decl(quick_xml::events::BytesDecl::new(
        "1.0",
        Some("UTF-8"),
        None,
    )))?;
    let mut root = BytesStart::new("testsuites");
    root.push_attribute(("tests", counters.tests.to_string().as_str()));
    root.push_attribute(("failures", counters.failures.to_string().as_str()));
    root.push_attribute(("errors", counters.errors.to_string().as_str()));
    root.push_attribute(("skipped", counters.skipped.to_string().as_str()));
    writer.write_event(Event::Start(root))?;
    writer.get_mut().extend_from_slice(&suites);
    writer.write_event(Event::End(quick_xml::events::BytesEnd::new("testsuites")))?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut document = writer.into_inner();
    document.push(b'\n');
    std::fs::write(output, document)?;

    info!("Merged {} files into {}", inputs.len(), output.display());
    Ok(inputs.len())
}
