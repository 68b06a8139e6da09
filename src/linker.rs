//! Attaching source and test links to needs.

use std::collections::BTreeMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::git::github_link;
use crate::needs::Needs;
use crate::source_links::{find_need, group_by_need, NeedLink};
use crate::testlink::{DataForTestLink, TestOutcome, VerifyType};

/// File the link report is written to.
pub const LINK_REPORT_FILE_NAME: &str = "score_source_code_parser.json";

/// Where links point to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    /// `https://github.com/<owner>/<repo>`
    pub base_url: String,
    pub commit: String,
}

impl LinkTarget {
    #[must_use]
    pub fn url(&self, file: &Path, line: u32) -> String {
        github_link(&self.base_url, &self.commit, file, line)
    }
}

/// Verification result attached to a need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResultEntry {
    pub name: String,
    pub result: TestOutcome,
    pub verify_type: VerifyType,
}

/// Everything linked to one need.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NeedTraceability {
    pub source_code_link: Vec<String>,
    pub testlink: Vec<String>,
    pub test_results: Vec<TestResultEntry>,
}

impl NeedTraceability {
    /// Value of the host's `source_code_link` option.
    #[must_use]
    pub fn source_code_link_option(&self) -> String {
        self.source_code_link.join(", ")
    }
}

/// Links per need, ordered by need ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub needs: BTreeMap<String, NeedTraceability>,
    pub warning_count: usize,
    pub warnings: Vec<String>,
}

fn not_found_message(need: &str, locations: &[String]) -> String {
    let listed = locations
        .iter()
        .map(|l| format!("'{l}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Could not find {need} in the needs id's. Found in file(s): [{listed}]")
}

fn group_test_links(links: &[DataForTestLink]) -> IndexMap<String, Vec<&DataForTestLink>> {
    let mut groups: IndexMap<String, Vec<&DataForTestLink>> = IndexMap::new();
    for link in links {
        groups.entry(link.need.clone()).or_default().push(link);
    }
    groups
}

/// Resolve all links against the known needs.
///
/// Unknown need IDs are reported as warnings and otherwise dropped.
#[must_use]
pub fn link_needs(
    needs: &Needs,
    source_links: &[NeedLink],
    test_links: &[DataForTestLink],
    target: &LinkTarget,
    prefixes: &[String],
) -> LinkReport {
    let mut report = LinkReport::default();

    for (id, links) in group_by_need(source_links) {
        let Some(need) = find_need(needs, &id, prefixes) else {
            let locations: Vec<String> = links
                .iter()
                .map(|l| format!("{}#L{}", l.file.to_string_lossy(), l.line))
                .collect();
            report.warnings.push(not_found_message(&id, &locations));
            continue;
        };
        let entry = report.needs.entry(need.id.clone()).or_default();
        entry
            .source_code_link
            .extend(links.iter().map(|l| target.url(&l.file, l.line)));
    }

    for (id, links) in group_test_links(test_links) {
        let Some(need) = find_need(needs, &id, prefixes) else {
            let locations: Vec<String> = links
                .iter()
                .map(|l| format!("{}#L{}", l.file.to_string_lossy(), l.line))
                .collect();
            report.warnings.push(not_found_message(&id, &locations));
            continue;
        };
        let entry = report.needs.entry(need.id.clone()).or_default();
        for link in links {
            entry.testlink.push(target.url(&link.file, link.line));
            entry.test_results.push(TestResultEntry {
                name: link.name.clone(),
                result: link.result,
                verify_type: link.verify_type,
            });
        }
    }

    for message in &report.warnings {
        warn!("{}", message);
    }
    report.warning_count = report.warnings.len();
    report
}

/// Write the report as pretty JSON to `<dir>/score_source_code_parser.json`.
pub fn write_link_report(dir: &Path, report: &LinkReport) -> Result<std::path::PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(LINK_REPORT_FILE_NAME);
    std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
    info!(
        "Linked {} needs ({} warnings) -> {}",
        report.needs.len(),
        report.warning_count,
        path.display()
    );
    Ok(path)
}
