//! Broken link report from the host's link checker output.
//!
//! Input lines look like:
//!
//! ```text
//! (how-to/write_docs: line    7) ok        https://docutils.sourceforge.io/rst.html
//! (internals/extension_guide: line   47) broken    https://github.com/x/y#anchor - Anchor 'anchor' not found
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::ansi::strip_ansi;
use crate::error::Result;

/// Link checker statuses that end up in the report.
pub const REPORTED_STATUSES: &[&str] = &["broken"];

/// File name of the generated issue body.
pub const ISSUE_BODY_FILE_NAME: &str = "issue_body.md";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenLink {
    pub location: String,
    pub line_nr: String,
    pub url: String,
    pub status: String,
    pub reasoning: String,
}

fn parse_line(line: &str) -> Option<BrokenLink> {
    let (location_part, rest) = line.split_once(") ")?;
    let location_part = location_part.replace('(', "");
    let location = location_part.split(':').next()?.trim().to_string();
    let line_nr = location_part.rsplit("line").next()?.trim().to_string();

    let (status_and_url, reasoning) = rest.split_once(" - ")?;
    let mut tokens = status_and_url.split_whitespace();
    let status = tokens.next()?;
    if !REPORTED_STATUSES.contains(&status) {
        return None;
    }
    let url = tokens.next()?;

    Some(BrokenLink {
        location,
        line_nr,
        url: url.to_string(),
        status: status.to_string(),
        reasoning: reasoning.trim().to_string(),
    })
}

/// Extract the broken links of a link checker log. ANSI codes are ignored.
#[must_use]
pub fn parse_broken_links(log: &str) -> Vec<BrokenLink> {
    strip_ansi(log).lines().filter_map(parse_line).collect()
}

/// Markdown table of broken links.
#[must_use]
pub fn generate_markdown_table(links: &[BrokenLink]) -> String {
    let mut table = String::from("| Location | Line Number | URL | Status | Reasoning |\n");
    table.push_str("|----------|-------------|-----|--------|-----------|\n");
    for link in links {
        table.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            link.location, link.line_nr, link.url, link.status, link.reasoning
        ));
    }
    table
}

/// Body of the issue filed for broken links.
#[must_use]
pub fn generate_issue_body(links: &[BrokenLink]) -> String {
    format!(
        "\n# Broken Links Report\n\
         The following broken links were detected in the documentation:\n\
         {}\n\
         Please investigate and fix these issues to ensure all links are functional.\n\
         Thank you!\n",
        generate_markdown_table(links)
    )
}

/// Write `issue_body.md` into `dir` when there are broken links.
pub fn write_issue_body(dir: &Path, links: &[BrokenLink]) -> Result<Option<PathBuf>> {
    if links.is_empty() {
        return Ok(None);
    }
    let path = dir.join(ISSUE_BODY_FILE_NAME);
    std::fs::write(&path, generate_issue_body(links))?;
    info!("Wrote {} broken links to {}", links.len(), path.display());
    Ok(Some(path))
}
