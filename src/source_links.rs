//! Requirement tag scanner.
//!
//! Source files reference requirements with comment tags:
//!
//! ```python
//! # req-Id: tool_req__docs_dd_link_source_code_link
//! def link_source_code(): ...
//! ```
//!
//! Every tagged line yields one [`NeedLink`] per comma separated need ID.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DocsError, Result};
use crate::needs::{Need, Needs};

/// Tag marking a requirement implemented by the following code.
pub const TAG_REQ_ID: &str = concat!("#", " req-Id:");

/// Tag marking a requirement traced through the following code.
pub const TAG_REQ_TRACEABILITY: &str = concat!("#", " req-traceability:");

/// Cache file written into the build directory.
pub const CACHE_FILE_NAME: &str = "score_source_code_linker_cache.json";

/// A single tag occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedLink {
    /// Path relative to the scan root.
    pub file: PathBuf,
    /// 1-based line number.
    pub line: u32,
    pub tag: String,
    pub need: String,
    pub full_line: String,
}

/// Scanner settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    pub tags: Vec<String>,
    /// File extensions (without dot) that are scanned.
    pub extensions: Vec<String>,
    /// Directory names never descended into.
    pub ignore_dirs: Vec<String>,
    /// Glob patterns (relative to the root) of files to exclude.
    pub exclude: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            tags: vec![TAG_REQ_ID.to_string(), TAG_REQ_TRACEABILITY.to_string()],
            extensions: [
                "py", "rs", "c", "cc", "cpp", "cxx", "h", "hpp", "java", "ts", "js", "sh", "bzl",
            ]
            .iter()
            .map(|e| (*e).to_string())
            .collect(),
            ignore_dirs: [
                ".git",
                "node_modules",
                "target",
                "_build",
                "__pycache__",
                ".venv",
                "venv",
                ".tox",
                ".cache",
            ]
            .iter()
            .map(|d| (*d).to_string())
            .collect(),
            exclude: Vec::new(),
        }
    }
}

/// Extract the links of one line.
#[must_use]
pub fn parse_line(line: &str, line_nr: u32, file: &Path, tags: &[String]) -> Vec<NeedLink> {
    let Some((tag, rest)) = tags
        .iter()
        .find_map(|tag| line.split_once(tag.as_str()).map(|(_, rest)| (tag, rest)))
    else {
        return Vec::new();
    };

    rest.split(',')
        .filter_map(|piece| piece.split_whitespace().next())
        .map(|need| NeedLink {
            file: file.to_path_buf(),
            line: line_nr,
            tag: tag.clone(),
            need: need.to_string(),
            full_line: line.trim().to_string(),
        })
        .collect()
}

/// Scan one file. `file` in the links is relative to `root`.
pub fn scan_file(path: &Path, root: &Path, tags: &[String]) -> Result<Vec<NeedLink>> {
    let bytes = std::fs::read(path)?;
    let Ok(content) = String::from_utf8(bytes) else {
        debug!("Skipping non UTF-8 file {}", path.display());
        return Ok(Vec::new());
    };

    let relative = path.strip_prefix(root).unwrap_or(path);
    Ok(content
        .lines()
        .zip(1u32..)
        .flat_map(|(line, nr)| parse_line(line, nr, relative, tags))
        .collect())
}

fn build_exclude_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| DocsError::InvalidConfig {
            field: "source.exclude".to_string(),
            reason: format!("invalid glob '{pattern}': {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| DocsError::InvalidConfig {
        field: "source.exclude".to_string(),
        reason: e.to_string(),
    })
}

/// Scan a directory tree, honoring `.gitignore`.
///
/// Links are sorted by file, then line.
pub fn scan_tree(root: &Path, options: &ScanOptions) -> Result<Vec<NeedLink>> {
    if !root.is_dir() {
        return Err(DocsError::MissingFile {
            path: root.to_path_buf(),
        });
    }

    let exclude = build_exclude_set(&options.exclude)?;
    let ignore_dirs = options.ignore_dirs.clone();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .require_git(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| ignore_dirs.iter().any(|d| d == name)))
        })
        .build();

    let mut links = Vec::new();
    let mut scanned = 0usize;
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| options.extensions.iter().any(|e| e == ext));
        if !matches_ext {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude.is_match(relative) {
            continue;
        }

        scanned += 1;
        links.extend(scan_file(path, root, &options.tags)?);
    }

    links.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
    debug!(
        "Found {} need links in {} files under {}",
        links.len(),
        scanned,
        root.display()
    );
    Ok(links)
}

/// Group links by need ID, keeping first-seen order.
#[must_use]
pub fn group_by_need(links: &[NeedLink]) -> IndexMap<String, Vec<NeedLink>> {
    let mut groups: IndexMap<String, Vec<NeedLink>> = IndexMap::new();
    for link in links {
        groups.entry(link.need.clone()).or_default().push(link.clone());
    }
    groups
}

/// Resolve a need ID, trying each prefix when there is no direct match.
#[must_use]
pub fn find_need<'a>(needs: &'a Needs, id: &str, prefixes: &[String]) -> Option<&'a Need> {
    needs.get(id).or_else(|| {
        prefixes
            .iter()
            .find_map(|prefix| needs.get(&format!("{prefix}{id}")))
    })
}

/// `<build_dir>/score_source_code_linker_cache.json`
#[must_use]
pub fn cache_filename(build_dir: &Path) -> PathBuf {
    build_dir.join(CACHE_FILE_NAME)
}

/// Write links as JSON.
pub fn store_links(path: &Path, links: &[NeedLink]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(links)?)?;
    Ok(())
}

/// Read links written by [`store_links`].
pub fn load_links(path: &Path) -> Result<Vec<NeedLink>> {
    if !path.exists() {
        return Err(DocsError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}
