//! `MODULE.bazel` rewriting.
//!
//! Two strategies redirect the consumer's `bazel_dep` on docs-as-code:
//!
//! ```text
//! bazel_dep(name = "score_docs_as_code", version = "1.0.0")
//! local_path_override(module_name = "score_docs_as_code", path = "/work/docs-as-code")
//! ```
//!
//! or a `git_override` pinned to a commit.

use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::error::{DocsError, Result};

/// Manifest file name.
pub const MODULE_FILE_NAME: &str = "MODULE.bazel";

const PLACEHOLDER_VERSION: &str = "0.0.0";

fn local_override_line(module: &str, path: &Path) -> String {
    format!(
        "local_path_override(module_name = \"{module}\", path = \"{}\")",
        path.display()
    )
}

/// Index of the line after the `module(` block, or the line count when there
/// is none.
fn insert_index_after_module_block(lines: &[&str]) -> usize {
    let Some(start) = lines
        .iter()
        .position(|line| line.trim_start().starts_with("module("))
    else {
        return lines.len();
    };

    let mut depth: i64 = 0;
    for (index, line) in lines.iter().enumerate().skip(start) {
        depth += line.matches('(').count() as i64;
        depth -= line.matches(')').count() as i64;
        if depth <= 0 {
            return index + 1;
        }
    }
    lines.len()
}

fn insert_dependency(content: &str, block: &[String]) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let index = insert_index_after_module_block(&lines);

    let mut out: Vec<String> = lines[..index].iter().map(|l| (*l).to_string()).collect();
    out.push(String::new());
    out.extend(block.iter().cloned());
    out.extend(lines[index..].iter().map(|l| (*l).to_string()));
    out.join("\n")
}

/// Add a `local_path_override` for `module` pointing at `path`.
///
/// The override is placed after every `bazel_dep` line naming the module.
/// Without such a line, a placeholder dependency plus override is inserted
/// after the `module(` block, or appended when there is none.
#[must_use]
pub fn insert_local_path_override(content: &str, module: &str, path: &Path) -> String {
    let override_line = local_override_line(module, path);
    let mut found = false;
    let mut out = Vec::new();

    for line in content.split('\n') {
        out.push(line.to_string());
        if line.contains("bazel_dep") && line.contains(module) {
            found = true;
            out.push(override_line.clone());
        }
    }

    if found {
        return out.join("\n");
    }

    debug!("No bazel_dep on {} found, inserting one", module);
    insert_dependency(
        content,
        &[
            format!("bazel_dep(name = \"{module}\", version = \"{PLACEHOLDER_VERSION}\")"),
            override_line,
        ],
    )
}

/// Replace the `bazel_dep` on `module` by the dependency plus a
/// `git_override` to `remote` at `commit`.
///
/// The consumer's declared version is kept. Without a matching `bazel_dep`
/// the dependency and override are inserted after the `module(` block.
pub fn replace_with_git_override(
    content: &str,
    module: &str,
    remote: &str,
    commit: &str,
) -> Result<String> {
    let pattern = format!(
        r#"bazel_dep\(name = "{}", version = "([^"]+)"\)"#,
        regex::escape(module)
    );
    let re = Regex::new(&pattern).map_err(|e| DocsError::config(e.to_string()))?;

    let git_override = |version: &str| {
        format!(
            "bazel_dep(name = \"{module}\", version = \"{version}\")\n\
             git_override(\n    module_name = \"{module}\",\n    remote = \"{remote}\",\n    commit = \"{commit}\"\n)"
        )
    };

    if re.is_match(content) {
        return Ok(re
            .replace_all(content, |caps: &regex::Captures<'_>| git_override(&caps[1]))
            .into_owned());
    }

    debug!("No bazel_dep on {} found, inserting one", module);
    Ok(insert_dependency(
        content,
        &[git_override(PLACEHOLDER_VERSION)],
    ))
}

/// Write `content` to `<repo>/MODULE.bazel`.
pub fn write_manifest(repo: &Path, content: &str) -> Result<std::path::PathBuf> {
    let path = repo.join(MODULE_FILE_NAME);
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Read `<repo>/MODULE.bazel`.
pub fn read_manifest(repo: &Path) -> Result<String> {
    let path = repo.join(MODULE_FILE_NAME);
    if !path.exists() {
        return Err(DocsError::MissingFile { path });
    }
    Ok(std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = "score_docs_as_code";

    #[test]
    fn test_local_override_after_existing_dep() {
        let content = "module(name = \"consumer\")\nbazel_dep(name = \"score_docs_as_code\", version = \"1.2.0\")\nbazel_dep(name = \"rules_python\", version = \"1.0\")";
        let result = insert_local_path_override(content, MODULE, Path::new("/work/docs"));
        let lines: Vec<_> = result.lines().collect();
        assert_eq!(
            lines,
            vec![
                "module(name = \"consumer\")",
                "bazel_dep(name = \"score_docs_as_code\", version = \"1.2.0\")",
                "local_path_override(module_name = \"score_docs_as_code\", path = \"/work/docs\")",
                "bazel_dep(name = \"rules_python\", version = \"1.0\")",
            ]
        );
    }

    #[test]
    fn test_local_override_inserted_after_multiline_module_block() {
        let content = "module(\n    name = \"consumer\",\n    version = \"0.1\",\n)\n\nbazel_dep(name = \"rules_python\", version = \"1.0\")";
        let result = insert_local_path_override(content, MODULE, Path::new("/work/docs"));
        let lines: Vec<_> = result.lines().collect();
        assert_eq!(lines[3], ")");
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "bazel_dep(name = \"score_docs_as_code\", version = \"0.0.0\")");
        assert!(lines[6].starts_with("local_path_override(module_name = \"score_docs_as_code\""));
        assert_eq!(lines.last().copied(), Some("bazel_dep(name = \"rules_python\", version = \"1.0\")"));
    }

    #[test]
    fn test_local_override_appended_without_module_block() {
        let content = "bazel_dep(name = \"rules_python\", version = \"1.0\")";
        let result = insert_local_path_override(content, MODULE, Path::new("/p"));
        assert!(result.starts_with(content));
        assert!(result.trim_end().ends_with("path = \"/p\")"));
    }

    #[test]
    fn test_git_override_replaces_dep() {
        let content = "module(name = \"c\")\nbazel_dep(name = \"score_docs_as_code\", version = \"1.2.0\")\n";
        let result =
            replace_with_git_override(content, MODULE, "https://github.com/org/docs-as-code", "abc123")
                .unwrap();
        assert!(result.contains("bazel_dep(name = \"score_docs_as_code\", version = \"1.2.0\")\ngit_override("));
        assert!(result.contains("    remote = \"https://github.com/org/docs-as-code\",\n"));
        assert!(result.contains("    commit = \"abc123\"\n)"));
        assert_eq!(result.matches("bazel_dep").count(), 1);
    }

    #[test]
    fn test_git_override_inserted_when_dep_missing() {
        let content = "module(name = \"c\")\n";
        let result = replace_with_git_override(content, MODULE, "r", "c0ffee").unwrap();
        assert!(result.contains("version = \"0.0.0\")\ngit_override("));
        assert!(result.starts_with("module(name = \"c\")\n\nbazel_dep"));
    }

    #[test]
    fn test_read_manifest_missing() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            read_manifest(temp.path()).unwrap_err(),
            DocsError::MissingFile { .. }
        ));
    }
}
