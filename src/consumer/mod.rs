//! Downstream consumer regression harness.
//!
//! Clones the repositories that depend on docs-as-code, points their
//! `MODULE.bazel` at the local checkout (or at the current commit on
//! GitHub), runs their documentation targets and reports what broke.
//!
//! # Architecture
//!
//! - [`manifest`] - `MODULE.bazel` rewriting
//! - [`build_output`] - warning extraction and pass/fail rules
//! - [`runner`] - real subprocess runner with timeouts
//! - [`tester`] - the clone / override / run loop
//! - [`report`] - summaries, console rendering, log replay

pub mod build_output;
pub mod manifest;
pub mod report;
pub mod runner;
pub mod tester;

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use build_output::{analyze_build_success, detect_metamodel_change, parse_build_output, BuildOutput};
pub use manifest::{insert_local_path_override, replace_with_git_override};
pub use report::{
    generate_report, print_report, render_report, replay_log, ConsumerReport, ReportStyle,
};
pub use runner::ProcessRunner;
pub use tester::{ConsumerTester, GitSource};

/// Bazel module name of docs-as-code.
pub const DEFAULT_MODULE_NAME: &str = "score_docs_as_code";

/// Default per-command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

fn default_branch() -> String {
    "main".to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// A repository depending on docs-as-code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub name: String,
    pub repo_url: String,
    /// Docs targets (`docs_incremental_latest` runs `bazel run //docs:docs_incremental_latest`)
    /// or full command lines (`bazel build //docs:docs`).
    pub commands: Vec<String>,
    #[serde(default)]
    pub test_commands: Vec<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Per-command timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl ConsumerConfig {
    #[must_use]
    pub fn new(name: &str, repo_url: &str, commands: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            repo_url: repo_url.to_string(),
            commands: commands.iter().map(|c| (*c).to_string()).collect(),
            test_commands: Vec::new(),
            branch: default_branch(),
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Commands followed by test commands.
    pub fn all_commands(&self) -> impl Iterator<Item = &String> {
        self.commands.iter().chain(&self.test_commands)
    }
}

const DOCS_COMMANDS: &[&str] = &[
    "docs_incremental_latest",
    "docs_incremental_release",
    "docs_live_preview_latest",
    "docs_live_preview_release",
    "docs_docs_latest",
    "docs_docs_release",
];

/// The known downstream consumers.
#[must_use]
pub fn default_consumers() -> Vec<ConsumerConfig> {
    vec![
        ConsumerConfig::new(
            "platform",
            "https://github.com/eclipse-score/score.git",
            DOCS_COMMANDS,
        ),
        ConsumerConfig::new(
            "process_description",
            "https://github.com/eclipse-score/process_description.git",
            DOCS_COMMANDS,
        ),
        ConsumerConfig::new(
            "module_template",
            "https://github.com/eclipse-score/module_template.git",
            DOCS_COMMANDS,
        ),
    ]
}

/// How the consumer's dependency on docs-as-code is redirected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideMode {
    /// `local_path_override` to the local checkout.
    Local,
    /// `git_override` to the current commit of the local checkout.
    Git,
}

impl fmt::Display for OverrideMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Git => f.write_str("git"),
        }
    }
}

/// Outcome of one command in one consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub consumer_name: String,
    pub command: String,
    pub mode: OverrideMode,
    pub success: bool,
    pub error_message: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    /// Build warnings grouped by logger.
    #[serde(default)]
    pub warnings: IndexMap<String, Vec<String>>,
}

impl TestResult {
    /// Failed result without captured output.
    #[must_use]
    pub fn failed(consumer: &str, command: &str, mode: OverrideMode, error: String) -> Self {
        Self {
            consumer_name: consumer.to_string(),
            command: command.to_string(),
            mode,
            success: false,
            error_message: Some(error),
            stdout: None,
            stderr: None,
            warnings: IndexMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_consumers() {
        let consumers = default_consumers();
        let names: Vec<_> = consumers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["platform", "process_description", "module_template"]);
        for consumer in &consumers {
            assert_eq!(consumer.branch, "main");
            assert_eq!(consumer.timeout, 300);
            assert_eq!(consumer.commands.len(), 6);
            assert!(consumer.repo_url.starts_with("https://github.com/eclipse-score/"));
        }
    }

    #[test]
    fn test_consumer_config_defaults_from_toml() {
        let consumer: ConsumerConfig = toml::from_str(
            r#"
name = "my_module"
repo_url = "https://github.com/org/my_module.git"
commands = ["docs_incremental_latest"]
"#,
        )
        .unwrap();
        assert_eq!(consumer.branch, "main");
        assert_eq!(consumer.timeout, DEFAULT_TIMEOUT_SECS);
        assert!(consumer.test_commands.is_empty());
    }

    #[test]
    fn test_all_commands_order() {
        let mut consumer = ConsumerConfig::new("x", "u", &["a", "b"]);
        consumer.test_commands.push("bazel test //tests/...".into());
        let all: Vec<_> = consumer.all_commands().map(String::as_str).collect();
        assert_eq!(all, vec!["a", "b", "bazel test //tests/..."]);
    }

    #[test]
    fn test_override_mode_display() {
        assert_eq!(OverrideMode::Local.to_string(), "local");
        assert_eq!(OverrideMode::Git.to_string(), "git");
    }
}
