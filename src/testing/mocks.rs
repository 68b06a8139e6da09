//! Mock implementations of testing traits.
//!
//! These mocks provide controllable test doubles for external dependencies,
//! enabling deterministic unit tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::traits::{CommandOutcome, CommandOutput, CommandRunner, GitOperations};

/// Mock implementation of git operations.
///
/// # Example
///
/// ```rust,ignore
/// let git = MockGitOperations::new()
///     .with_remote("origin", "git@github.com:owner/repo.git")
///     .with_head_hash("0123456789abcdef0123456789abcdef01234567");
///
/// assert_eq!(git.remote_lines().unwrap().len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct MockGitOperations {
    remotes: Vec<String>,
    head_hash: Option<String>,
    rev_parse: Option<String>,
    changed_files: Vec<String>,
    fetch_error: Option<String>,
    clone_error: Option<String>,
    clone_files: Vec<(String, String)>,
    clones: Mutex<Vec<(String, String, PathBuf)>>,
}

impl MockGitOperations {
    /// Create a new mock with no remotes and no commits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a remote, producing the fetch and push lines of `git remote -v`.
    #[must_use]
    pub fn with_remote(mut self, name: &str, url: &str) -> Self {
        self.remotes.push(format!("{name}\t{url} (fetch)"));
        self.remotes.push(format!("{name}\t{url} (push)"));
        self
    }

    /// Set the hash returned for `HEAD`.
    #[must_use]
    pub fn with_head_hash(mut self, hash: &str) -> Self {
        self.head_hash = Some(hash.to_string());
        self
    }

    /// Set the hash returned by `rev_parse`.
    #[must_use]
    pub fn with_rev_parse(mut self, hash: &str) -> Self {
        self.rev_parse = Some(hash.to_string());
        self
    }

    /// Set the files reported as changed.
    #[must_use]
    pub fn with_changed_files(mut self, files: &[&str]) -> Self {
        self.changed_files = files.iter().map(|f| (*f).to_string()).collect();
        self
    }

    /// Configure fetch to fail with an error.
    #[must_use]
    pub fn with_fetch_error(mut self, error: &str) -> Self {
        self.fetch_error = Some(error.to_string());
        self
    }

    /// Configure clone to fail with an error.
    #[must_use]
    pub fn with_clone_error(mut self, error: &str) -> Self {
        self.clone_error = Some(error.to_string());
        self
    }

    /// Write `content` to `relative` inside every cloned directory.
    #[must_use]
    pub fn with_clone_file(mut self, relative: &str, content: &str) -> Self {
        self.clone_files
            .push((relative.to_string(), content.to_string()));
        self
    }

    /// `(url, branch, dest)` of every clone performed so far.
    pub fn clones(&self) -> Vec<(String, String, PathBuf)> {
        self.clones.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl GitOperations for MockGitOperations {
    fn remote_lines(&self) -> Result<Vec<String>> {
        Ok(self.remotes.clone())
    }

    fn head_hash(&self) -> Result<String> {
        match &self.head_hash {
            Some(hash) => Ok(hash.clone()),
            None => bail!("fatal: ambiguous argument 'HEAD': unknown revision"),
        }
    }

    fn changed_files(&self, _base: &str) -> Result<Vec<String>> {
        Ok(self.changed_files.clone())
    }

    fn fetch(&self, _remote: &str, _branch: &str) -> Result<()> {
        match &self.fetch_error {
            Some(error) => bail!("{}", error),
            None => Ok(()),
        }
    }

    fn rev_parse(&self, rev: &str) -> Result<String> {
        match &self.rev_parse {
            Some(hash) => Ok(hash.clone()),
            None => bail!("fatal: bad revision '{}'", rev),
        }
    }

    fn clone_repo(&self, url: &str, branch: &str, dest: &Path, _depth: u32) -> Result<()> {
        if let Ok(mut clones) = self.clones.lock() {
            clones.push((url.to_string(), branch.to_string(), dest.to_path_buf()));
        }
        if let Some(error) = &self.clone_error {
            bail!("{}", error);
        }
        std::fs::create_dir_all(dest)?;
        for (relative, content) in &self.clone_files {
            std::fs::write(dest.join(relative), content)?;
        }
        Ok(())
    }
}

/// Mock implementation of the build tool runner.
///
/// Responses are matched by substring against the joined command line; the
/// first matching rule wins and unmatched commands succeed with empty output.
/// A rule added with [`MockCommandRunner::with_output_after`] only matches
/// once its pattern has been seen in earlier calls.
///
/// # Example
///
/// ```rust,ignore
/// let runner = MockCommandRunner::new()
///     .with_failure("//docs:incremental", 1, "ERROR: build failed")
///     .with_timeout("//docs:live_preview");
/// ```
#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    after: usize,
    outcome: CommandOutcome,
}

#[derive(Debug, Default)]
pub struct MockCommandRunner {
    rules: Vec<Rule>,
    spawn_errors: Vec<String>,
    missing_tools: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockCommandRunner {
    /// Create a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `output` for commands containing `pattern`.
    #[must_use]
    pub fn with_output(self, pattern: &str, output: CommandOutput) -> Self {
        self.with_output_after(pattern, 0, output)
    }

    /// Return `output` for commands containing `pattern` once `after` earlier
    /// calls have matched it.
    #[must_use]
    pub fn with_output_after(mut self, pattern: &str, after: usize, output: CommandOutput) -> Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            after,
            outcome: CommandOutcome::Completed(output),
        });
        self
    }

    /// Fail commands containing `pattern` with the given exit code.
    #[must_use]
    pub fn with_failure(self, pattern: &str, status: i32, stderr: &str) -> Self {
        self.with_output(pattern, CommandOutput::failure(status, stderr))
    }

    /// Time out commands containing `pattern`.
    #[must_use]
    pub fn with_timeout(mut self, pattern: &str) -> Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            after: 0,
            outcome: CommandOutcome::TimedOut,
        });
        self
    }

    /// Fail to spawn commands containing `pattern`.
    #[must_use]
    pub fn with_spawn_error(mut self, pattern: &str) -> Self {
        self.spawn_errors.push(pattern.to_string());
        self
    }

    /// Report `tool` as not installed.
    #[must_use]
    pub fn without_tool(mut self, tool: &str) -> Self {
        self.missing_tools.insert(tool.to_string());
        self
    }

    /// Command lines run so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _cwd: &Path,
        _timeout: Duration,
    ) -> Result<CommandOutcome> {
        let line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        let earlier = match self.calls.lock() {
            Ok(mut calls) => {
                let earlier = calls.clone();
                calls.push(line.clone());
                earlier
            }
            Err(_) => Vec::new(),
        };

        if self.spawn_errors.iter().any(|p| line.contains(p.as_str())) {
            bail!("No such file or directory: {}", program);
        }

        let outcome = self
            .rules
            .iter()
            .find(|rule| {
                line.contains(rule.pattern.as_str())
                    && earlier
                        .iter()
                        .filter(|c| c.contains(rule.pattern.as_str()))
                        .count()
                        >= rule.after
            })
            .map(|rule| rule.outcome.clone())
            .unwrap_or_else(|| CommandOutcome::Completed(CommandOutput::success("")));
        Ok(outcome)
    }

    fn tool_available(&self, tool: &str) -> bool {
        !self.missing_tools.contains(tool)
    }
}
