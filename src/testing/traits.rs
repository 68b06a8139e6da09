//! Trait definitions for testable abstractions.
//!
//! These traits abstract the subprocess boundaries (`git`, `bazel`,
//! `buildifier`) so linker and consumer logic can be unit tested without
//! real repositories or build tools.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Abstraction for git operations.
///
/// # Example
///
/// ```rust,ignore
/// use docs_as_code::testing::GitOperations;
///
/// fn touches_metamodel(git: &impl GitOperations, base: &str) -> bool {
///     git.changed_files(base)
///         .map(|files| files.iter().any(|f| f.ends_with("metamodel.yaml")))
///         .unwrap_or(false)
/// }
/// ```
pub trait GitOperations {
    /// Lines of `git remote -v`.
    ///
    /// # Errors
    ///
    /// Returns an error if git is not available or not in a repository.
    fn remote_lines(&self) -> Result<Vec<String>>;

    /// Full hash of `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns an error outside a repository or when there are no commits.
    fn head_hash(&self) -> Result<String>;

    /// Files changed between `base` and `HEAD`.
    fn changed_files(&self, base: &str) -> Result<Vec<String>>;

    /// Fetch a branch from a remote.
    fn fetch(&self, remote: &str, branch: &str) -> Result<()>;

    /// Resolve a revision to a commit hash.
    fn rev_parse(&self, rev: &str) -> Result<String>;

    /// Shallow clone `branch` of `url` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the clone fails (auth, network, unknown branch).
    fn clone_repo(&self, url: &str, branch: &str, dest: &Path, depth: u32) -> Result<()>;
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `-1` when the process was killed by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    #[must_use]
    pub fn success(stdout: &str) -> Self {
        Self {
            status: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    #[must_use]
    pub fn failure(status: i32, stderr: &str) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == 0
    }
}

/// How a subprocess run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed(CommandOutput),
    TimedOut,
}

/// Abstraction for running external build tools.
///
/// This trait is async so that commands can be bounded by a timeout without
/// blocking the runtime.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program args...` in `cwd`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<CommandOutcome>;

    /// Whether `tool` can be found on `PATH`.
    fn tool_available(&self, tool: &str) -> bool;
}
