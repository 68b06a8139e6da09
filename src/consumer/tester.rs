//! The clone / override / run loop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::build_output::{analyze_build_success, BuildOutput};
use super::manifest::{
    insert_local_path_override, read_manifest, replace_with_git_override, write_manifest,
    MODULE_FILE_NAME,
};
use super::{ConsumerConfig, OverrideMode, TestResult, DEFAULT_MODULE_NAME};
use crate::error::{DocsError, Result};
use crate::testing::{CommandOutcome, CommandRunner, GitOperations};

const WORK_DIR_PREFIX: &str = "consumer_tests_";
const CLONE_DEPTH: u32 = 1;

/// Commit on GitHub the `Git` override mode points consumers at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSource {
    pub remote: String,
    pub commit: String,
}

#[derive(Debug)]
enum WorkDir {
    /// Removed when the tester is dropped.
    Temp(TempDir),
    Fixed(PathBuf),
}

impl WorkDir {
    fn path(&self) -> &Path {
        match self {
            Self::Temp(dir) => dir.path(),
            Self::Fixed(path) => path,
        }
    }
}

/// Runs consumer documentation builds against the local docs-as-code.
pub struct ConsumerTester<G, R> {
    git: G,
    runner: R,
    docs_path: PathBuf,
    work_dir: WorkDir,
    module_name: String,
    git_source: Option<GitSource>,
    metamodel_changed: bool,
}

impl<G: GitOperations, R: CommandRunner> ConsumerTester<G, R> {
    /// Create a tester for the docs-as-code checkout at `docs_path`.
    ///
    /// Without `work_dir` a temporary directory is used and removed on drop.
    pub fn new(git: G, runner: R, docs_path: &Path, work_dir: Option<PathBuf>) -> Result<Self> {
        let docs_path = docs_path
            .canonicalize()
            .unwrap_or_else(|_| docs_path.to_path_buf());

        let work_dir = match work_dir {
            Some(path) => {
                std::fs::create_dir_all(&path)?;
                WorkDir::Fixed(path)
            }
            None => WorkDir::Temp(tempfile::Builder::new().prefix(WORK_DIR_PREFIX).tempdir()?),
        };
        debug!("Consumer work dir: {}", work_dir.path().display());

        Ok(Self {
            git,
            runner,
            docs_path,
            work_dir,
            module_name: DEFAULT_MODULE_NAME.to_string(),
            git_source: None,
            metamodel_changed: false,
        })
    }

    #[must_use]
    pub fn with_module_name(mut self, name: &str) -> Self {
        self.module_name = name.to_string();
        self
    }

    /// Also test every consumer with a `git_override` to `source`.
    #[must_use]
    pub fn with_git_source(mut self, source: GitSource) -> Self {
        self.git_source = Some(source);
        self
    }

    /// Ignore metamodel warnings because the metamodel itself changed.
    #[must_use]
    pub fn with_metamodel_changed(mut self, changed: bool) -> Self {
        self.metamodel_changed = changed;
        self
    }

    #[must_use]
    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    fn modes(&self) -> Vec<OverrideMode> {
        let mut modes = vec![OverrideMode::Local];
        if self.git_source.is_some() {
            modes.push(OverrideMode::Git);
        }
        modes
    }

    /// Fresh shallow clone of the consumer. Returns the repo path.
    pub fn clone_consumer(&self, consumer: &ConsumerConfig) -> Result<PathBuf> {
        let repo = self.work_dir().join(&consumer.name);
        if repo.exists() {
            std::fs::remove_dir_all(&repo)?;
        }
        self.git
            .clone_repo(&consumer.repo_url, &consumer.branch, &repo, CLONE_DEPTH)
            .map_err(|e| {
                DocsError::consumer(&consumer.name, format!("Failed to clone: {e}"))
            })?;
        Ok(repo)
    }

    fn override_content(&self, original: &str, mode: OverrideMode) -> Result<String> {
        match (mode, &self.git_source) {
            (OverrideMode::Git, Some(source)) => replace_with_git_override(
                original,
                &self.module_name,
                &source.remote,
                &source.commit,
            ),
            _ => Ok(insert_local_path_override(
                original,
                &self.module_name,
                &self.docs_path,
            )),
        }
    }

    /// Rewrite `MODULE.bazel` for `mode`, then format it when buildifier is
    /// installed.
    pub async fn override_manifest(
        &self,
        repo: &Path,
        original: &str,
        mode: OverrideMode,
    ) -> Result<()> {
        let content = self.override_content(original, mode)?;
        let path = write_manifest(repo, &content)?;

        if self.runner.tool_available("buildifier") {
            let args = vec![path.to_string_lossy().into_owned()];
            if let Err(e) = self
                .runner
                .run("buildifier", &args, repo, Duration::from_secs(60))
                .await
            {
                debug!("buildifier failed on {}: {}", MODULE_FILE_NAME, e);
            }
        }
        Ok(())
    }

    /// Run one docs target (or full command line) in `repo`.
    ///
    /// Returns `None` when the docs target does not exist in the consumer.
    pub async fn run_command(
        &self,
        repo: &Path,
        consumer: &ConsumerConfig,
        command: &str,
        mode: OverrideMode,
    ) -> Option<TestResult> {
        let timeout = Duration::from_secs(consumer.timeout);

        let (program, args): (String, Vec<String>) = if command.contains(' ') {
            let mut parts = command.split_whitespace().map(str::to_string);
            let program = parts.next().unwrap_or_default();
            (program, parts.collect())
        } else {
            let target = format!("//docs:{command}");
            let query = vec!["query".to_string(), target.clone()];
            match self.runner.run("bazel", &query, repo, timeout).await {
                Ok(CommandOutcome::Completed(out)) if out.succeeded() => {}
                Ok(_) => {
                    info!("{}: target {} not found, skipping", consumer.name, target);
                    return None;
                }
                Err(e) => {
                    return Some(TestResult::failed(
                        &consumer.name,
                        command,
                        mode,
                        format!("Unexpected error: {e}"),
                    ));
                }
            }
            ("bazel".to_string(), vec!["run".to_string(), target])
        };

        info!("{} [{}]: {} {}", consumer.name, mode, program, args.join(" "));
        let outcome = match self.runner.run(&program, &args, repo, timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return Some(TestResult::failed(
                    &consumer.name,
                    command,
                    mode,
                    format!("Unexpected error: {e}"),
                ));
            }
        };

        let output = match outcome {
            CommandOutcome::TimedOut => {
                return Some(TestResult::failed(
                    &consumer.name,
                    command,
                    mode,
                    format!("Command timed out after {} seconds", consumer.timeout),
                ));
            }
            CommandOutcome::Completed(output) => BuildOutput::from(output),
        };

        let error_message = if output.returncode != 0 {
            Some(format!("Command failed with exit code {}", output.returncode))
        } else {
            let (ok, reason) = analyze_build_success(&output, self.metamodel_changed);
            (!ok).then_some(reason)
        };

        Some(TestResult {
            consumer_name: consumer.name.clone(),
            command: command.to_string(),
            mode,
            success: error_message.is_none(),
            error_message,
            stdout: Some(output.stdout),
            stderr: Some(output.stderr),
            warnings: output.warnings,
        })
    }

    fn setup_failed(&self, consumer: &ConsumerConfig, modes: &[OverrideMode], error: &DocsError) -> Vec<TestResult> {
        warn!("Consumer setup failed for {}: {}", consumer.name, error);
        modes
            .iter()
            .flat_map(|mode| {
                consumer.all_commands().map(move |command| {
                    TestResult::failed(
                        &consumer.name,
                        command,
                        *mode,
                        format!("Consumer setup failed: {error}"),
                    )
                })
            })
            .collect()
    }

    /// Test one consumer in every override mode.
    pub async fn test_consumer(&self, consumer: &ConsumerConfig) -> Vec<TestResult> {
        let modes = self.modes();
        let (repo, original) = match self
            .clone_consumer(consumer)
            .and_then(|repo| read_manifest(&repo).map(|content| (repo, content)))
        {
            Ok(cloned) => cloned,
            Err(e) => return self.setup_failed(consumer, &modes, &e),
        };

        let mut results = Vec::new();
        for mode in modes {
            if let Err(e) = self.override_manifest(&repo, &original, mode).await {
                results.extend(self.setup_failed(consumer, &[mode], &e));
                continue;
            }
            for command in consumer.all_commands() {
                if let Some(result) = self.run_command(&repo, consumer, command, mode).await {
                    results.push(result);
                }
            }
        }
        results
    }

    /// Test every consumer in order.
    pub async fn test_all_consumers(&self, consumers: &[ConsumerConfig]) -> Vec<TestResult> {
        let mut results = Vec::new();
        for consumer in consumers {
            info!("Testing consumer: {}", consumer.name);
            results.extend(self.test_consumer(consumer).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CommandOutput, MockCommandRunner, MockGitOperations};

    const MANIFEST: &str = "module(name = \"consumer\")\nbazel_dep(name = \"score_docs_as_code\", version = \"1.0.0\")\n";

    fn consumer(commands: &[&str]) -> ConsumerConfig {
        ConsumerConfig::new("module_template", "https://github.com/org/module_template.git", commands)
    }

    fn git() -> MockGitOperations {
        MockGitOperations::new().with_clone_file(MODULE_FILE_NAME, MANIFEST)
    }

    fn tester(
        git: MockGitOperations,
        runner: MockCommandRunner,
    ) -> ConsumerTester<MockGitOperations, MockCommandRunner> {
        ConsumerTester::new(git, runner, Path::new("/work/docs-as-code"), None).unwrap()
    }

    // =========================================================================
    // Setup
    // =========================================================================

    #[test]
    fn test_temp_work_dir_removed_on_drop() {
        let t = tester(git(), MockCommandRunner::new());
        let path = t.work_dir().to_path_buf();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(WORK_DIR_PREFIX));
        drop(t);
        assert!(!path.exists());
    }

    #[test]
    fn test_fixed_work_dir_kept() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("work");
        let t = ConsumerTester::new(git(), MockCommandRunner::new(), temp.path(), Some(dir.clone()))
            .unwrap();
        drop(t);
        assert!(dir.exists());
    }

    #[test]
    fn test_clone_consumer_replaces_existing_dir() {
        let t = tester(git(), MockCommandRunner::new());
        let stale = t.work_dir().join("module_template");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("stale.txt"), "old").unwrap();

        let repo = t.clone_consumer(&consumer(&["docs"])).unwrap();
        assert_eq!(repo, stale);
        assert!(!repo.join("stale.txt").exists());
        assert!(repo.join(MODULE_FILE_NAME).exists());

        let clones = t.git.clones();
        assert_eq!(clones.len(), 1);
        assert_eq!(clones[0].1, "main");
    }

    // =========================================================================
    // test_consumer
    // =========================================================================

    #[tokio::test]
    async fn test_successful_run_writes_local_override() {
        let t = tester(git(), MockCommandRunner::new().without_tool("buildifier"));
        let results = t.test_consumer(&consumer(&["docs_incremental_latest"])).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].mode, OverrideMode::Local);
        assert_eq!(
            t.runner.calls(),
            vec![
                "bazel query //docs:docs_incremental_latest",
                "bazel run //docs:docs_incremental_latest",
            ]
        );

        let manifest =
            std::fs::read_to_string(t.work_dir().join("module_template").join(MODULE_FILE_NAME))
                .unwrap();
        assert!(manifest.contains("local_path_override(module_name = \"score_docs_as_code\""));
    }

    #[tokio::test]
    async fn test_missing_target_skipped() {
        let runner = MockCommandRunner::new().with_failure("query //docs:docs_missing", 7, "no such target");
        let t = tester(git(), runner);
        let results = t
            .test_consumer(&consumer(&["docs_missing", "docs_incremental_latest"]))
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].command, "docs_incremental_latest");
    }

    #[tokio::test]
    async fn test_failure_timeout_and_warnings() {
        let runner = MockCommandRunner::new()
            .with_failure("run //docs:broken", 1, "ERROR: boom")
            .with_timeout("run //docs:slow")
            .with_output(
                "run //docs:warned",
                CommandOutput::failure(0, "x.rst:1: WARNING: bad link [score_metamodel]"),
            );
        let t = tester(git(), runner);
        let mut c = consumer(&["broken", "slow", "warned"]);
        c.timeout = 42;
        let results = t.test_consumer(&c).await;

        let messages: Vec<_> = results
            .iter()
            .map(|r| r.error_message.clone().unwrap_or_default())
            .collect();
        assert_eq!(
            messages,
            vec![
                "Command failed with exit code 1",
                "Command timed out after 42 seconds",
                "Found 1 critical warnings",
            ]
        );
        assert!(results.iter().all(|r| !r.success));
        assert_eq!(results[0].stderr.as_deref(), Some("ERROR: boom"));
    }

    #[tokio::test]
    async fn test_metamodel_change_ignores_metamodel_warnings() {
        let runner = MockCommandRunner::new().with_output(
            "run //docs:warned",
            CommandOutput::failure(0, "x.rst:1: WARNING: bad link [score_metamodel]"),
        );
        let t = tester(git(), runner).with_metamodel_changed(true);
        let results = t.test_consumer(&consumer(&["warned"])).await;
        assert!(results[0].success);
        assert_eq!(results[0].warnings["[SCORE_METAMODEL]"], vec!["x.rst:1: WARNING: bad link"]);
    }

    #[tokio::test]
    async fn test_full_command_line_runs_directly() {
        let t = tester(git(), MockCommandRunner::new());
        let mut c = consumer(&[]);
        c.test_commands.push("bazel test //src/...".into());
        let results = t.test_consumer(&c).await;

        assert_eq!(results.len(), 1);
        assert!(t.runner.calls().contains(&"bazel test //src/...".to_string()));
        assert!(!t.runner.calls().iter().any(|c| c.contains("query")));
    }

    #[tokio::test]
    async fn test_clone_failure_fails_every_command() {
        let git = MockGitOperations::new().with_clone_error("Authentication failed");
        let t = tester(git, MockCommandRunner::new());
        let results = t.test_consumer(&consumer(&["a", "b"])).await;

        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(!result.success);
            let message = result.error_message.as_deref().unwrap();
            assert!(message.starts_with("Consumer setup failed: "));
            assert!(message.contains("Authentication failed"));
        }
        assert!(t.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_manifest_is_setup_failure() {
        let t = tester(MockGitOperations::new(), MockCommandRunner::new());
        let results = t.test_consumer(&consumer(&["a"])).await;
        assert_eq!(results.len(), 1);
        assert!(results[0]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Consumer setup failed: "));
    }

    #[tokio::test]
    async fn test_git_mode_runs_after_local() {
        let t = tester(git(), MockCommandRunner::new().without_tool("buildifier")).with_git_source(
            GitSource {
                remote: "https://github.com/org/docs-as-code.git".into(),
                commit: "abc123".into(),
            },
        );
        let results = t.test_consumer(&consumer(&["docs"])).await;

        let modes: Vec<_> = results.iter().map(|r| r.mode).collect();
        assert_eq!(modes, vec![OverrideMode::Local, OverrideMode::Git]);

        let manifest =
            std::fs::read_to_string(t.work_dir().join("module_template").join(MODULE_FILE_NAME))
                .unwrap();
        assert!(manifest.contains("git_override("));
        assert!(!manifest.contains("local_path_override"));
    }

    #[tokio::test]
    async fn test_git_mode_failure_reported_with_mode() {
        let runner = MockCommandRunner::new()
            .without_tool("buildifier")
            .with_output_after("run //docs:docs", 1, CommandOutput::failure(1, "ERROR: fetch"));
        let t = tester(git(), runner).with_git_source(GitSource {
            remote: "https://github.com/org/docs-as-code.git".into(),
            commit: "abc123".into(),
        });
        let results = t.test_consumer(&consumer(&["docs"])).await;

        assert!(results[0].success);
        assert!(!results[1].success);

        let report = crate::consumer::generate_report(&results);
        assert_eq!(report.failed_tests.len(), 1);
        assert_eq!(report.failed_tests[0].mode, OverrideMode::Git);
    }

    #[tokio::test]
    async fn test_buildifier_run_when_available() {
        let t = tester(git(), MockCommandRunner::new());
        t.test_consumer(&consumer(&["docs"])).await;
        assert!(t.runner.calls()[0].starts_with("buildifier "));
    }

    #[tokio::test]
    async fn test_all_consumers() {
        let t = tester(git(), MockCommandRunner::new());
        let mut other = consumer(&["docs"]);
        other.name = "platform".into();
        let results = t.test_all_consumers(&[consumer(&["docs"]), other]).await;
        let names: Vec<_> = results.iter().map(|r| r.consumer_name.as_str()).collect();
        assert_eq!(names, vec!["module_template", "platform"]);
    }
}
