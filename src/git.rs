//! Git remote and revision helpers.
//!
//! Used to turn `file:line` locations into GitHub permalinks of the form
//! `https://github.com/<owner>/<repo>/blob/<hash>/<file>#L<line>`.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context};
use tracing::{debug, warn};

use crate::error::{DocsError, IntoDocsError, Result};
use crate::testing::GitOperations;

/// Real git operations implementation.
///
/// Executes actual git commands in `repo_dir`.
#[derive(Debug, Clone)]
pub struct RealGit {
    repo_dir: PathBuf,
}

impl RealGit {
    /// Create a git operations instance for the given directory.
    #[must_use]
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    #[must_use]
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn git(&self, args: &[&str]) -> anyhow::Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", args.join(" "), stderr.trim())
        }
    }
}

impl GitOperations for RealGit {
    fn remote_lines(&self) -> anyhow::Result<Vec<String>> {
        let stdout = self.git(&["remote", "-v"])?;
        Ok(stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    fn head_hash(&self) -> anyhow::Result<String> {
        self.git(&["log", "-n", "1", "--pretty=format:%H"])
    }

    fn changed_files(&self, base: &str) -> anyhow::Result<Vec<String>> {
        let stdout = self.git(&["diff", "--name-only", base, "HEAD"])?;
        Ok(stdout.lines().map(str::to_string).collect())
    }

    fn fetch(&self, remote: &str, branch: &str) -> anyhow::Result<()> {
        self.git(&["fetch", remote, branch]).map(|_| ())
    }

    fn rev_parse(&self, rev: &str) -> anyhow::Result<String> {
        self.git(&["rev-parse", rev])
    }

    fn clone_repo(&self, url: &str, branch: &str, dest: &Path, depth: u32) -> anyhow::Result<()> {
        let depth = depth.to_string();
        let output = Command::new("git")
            .args(["clone", "--depth", &depth, "-b", branch, url])
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .context("Failed to run git clone")?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Clone of {} failed: {}", url, stderr.trim())
        }
    }
}

/// Extract `owner/repo` from one line of `git remote -v`.
///
/// Handles SSH (`git@github.com:owner/repo.git`) and HTTPS
/// (`https://github.com/owner/repo.git`) URLs. Returns an empty string when
/// the line cannot be interpreted.
#[must_use]
pub fn parse_git_output(line: &str) -> String {
    let mut parts = line.split_whitespace();
    let Some(url) = parts.nth(1) else {
        if !line.trim().is_empty() {
            warn!("Got wrong input line from 'git remote -v'. Input: {}", line);
        }
        return String::new();
    };

    let path = if let Some(rest) = url.strip_prefix("git@") {
        rest.split_once(':').map(|(_, path)| path)
    } else if let Some((_, rest)) = url.split_once("://") {
        rest.split_once('/').map(|(_, path)| path)
    } else {
        None
    };

    match path {
        Some(path) => {
            let repo = path.trim_end_matches('/');
            let repo = repo.strip_suffix(".git").unwrap_or(repo);
            if repo.contains('/') {
                repo.to_string()
            } else {
                String::new()
            }
        }
        None => String::new(),
    }
}

/// `owner/repo` of the repository, preferring the `origin` remote.
pub fn github_repo_info<G: GitOperations + ?Sized>(git: &G) -> Result<String> {
    let lines = git.remote_lines().into_docs_git("remote")?;

    let origin = lines
        .iter()
        .find(|line| line.split_whitespace().next() == Some("origin"))
        .map(|line| parse_git_output(line))
        .filter(|repo| !repo.is_empty());

    let repo = origin.or_else(|| {
        lines
            .iter()
            .map(|line| parse_git_output(line))
            .find(|repo| !repo.is_empty())
    });

    match repo {
        Some(repo) => {
            debug!("Resolved GitHub repository {}", repo);
            Ok(repo)
        }
        None => Err(DocsError::git(
            "remote",
            "Could not determine GitHub repository from git remotes",
        )),
    }
}

/// Full 40 character hash of `HEAD`.
pub fn current_git_hash<G: GitOperations + ?Sized>(git: &G) -> Result<String> {
    let hash = git.head_hash().into_docs_git("log")?;
    if hash.len() != 40 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DocsError::git(
            "log",
            format!("Unexpected commit hash '{hash}'"),
        ));
    }
    Ok(hash)
}

/// `https://github.com/<owner>/<repo>` of the repository.
pub fn github_base_url<G: GitOperations + ?Sized>(git: &G) -> Result<String> {
    Ok(format!("https://github.com/{}", github_repo_info(git)?))
}

/// First directory at or above `start` containing `.git`.
#[must_use]
pub fn find_git_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Permalink to a line of a file at a given commit.
#[must_use]
pub fn github_link(base_url: &str, hash: &str, file: &Path, line: impl Display) -> String {
    format!(
        "{}/blob/{}/{}#L{}",
        base_url.trim_end_matches('/'),
        hash,
        file.to_string_lossy().replace('\\', "/"),
        line
    )
}
