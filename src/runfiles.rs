//! Locating the build runfiles directory.
//!
//! Under `bazel run` the runfiles live in the global output cache, whose path
//! changes between invocations. The `bazel-out` symlink in the workspace
//! points into that cache, so absolute paths are rewritten through it.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DocsError, Result};
use crate::git::find_git_root;

/// Environment variable set by bazel for binaries with runfiles.
pub const RUNFILES_ENV: &str = "RUNFILES_DIR";

const BAZEL_OUT_SEGMENT: &str = "/bazel-out/";

/// Runfiles directory for a docs build.
///
/// `conf_dir` is only used for diagnostics.
pub fn runfiles_dir(
    conf_dir: &Path,
    env_runfiles: Option<&Path>,
    git_root: &Path,
) -> Result<PathBuf> {
    debug!(
        "Resolving runfiles: conf_dir={}, env_runfiles={:?}, git_root={}",
        conf_dir.display(),
        env_runfiles,
        git_root.display()
    );

    let Some(env_runfiles) = env_runfiles else {
        debug!("Running outside bazel, using the IDE support runfiles");
        return Ok(git_root
            .join("bazel-bin")
            .join("process-docs")
            .join("ide_support.runfiles"));
    };

    if !env_runfiles.is_absolute() {
        return Ok(git_root.join(env_runfiles));
    }

    let text = env_runfiles.to_string_lossy();
    let parts: Vec<&str> = text.split(BAZEL_OUT_SEGMENT).collect();
    if parts.len() != 2 {
        return Err(DocsError::runfiles(format!(
            "Could not find bazel-out in runfiles path: {}",
            env_runfiles.display()
        )));
    }
    let dir = git_root.join("bazel-out").join(parts[1]);
    debug!("Made runfiles dir pretty: {}", dir.display());
    Ok(dir)
}

/// Resolve the runfiles directory for `conf_dir` from the environment and
/// require it to exist.
pub fn resolve_runfiles_dir(conf_dir: &Path) -> Result<PathBuf> {
    let git_root = find_git_root(conf_dir).ok_or_else(|| {
        DocsError::runfiles(format!(
            "Could not find git root above {}. Run from inside the repository.",
            conf_dir.display()
        ))
    })?;
    let env_runfiles = std::env::var_os(RUNFILES_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    let dir = runfiles_dir(conf_dir, env_runfiles.as_deref(), &git_root)?;
    if !dir.exists() {
        return Err(DocsError::runfiles(format!(
            "Could not find runfiles at {}. Build the docs with bazel first.",
            dir.display()
        )));
    }
    Ok(dir)
}
