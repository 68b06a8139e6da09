//! Warning extraction from build tool output.

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::testing::{CommandOutput, GitOperations};

/// Logger assigned to warnings without a trailing `[logger]` token.
pub const NO_SPECIFIC_LOGGER: &str = "[NO SPECIFIC LOGGER]";

/// Logger of the metamodel checks.
pub const METAMODEL_LOGGER: &str = "[SCORE_METAMODEL]";

const METAMODEL_FILE: &str = "metamodel.yaml";

/// Captured build result with its warnings grouped by logger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
    pub warnings: IndexMap<String, Vec<String>>,
}

impl From<CommandOutput> for BuildOutput {
    fn from(output: CommandOutput) -> Self {
        parse_build_output(output.status, output.stdout, output.stderr)
    }
}

impl BuildOutput {
    /// Total number of warnings across loggers.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings.values().map(Vec::len).sum()
    }
}

fn split_logger(line: &str) -> (String, String) {
    if line.ends_with(']') {
        if let Some((text, token)) = line.trim_end().rsplit_once(char::is_whitespace) {
            return (token.to_uppercase(), text.trim_end().to_string());
        }
    }
    (NO_SPECIFIC_LOGGER.to_string(), line.to_string())
}

/// Group the `WARNING: ` lines of stderr by logger.
///
/// Sphinx and bazel both report on stderr, so stdout is not inspected.
#[must_use]
pub fn parse_build_output(returncode: i32, stdout: String, stderr: String) -> BuildOutput {
    let mut warnings: IndexMap<String, Vec<String>> = IndexMap::new();
    for line in stderr.lines().filter(|l| l.contains("WARNING: ")) {
        let (logger, text) = split_logger(line);
        warnings.entry(logger).or_default().push(text);
    }
    BuildOutput {
        returncode,
        stdout,
        stderr,
        warnings,
    }
}

/// Decide whether a build counts as passed.
///
/// Non-zero exit fails. Warnings without a specific logger never count.
/// Metamodel warnings count unless the metamodel itself changed. Every other
/// logger's warnings fail the build.
#[must_use]
pub fn analyze_build_success(output: &BuildOutput, metamodel_changed: bool) -> (bool, String) {
    if output.returncode != 0 {
        return (
            false,
            format!("Build failed with return code {}", output.returncode),
        );
    }

    let critical: usize = output
        .warnings
        .iter()
        .filter(|(logger, _)| match logger.as_str() {
            NO_SPECIFIC_LOGGER => false,
            METAMODEL_LOGGER => !metamodel_changed,
            _ => true,
        })
        .map(|(_, w)| w.len())
        .sum();

    if critical > 0 {
        return (false, format!("Found {critical} critical warnings"));
    }
    (true, "Build successful - no critical warnings".to_string())
}

/// Whether `metamodel.yaml` differs between `origin/main` and `HEAD`.
///
/// Any git failure is treated as "unchanged".
pub fn detect_metamodel_change<G: GitOperations + ?Sized>(git: &G) -> bool {
    if let Err(e) = git.fetch("origin", "main") {
        warn!("Could not fetch origin/main: {}", e);
        return false;
    }
    let base = match git.rev_parse("origin/main") {
        Ok(hash) => hash,
        Err(e) => {
            warn!("Could not resolve origin/main: {}", e);
            return false;
        }
    };
    match git.changed_files(&base) {
        Ok(files) => {
            let changed = files.iter().any(|f| f.contains(METAMODEL_FILE));
            debug!("Metamodel changed since {}: {}", base, changed);
            changed
        }
        Err(e) => {
            warn!("Could not diff against {}: {}", base, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGitOperations;

    const STDERR: &str = "\
INFO: Analyzed target //docs:docs_incremental_latest
/docs/index.rst:12: WARNING: need 'std_req__x' has unknown link 'foo' [score_metamodel]
/docs/index.rst:20: WARNING: undefined label: 'missing'
/docs/other.rst:3: WARNING: duplicate need id [needs]
/docs/more.rst:4: WARNING: bad option value [score_metamodel]
INFO: Build completed successfully";

    fn output(code: i32) -> BuildOutput {
        parse_build_output(code, String::new(), STDERR.to_string())
    }

    // =========================================================================
    // parse_build_output
    // =========================================================================

    #[test]
    fn test_warnings_grouped_by_logger() {
        let out = output(0);
        let loggers: Vec<_> = out.warnings.keys().map(String::as_str).collect();
        assert_eq!(loggers, vec!["[SCORE_METAMODEL]", NO_SPECIFIC_LOGGER, "[NEEDS]"]);
        assert_eq!(out.warnings["[SCORE_METAMODEL]"].len(), 2);
        assert_eq!(out.warning_count(), 4);
        assert_eq!(
            out.warnings["[SCORE_METAMODEL]"][0],
            "/docs/index.rst:12: WARNING: need 'std_req__x' has unknown link 'foo'"
        );
        assert_eq!(
            out.warnings[NO_SPECIFIC_LOGGER][0],
            "/docs/index.rst:20: WARNING: undefined label: 'missing'"
        );
    }

    #[test]
    fn test_no_warnings() {
        let out = parse_build_output(0, "WARNING: on stdout [x]".into(), "INFO: ok".into());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_from_command_output() {
        let out: BuildOutput = CommandOutput::failure(2, STDERR).into();
        assert_eq!(out.returncode, 2);
        assert_eq!(out.warning_count(), 4);
    }

    // =========================================================================
    // analyze_build_success
    // =========================================================================

    #[test]
    fn test_non_zero_exit_fails() {
        let (ok, reason) = analyze_build_success(&output(1), true);
        assert!(!ok);
        assert_eq!(reason, "Build failed with return code 1");
    }

    #[test]
    fn test_other_logger_warnings_are_critical() {
        let (ok, reason) = analyze_build_success(&output(0), true);
        assert!(!ok);
        assert_eq!(reason, "Found 1 critical warnings");

        let (ok, reason) = analyze_build_success(&output(0), false);
        assert!(!ok);
        assert_eq!(reason, "Found 3 critical warnings");
    }

    #[test]
    fn test_unspecific_and_changed_metamodel_warnings_ignored() {
        let stderr = "\
a.rst:1: WARNING: something
b.rst:2: WARNING: metamodel thing [score_metamodel]";
        let out = parse_build_output(0, String::new(), stderr.into());

        let (ok, reason) = analyze_build_success(&out, true);
        assert!(ok);
        assert_eq!(reason, "Build successful - no critical warnings");

        let (ok, _) = analyze_build_success(&out, false);
        assert!(!ok);
    }

    // =========================================================================
    // detect_metamodel_change
    // =========================================================================

    #[test]
    fn test_detect_metamodel_change() {
        let git = MockGitOperations::new()
            .with_rev_parse("abc")
            .with_changed_files(&["src/extensions/score_metamodel/metamodel.yaml", "README.md"]);
        assert!(detect_metamodel_change(&git));

        let git = MockGitOperations::new()
            .with_rev_parse("abc")
            .with_changed_files(&["README.md"]);
        assert!(!detect_metamodel_change(&git));
    }

    #[test]
    fn test_detect_metamodel_change_fetch_error_is_unchanged() {
        let git = MockGitOperations::new()
            .with_changed_files(&["metamodel.yaml"])
            .with_fetch_error("no network");
        assert!(!detect_metamodel_change(&git));
    }
}
