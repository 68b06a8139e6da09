//! Consumer run summaries.

use std::fmt;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use colored::Colorize;
use indexmap::IndexMap;
use serde::Serialize;

use super::build_output::{METAMODEL_LOGGER, NO_SPECIFIC_LOGGER};
use super::{OverrideMode, TestResult};
use crate::error::{DocsError, Result};

/// Log replayed when no path is given.
pub const DEFAULT_LOG_FILE: &str = "consumer_tests.txt";

const STDERR_TAIL_LINES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    /// Fraction of passed tests, `0.0` without tests.
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandError {
    pub command: String,
    pub mode: OverrideMode,
    pub error: Option<String>,
    pub stderr: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerSummary {
    pub passed: usize,
    pub failed: usize,
    pub errors: Vec<CommandError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTest {
    pub consumer: String,
    pub command: String,
    pub mode: OverrideMode,
    pub error: Option<String>,
    pub stderr: Option<String>,
}

/// Aggregated results of a consumer run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumerReport {
    pub generated_at: DateTime<Utc>,
    pub summary: Summary,
    pub by_consumer: IndexMap<String, ConsumerSummary>,
    pub failed_tests: Vec<FailedTest>,
}

impl ConsumerReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.summary.failed == 0
    }
}

#[must_use]
pub fn generate_report(results: &[TestResult]) -> ConsumerReport {
    let mut by_consumer: IndexMap<String, ConsumerSummary> = IndexMap::new();
    let mut failed_tests = Vec::new();

    for result in results {
        let entry = by_consumer.entry(result.consumer_name.clone()).or_default();
        if result.success {
            entry.passed += 1;
            continue;
        }
        entry.failed += 1;
        entry.errors.push(CommandError {
            command: result.command.clone(),
            mode: result.mode,
            error: result.error_message.clone(),
            stderr: result.stderr.clone(),
        });
        failed_tests.push(FailedTest {
            consumer: result.consumer_name.clone(),
            command: result.command.clone(),
            mode: result.mode,
            error: result.error_message.clone(),
            stderr: result.stderr.clone(),
        });
    }

    let total_tests = results.len();
    let failed = failed_tests.len();
    let passed = total_tests - failed;
    let success_rate = if total_tests > 0 {
        passed as f64 / total_tests as f64
    } else {
        0.0
    };

    ConsumerReport {
        generated_at: Utc::now(),
        summary: Summary {
            total_tests,
            passed,
            failed,
            success_rate,
        },
        by_consumer,
        failed_tests,
    }
}

/// Non-empty lines among the last ten lines of `stderr`.
fn stderr_tail(stderr: &str) -> Vec<&str> {
    let lines: Vec<&str> = stderr.split('\n').collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..]
        .iter()
        .copied()
        .filter(|l| !l.trim().is_empty())
        .collect()
}

/// How much of a run to show on the console.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportStyle {
    /// List every warning under its logger.
    pub verbose: bool,
    /// Metamodel warnings were ignored when judging builds.
    pub metamodel_changed: bool,
}

struct ReportView<'a> {
    results: &'a [TestResult],
    report: ConsumerReport,
    style: ReportStyle,
}

impl ReportView<'_> {
    fn write_results(&self, f: &mut fmt::Formatter<'_>, thin: &str) -> fmt::Result {
        writeln!(f, "\nResults:\n{thin}")?;
        for result in self.results {
            let status = if result.success {
                "PASSED".green().bold()
            } else {
                "FAILED".red().bold()
            };
            write!(
                f,
                "{status} {} {} [{}]",
                result.consumer_name, result.command, result.mode
            )?;
            match result.error_message.as_deref() {
                Some(reason) => writeln!(f, ": {reason}")?,
                None => writeln!(f)?,
            }
        }
        Ok(())
    }

    fn write_warnings(&self, f: &mut fmt::Formatter<'_>, thin: &str) -> fmt::Result {
        let with_warnings: Vec<_> = self
            .results
            .iter()
            .filter(|r| r.warnings.values().any(|w| !w.is_empty()))
            .collect();
        if with_warnings.is_empty() {
            return Ok(());
        }

        writeln!(f, "\nWarnings by logger:\n{thin}")?;
        for result in with_warnings {
            writeln!(
                f,
                "{}/{} [{}]: {} loggers",
                result.consumer_name,
                result.command,
                result.mode,
                result.warnings.len()
            )?;
            for (logger, warnings) in &result.warnings {
                if warnings.is_empty() {
                    continue;
                }
                let ignored = self.style.metamodel_changed && logger == METAMODEL_LOGGER;
                let line = format!("{logger} has {} warnings", warnings.len());
                if ignored {
                    writeln!(f, "  {} (ignored due to metamodel change)", line.yellow())?;
                } else if logger == NO_SPECIFIC_LOGGER {
                    writeln!(f, "  {}", line.yellow())?;
                } else {
                    writeln!(f, "  {}", line.red())?;
                }
                if self.style.verbose {
                    for warning in warnings {
                        writeln!(f, "    {warning}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ReportView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = &self.report;
        let rule = "=".repeat(80);
        let thin = "-".repeat(40);

        writeln!(f, "\n{rule}")?;
        writeln!(f, "{}", "CONSUMER TEST RESULTS".bold())?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Total tests: {}", report.summary.total_tests)?;
        writeln!(f, "Passed: {}", report.summary.passed)?;
        writeln!(f, "Failed: {}", report.summary.failed)?;
        writeln!(f, "Success rate: {:.1}%", report.summary.success_rate * 100.0)?;

        writeln!(f, "\nBy Consumer:\n{thin}")?;
        for (consumer, stats) in &report.by_consumer {
            let status = if stats.failed == 0 {
                "✓".green().bold()
            } else {
                "✗".red().bold()
            };
            writeln!(
                f,
                "{status} {consumer}: {} passed, {} failed",
                stats.passed, stats.failed
            )?;
        }

        self.write_results(f, &thin)?;
        self.write_warnings(f, &thin)?;

        if !report.failed_tests.is_empty() {
            writeln!(f, "\n{}\n{thin}", "FAILED TESTS:".red().bold())?;
            for failure in &report.failed_tests {
                writeln!(
                    f,
                    "{} {}/{} [{}]: {}",
                    "✗".red(),
                    failure.consumer,
                    failure.command,
                    failure.mode,
                    failure.error.as_deref().unwrap_or("unknown error")
                )?;
                if let Some(stderr) = failure.stderr.as_deref() {
                    let tail = stderr_tail(stderr);
                    if !tail.is_empty() {
                        writeln!(f, "  Error details: {}", tail.join(" | "))?;
                    }
                }
            }
        }

        writeln!(f, "\n{rule}")
    }
}

/// Human-readable report.
#[must_use]
pub fn render_report(results: &[TestResult], style: ReportStyle) -> String {
    ReportView {
        results,
        report: generate_report(results),
        style,
    }
    .to_string()
}

pub fn print_report(results: &[TestResult], style: ReportStyle) {
    print!("{}", render_report(results, style));
}

/// Stream the ANSI log at `path` to `writer` unchanged.
pub fn replay_log<W: Write>(path: &Path, writer: &mut W) -> Result<u64> {
    if !path.exists() {
        return Err(DocsError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    let mut file = std::fs::File::open(path)?;
    let copied = std::io::copy(&mut file, writer)?;
    writer.flush()?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passed(consumer: &str, command: &str) -> TestResult {
        TestResult {
            consumer_name: consumer.into(),
            command: command.into(),
            mode: OverrideMode::Local,
            success: true,
            error_message: None,
            stdout: Some(String::new()),
            stderr: Some(String::new()),
            warnings: IndexMap::new(),
        }
    }

    fn failed(consumer: &str, command: &str, stderr: Option<&str>) -> TestResult {
        TestResult {
            stderr: stderr.map(str::to_string),
            ..TestResult::failed(
                consumer,
                command,
                OverrideMode::Local,
                "Command failed with exit code 1".into(),
            )
        }
    }

    #[test]
    fn test_generate_report() {
        let results = vec![
            passed("platform", "docs_incremental_latest"),
            failed("platform", "docs_docs_latest", Some("ERROR")),
            passed("module_template", "docs_incremental_latest"),
            passed("module_template", "docs_docs_latest"),
        ];
        let report = generate_report(&results);

        assert_eq!(report.summary.total_tests, 4);
        assert_eq!(report.summary.passed, 3);
        assert_eq!(report.summary.failed, 1);
        assert!((report.summary.success_rate - 0.75).abs() < f64::EPSILON);

        let keys: Vec<_> = report.by_consumer.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["platform", "module_template"]);
        assert_eq!(report.by_consumer["platform"].failed, 1);
        assert_eq!(report.by_consumer["platform"].errors[0].command, "docs_docs_latest");
        assert_eq!(report.failed_tests[0].consumer, "platform");
        assert!(!report.all_passed());
    }

    #[test]
    fn test_empty_report_rate_is_zero() {
        let report = generate_report(&[]);
        assert_eq!(report.summary.total_tests, 0);
        assert_eq!(report.summary.success_rate, 0.0);
        assert!(report.all_passed());
    }

    #[test]
    fn test_report_serializes() {
        let report = generate_report(&[failed("platform", "docs", None)]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["failed"], 1);
        assert!(json["generated_at"].as_str().unwrap().contains('T'));
        assert_eq!(json["by_consumer"]["platform"]["errors"][0]["error"], "Command failed with exit code 1");
        assert!(json["failed_tests"][0]["stderr"].is_null());
    }

    #[test]
    fn test_stderr_tail_keeps_last_non_empty_lines() {
        let stderr: String = (1..=15).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&stderr);
        // The trailing newline leaves an empty last line.
        assert_eq!(tail.first().copied(), Some("line 7"));
        assert_eq!(tail.last().copied(), Some("line 15"));
        assert_eq!(tail.len(), 9);
    }

    #[test]
    fn test_render_report() {
        let text = render_report(
            &[
                passed("platform", "docs"),
                failed("module_template", "docs", Some("first\n\nERROR: boom\n")),
            ],
            ReportStyle::default(),
        );
        assert!(text.contains("CONSUMER TEST RESULTS"));
        assert!(text.contains("Total tests: 2"));
        assert!(text.contains("Success rate: 50.0%"));
        assert!(text.contains("platform: 1 passed, 0 failed"));
        assert!(text.contains("platform docs [local]"));
        assert!(text.contains("module_template/docs [local]: Command failed with exit code 1"));
        assert!(text.contains("  Error details: first | ERROR: boom"));
        assert!(!text.contains("Warnings by logger"));
    }

    #[test]
    fn test_failed_mode_kept_in_report() {
        let git_failure = TestResult {
            mode: OverrideMode::Git,
            ..failed("platform", "docs", None)
        };
        let results = [passed("platform", "docs"), git_failure];

        let report = generate_report(&results);
        assert_eq!(report.failed_tests[0].mode, OverrideMode::Git);
        assert_eq!(report.by_consumer["platform"].errors[0].mode, OverrideMode::Git);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failed_tests"][0]["mode"], "git");

        let text = render_report(&results, ReportStyle::default());
        assert!(text.contains("platform/docs [git]: Command failed with exit code 1"));
    }

    fn warned() -> TestResult {
        let mut warnings = IndexMap::new();
        warnings.insert(
            METAMODEL_LOGGER.to_string(),
            vec!["x.rst:1: WARNING: bad link".to_string()],
        );
        warnings.insert(
            NO_SPECIFIC_LOGGER.to_string(),
            vec!["a.rst:2: WARNING: one".to_string(), "b.rst:3: WARNING: two".to_string()],
        );
        TestResult {
            warnings,
            ..passed("module_template", "docs_incremental_latest")
        }
    }

    #[test]
    fn test_warning_overview_by_logger() {
        let text = render_report(&[warned()], ReportStyle::default());
        assert!(text.contains("Warnings by logger:"));
        assert!(text.contains("module_template/docs_incremental_latest [local]: 2 loggers"));
        assert!(text.contains("[SCORE_METAMODEL] has 1 warnings"));
        assert!(text.contains("[NO SPECIFIC LOGGER] has 2 warnings"));
        assert!(!text.contains("ignored due to metamodel change"));
        assert!(!text.contains("WARNING: bad link"));
    }

    #[test]
    fn test_verbose_lists_warnings_and_marks_ignored() {
        let style = ReportStyle {
            verbose: true,
            metamodel_changed: true,
        };
        let text = render_report(&[warned()], style);
        assert!(text.contains("(ignored due to metamodel change)"));
        assert!(text.contains("    x.rst:1: WARNING: bad link"));
        assert!(text.contains("    b.rst:3: WARNING: two"));
    }

    #[test]
    fn test_replay_log() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(DEFAULT_LOG_FILE);
        let content = "\x1b[32mPASSED\x1b[0m platform\n";
        std::fs::write(&path, content).unwrap();

        let mut out = Vec::new();
        let copied = replay_log(&path, &mut out).unwrap();
        assert_eq!(copied as usize, content.len());
        assert_eq!(String::from_utf8(out).unwrap(), content);
    }

    #[test]
    fn test_replay_missing_log() {
        let mut out = Vec::new();
        let err = replay_log(Path::new("/nonexistent/consumer_tests.txt"), &mut out).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
