//! Project configuration (`docs-as-code.toml`).
//!
//! Every field has a default, so a project without the file behaves like
//! the S-CORE layout:
//!
//! ```toml
//! metamodel = "src/extensions/score_metamodel/metamodel.yaml"
//! output_dir = "_build"
//! prefixes = ["PROCESS_"]
//!
//! [schema]
//! network_validation = true
//!
//! [source]
//! roots = ["src", "tools"]
//! exclude = ["**/generated/**"]
//!
//! [[consumers]]
//! name = "module_template"
//! repo_url = "https://github.com/eclipse-score/module_template.git"
//! commands = ["docs_incremental_latest"]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consumer::{default_consumers, ConsumerConfig, DEFAULT_MODULE_NAME};
use crate::error::{DocsError, IntoDocsError, Result};
use crate::schema::SchemaOptions;
use crate::source_links::ScanOptions;
use crate::testlink::DEFAULT_TEST_LOG_DIR;

/// Name of the configuration file at the project root.
pub const CONFIG_FILE_NAME: &str = "docs-as-code.toml";

fn default_metamodel() -> PathBuf {
    PathBuf::from("src/extensions/score_metamodel/metamodel.yaml")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("_build")
}

fn default_test_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_TEST_LOG_DIR)
}

fn default_module_name() -> String {
    DEFAULT_MODULE_NAME.to_string()
}

fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

/// Where requirement tags are scanned for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directories scanned, relative to the project root.
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,

    #[serde(flatten)]
    pub scan: ScanOptions,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            scan: ScanOptions::default(),
        }
    }
}

/// Project configuration loaded from `docs-as-code.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Metamodel YAML, relative to the project root.
    #[serde(default = "default_metamodel")]
    pub metamodel: PathBuf,

    /// Directory generated files are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub schema: SchemaOptions,

    #[serde(default)]
    pub source: SourceConfig,

    /// Prefixes tried when a linked need ID is not found as written.
    #[serde(default)]
    pub prefixes: Vec<String>,

    /// Overrides the GitHub URL derived from `git remote -v`.
    #[serde(default)]
    pub github_base_url: Option<String>,

    /// Root searched for `test.xml` files.
    #[serde(default = "default_test_log_dir")]
    pub test_log_dir: PathBuf,

    #[serde(default = "default_consumers")]
    pub consumers: Vec<ConsumerConfig>,

    /// Bazel module name consumers depend on.
    #[serde(default = "default_module_name")]
    pub module_name: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            metamodel: default_metamodel(),
            output_dir: default_output_dir(),
            schema: SchemaOptions::default(),
            source: SourceConfig::default(),
            prefixes: Vec::new(),
            github_base_url: None,
            test_log_dir: default_test_log_dir(),
            consumers: default_consumers(),
            module_name: default_module_name(),
        }
    }
}

impl ProjectConfig {
    /// Load configuration from a project directory.
    ///
    /// A missing file yields the defaults.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = Self::config_path(project_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            DocsError::Config { message, .. } => DocsError::config_with_path(message, path),
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).into_docs_config()
    }

    #[must_use]
    pub fn config_path(project_dir: &Path) -> PathBuf {
        project_dir.join(CONFIG_FILE_NAME)
    }

    /// Resolve a configured path against the project root.
    #[must_use]
    pub fn resolve(project_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            project_dir.join(path)
        }
    }

    #[must_use]
    pub fn metamodel_path(&self, project_dir: &Path) -> PathBuf {
        Self::resolve(project_dir, &self.metamodel)
    }

    #[must_use]
    pub fn output_path(&self, project_dir: &Path) -> PathBuf {
        Self::resolve(project_dir, &self.output_dir)
    }

    #[must_use]
    pub fn test_log_path(&self, project_dir: &Path) -> PathBuf {
        Self::resolve(project_dir, &self.test_log_dir)
    }

    /// Check field values and referenced files.
    #[must_use]
    pub fn validate(&self, project_dir: &Path) -> ValidationReport {
        let mut report = ValidationReport::new();

        let metamodel = self.metamodel_path(project_dir);
        if !metamodel.exists() {
            report
                .errors
                .push(format!("metamodel: file not found: {}", metamodel.display()));
        }

        if self.source.roots.is_empty() {
            report.errors.push("source.roots: at least one root is required".into());
        }
        for root in &self.source.roots {
            let path = Self::resolve(project_dir, root);
            if !path.is_dir() {
                report
                    .warnings
                    .push(format!("source.roots: directory not found: {}", path.display()));
            }
        }
        if self.source.scan.tags.is_empty() {
            report.errors.push("source.tags: at least one tag is required".into());
        }
        for pattern in &self.source.scan.exclude {
            if let Err(e) = globset::Glob::new(pattern) {
                report
                    .errors
                    .push(format!("source.exclude: invalid glob '{pattern}': {e}"));
            }
        }

        if let Some(url) = &self.github_base_url {
            if !url.starts_with("https://") {
                report
                    .errors
                    .push(format!("github_base_url: must start with https://, got '{url}'"));
            }
        }

        if self.module_name.trim().is_empty() {
            report.errors.push("module_name: must not be empty".into());
        }

        let mut names = HashSet::new();
        for consumer in &self.consumers {
            if !names.insert(consumer.name.as_str()) {
                report
                    .errors
                    .push(format!("consumers: duplicate consumer '{}'", consumer.name));
            }
            if consumer.repo_url.is_empty() {
                report
                    .errors
                    .push(format!("consumers.{}: repo_url is empty", consumer.name));
            }
            if consumer.timeout == 0 {
                report
                    .errors
                    .push(format!("consumers.{}: timeout must be positive", consumer.name));
            }
            if consumer.commands.is_empty() && consumer.test_commands.is_empty() {
                report
                    .warnings
                    .push(format!("consumers.{}: no commands configured", consumer.name));
            }
        }

        report
    }
}

/// Result of configuration validation.
///
/// Warnings do not affect validity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// `0` when valid, the configuration error code otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_valid() {
            0
        } else {
            DocsError::config("").exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // =========================================================================
    // Loading
    // =========================================================================

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ProjectConfig::load(temp.path()).unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert_eq!(config.consumers.len(), 3);
        assert_eq!(config.module_name, "score_docs_as_code");
        assert_eq!(config.test_log_dir, PathBuf::from("bazel-testlogs"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ProjectConfig::from_toml_str(
            r#"
prefixes = ["PROCESS_"]

[schema]
network_validation = true

[source]
roots = ["src"]
exclude = ["**/generated/**"]
"#,
        )
        .unwrap();

        assert_eq!(config.prefixes, vec!["PROCESS_"]);
        assert!(config.schema.network_validation);
        assert!(!config.schema.link_id_patterns);
        assert_eq!(config.source.roots, vec![PathBuf::from("src")]);
        assert_eq!(config.source.scan.exclude, vec!["**/generated/**"]);
        assert_eq!(config.source.scan.tags, ScanOptions::default().tags);
        assert_eq!(config.output_dir, PathBuf::from("_build"));
    }

    #[test]
    fn test_consumers_replace_defaults() {
        let config = ProjectConfig::from_toml_str(
            r#"
[[consumers]]
name = "mine"
repo_url = "https://github.com/org/mine.git"
commands = ["docs_incremental_latest"]
timeout = 60
"#,
        )
        .unwrap();
        assert_eq!(config.consumers.len(), 1);
        assert_eq!(config.consumers[0].timeout, 60);
        assert_eq!(config.consumers[0].branch, "main");
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "prefixes = [").unwrap();
        let err = ProjectConfig::load(temp.path()).unwrap_err();
        match err {
            DocsError::Config { path, .. } => {
                assert_eq!(path, Some(temp.path().join(CONFIG_FILE_NAME)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_paths() {
        let config = ProjectConfig::default();
        let root = Path::new("/repo");
        assert_eq!(
            config.metamodel_path(root),
            PathBuf::from("/repo/src/extensions/score_metamodel/metamodel.yaml")
        );
        assert_eq!(
            ProjectConfig::resolve(root, Path::new("/abs/out")),
            PathBuf::from("/abs/out")
        );
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn test_validate_default_config_without_metamodel() {
        let temp = TempDir::new().unwrap();
        let report = ProjectConfig::default().validate(temp.path());
        assert!(!report.is_valid());
        assert!(report.errors[0].starts_with("metamodel: file not found"));
        assert_eq!(report.exit_code(), 7);
    }

    #[test]
    fn test_validate_valid_config() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("metamodel.yaml"), "needs_types: {}\n").unwrap();
        let config = ProjectConfig {
            metamodel: PathBuf::from("metamodel.yaml"),
            ..ProjectConfig::default()
        };
        let report = config.validate(temp.path());
        assert!(report.is_valid(), "{:?}", report.errors);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_validate_field_errors() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("m.yaml"), "").unwrap();
        let mut config = ProjectConfig {
            metamodel: PathBuf::from("m.yaml"),
            github_base_url: Some("http://github.com/x/y".into()),
            ..ProjectConfig::default()
        };
        config.source.scan.exclude.push("a/[".into());
        config.consumers.push(config.consumers[0].clone());
        config.consumers[0].timeout = 0;

        let report = config.validate(temp.path());
        assert_eq!(report.errors.len(), 4, "{:?}", report.errors);
        assert!(report.errors.iter().any(|e| e.contains("invalid glob")));
        assert!(report.errors.iter().any(|e| e.contains("https://")));
        assert!(report.errors.iter().any(|e| e.contains("duplicate consumer 'platform'")));
        assert!(report.errors.iter().any(|e| e.contains("timeout must be positive")));
    }
}
