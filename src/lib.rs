//! docs-as-code - documentation tooling for S-CORE style projects
//!
//! Turns a metamodel of need types into JSON Schema rules for the
//! documentation build, links requirements to the source code and tests
//! that implement and verify them, and checks that downstream repositories
//! still build their documentation against the local version.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`metamodel`] - Need type rule table loading
//! - [`schema`] - Metamodel to JSON Schema compiler
//! - [`needs`] - Reading exported needs
//! - [`checks`] - Local need checks (ID shape, prohibited words)
//! - [`git`] - Remote and revision helpers, GitHub permalinks
//! - [`source_links`] - Requirement tag scanner
//! - [`testlink`] - Test report XML parsing and JUnit merging
//! - [`linker`] - Attaching source and test links to needs
//! - [`link_check`] - Broken link reports
//! - [`consumer`] - Downstream consumer regression harness
//! - [`runfiles`] - Build runfiles directory resolution
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Testing infrastructure (traits, mocks)
//!
//! # Example
//!
//! ```rust,ignore
//! use docs_as_code::{compile, write_schemas, MetaModel, ProjectConfig};
//!
//! let config = ProjectConfig::load(".".as_ref())?;
//! let metamodel = MetaModel::load(&config.metamodel_path(".".as_ref()))?;
//! let definitions = compile(&metamodel, &config.schema);
//! let output = write_schemas(&config.output_path(".".as_ref()), &definitions)?;
//! println!("{} = {}", output.config_key, output.path.display());
//! ```

pub mod ansi;
pub mod checks;
pub mod config;
pub mod consumer;
pub mod error;
pub mod git;
pub mod link_check;
pub mod linker;
pub mod metamodel;
pub mod needs;
pub mod runfiles;
pub mod schema;
pub mod source_links;
pub mod testing;
pub mod testlink;

// Re-export commonly used types
pub use error::{DocsError, IntoDocsError, Result};

pub use config::{ProjectConfig, ValidationReport, CONFIG_FILE_NAME};

pub use metamodel::{MetaModel, NeedType, ProhibitedWordCheck};

pub use schema::{compile, write_schemas, SchemaDefinitions, SchemaOptions, SchemaOutput};

pub use needs::{load_needs, parse_needs, Need, Needs};

pub use checks::{run_local_checks, CheckWarning};

pub use git::{current_git_hash, find_git_root, github_base_url, github_link, RealGit};

pub use source_links::{scan_tree, NeedLink, ScanOptions};

pub use testlink::{collect_test_reports, merge_junit, DataForTestLink, TestOutcome, VerifyType};

pub use linker::{link_needs, write_link_report, LinkReport, LinkTarget};

pub use link_check::{parse_broken_links, write_issue_body, BrokenLink};

pub use consumer::{
    default_consumers, generate_report, ConsumerConfig, ConsumerReport, ConsumerTester,
    OverrideMode, ProcessRunner, TestResult,
};

pub use runfiles::{resolve_runfiles_dir, runfiles_dir};

// Re-export testing types for convenience
pub use testing::{
    CommandOutcome, CommandOutput, CommandRunner, GitOperations, MockCommandRunner,
    MockGitOperations,
};
