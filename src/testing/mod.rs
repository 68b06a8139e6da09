//! Testing infrastructure for docs-as-code.
//!
//! This module provides traits and mocks for testing the linker and the
//! consumer harness without real external tools.
//!
//! # Architecture
//!
//! - **Traits**: Abstractions for the `git` and build tool subprocess boundaries
//! - **Mocks**: Test doubles that implement the traits with controllable behavior
//!
//! # Example
//!
//! ```rust,ignore
//! use docs_as_code::testing::{MockCommandRunner, MockGitOperations};
//!
//! let git = MockGitOperations::new()
//!     .with_remote("origin", "https://github.com/eclipse-score/score.git")
//!     .with_head_hash("0123456789abcdef0123456789abcdef01234567");
//!
//! let runner = MockCommandRunner::new().with_timeout("//docs:live_preview");
//! ```

pub mod mocks;
pub mod traits;

pub use mocks::*;
pub use traits::*;
