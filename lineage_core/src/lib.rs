//! Core library for certifying that two repositories carry the same per-line
//! history.
//!
//! The crate is layered around four responsibilities:
//! - path reconciliation between the two sides
//! - positional blame comparison and divergence classification
//! - divergence reporting through injected sinks
//! - the run loop tying sources, comparison and reporting together
//!
//! A libgit2-backed [`repository::Repository`] implements
//! [`BlameSource`]; other backends live in `lineage_sources`.

#![warn(
    clippy::all,
    clippy::cargo,
    clippy::nursery,
    clippy::pedantic,
    missing_docs
)]
#![cfg_attr(
    not(test),
    deny(
        clippy::dbg_macro,
        clippy::expect_used,
        clippy::panic,
        clippy::print_stderr,
        clippy::print_stdout,
        clippy::todo,
        clippy::unwrap_used
    )
)]

/// Positional blame comparison.
pub mod compare;
/// File-set reconciliation between the two sides.
pub mod reconcile;
/// Divergence rendering and result sinks.
pub mod report;
/// Git repository access and blame on top of libgit2.
pub mod repository;
/// Run orchestration over a path set.
pub mod run;

pub use lineage_api::*;
pub use lineage_source_api::{BlameSource, SourceError, SourceResult};
pub use lineage_sources::{
    MemorySource, SvnSource, DEFAULT_TIMEOUT_SECS as DEFAULT_SVN_TIMEOUT_SECS,
};

pub use reconcile::PathSetMismatch;

/// Common result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying git operation failed.
    #[error("git error: {source}")]
    Git {
        /// Original libgit2 error bubbled up by the core library.
        #[from]
        source: git2::Error,
    },
    /// Provided path does not correspond to a git repository.
    #[error("path does not reference a git repository: {path}")]
    NotARepository {
        /// Path that failed to resolve to a repository.
        path: String,
    },
    /// Filesystem interaction failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Filesystem path involved in the failed operation.
        path: String,
        /// Source I/O error returned by the standard library.
        #[source]
        source: std::io::Error,
    },
    /// A path would resolve outside the directory it is joined onto.
    #[error("path escapes its root: {path}")]
    UnsafePath {
        /// Offending branch-relative path.
        path: String,
    },
    /// The two sides do not track the same files.
    #[error("path sets differ: {0}")]
    PathSetMismatch(#[from] PathSetMismatch),
    /// A blame source failed outside of per-file processing.
    #[error("{side} source failed to {operation}: {source}")]
    Source {
        /// Side whose source failed.
        side: Side,
        /// What was being attempted.
        operation: &'static str,
        /// Error reported by the source.
        #[source]
        source: SourceError,
    },
}
