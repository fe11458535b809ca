use lineage_api::RevisionNumber;

/// Errors surfaced by blame sources.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The file is binary and has no line blame.
    #[error("cannot blame binary file {path}")]
    BinaryFile {
        /// Path that was requested.
        path: String,
    },
    /// Nothing exists at the requested path.
    #[error("no entry at {path}")]
    MissingEntry {
        /// Path that was requested.
        path: String,
    },
    /// The entry exists but is not a file (e.g. a directory).
    #[error("{path} is not a file")]
    NotAFile {
        /// Path that was requested.
        path: String,
    },
    /// The repository has no such revision.
    #[error("revision {revision} does not exist (latest is {latest})")]
    UnknownRevision {
        /// Revision that was requested.
        revision: RevisionNumber,
        /// Latest revision the source knows about.
        latest: RevisionNumber,
    },
    /// A backend call did not finish in time.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// Backend operation that was interrupted.
        operation: String,
        /// Timeout that elapsed.
        seconds: u64,
    },
    /// Generic failure surfaced by the backend.
    #[error("{message}")]
    Failure {
        /// Human-readable error message.
        message: String,
    },
}

impl SourceError {
    /// Helper to construct a failure from any displayable message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    /// Whether the error only means "this path has no blame".
    ///
    /// Callers treat these as an empty blame rather than a failure.
    #[must_use]
    pub const fn is_unblameable(&self) -> bool {
        matches!(
            self,
            Self::BinaryFile { .. } | Self::MissingEntry { .. } | Self::NotAFile { .. }
        )
    }
}

/// Convenience result alias for source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;
