mod types;

pub use types::{SourceError, SourceResult};

use lineage_api::{FileBlame, RevisionNumber};

/// Trait implemented by version-control backends able to list and blame files.
pub trait BlameSource {
    /// Stable identifier used for logging.
    fn id(&self) -> &'static str;

    /// Repository root this source reads from, for diagnostics.
    fn root(&self) -> &str;

    /// Most recent revision available in the repository.
    ///
    /// # Errors
    ///
    /// Implementors should surface transport or backend failures.
    fn latest_revision(&self) -> SourceResult<RevisionNumber>;

    /// Recursively list the files (not directories) under `branch` at
    /// `revision`, relative to `branch`. Order is unspecified.
    ///
    /// # Errors
    ///
    /// Returns backend errors, including [`SourceError::UnknownRevision`].
    fn list_files(&self, branch: &str, revision: RevisionNumber) -> SourceResult<Vec<String>>;

    /// Blame the file at `path` (relative to the source root) as of `revision`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::BinaryFile`], [`SourceError::MissingEntry`] or
    /// [`SourceError::NotAFile`] when the path cannot be blamed, and other
    /// variants for backend failures.
    fn blame(&self, path: &str, revision: RevisionNumber) -> SourceResult<FileBlame>;
}

impl<S: BlameSource + ?Sized> BlameSource for &S {
    fn id(&self) -> &'static str {
        (**self).id()
    }

    fn root(&self) -> &str {
        (**self).root()
    }

    fn latest_revision(&self) -> SourceResult<RevisionNumber> {
        (**self).latest_revision()
    }

    fn list_files(&self, branch: &str, revision: RevisionNumber) -> SourceResult<Vec<String>> {
        (**self).list_files(branch, revision)
    }

    fn blame(&self, path: &str, revision: RevisionNumber) -> SourceResult<FileBlame> {
        (**self).blame(path, revision)
    }
}

impl<S: BlameSource + ?Sized> BlameSource for Box<S> {
    fn id(&self) -> &'static str {
        (**self).id()
    }

    fn root(&self) -> &str {
        (**self).root()
    }

    fn latest_revision(&self) -> SourceResult<RevisionNumber> {
        (**self).latest_revision()
    }

    fn list_files(&self, branch: &str, revision: RevisionNumber) -> SourceResult<Vec<String>> {
        (**self).list_files(branch, revision)
    }

    fn blame(&self, path: &str, revision: RevisionNumber) -> SourceResult<FileBlame> {
        (**self).blame(path, revision)
    }
}
