use std::sync::atomic::{AtomicUsize, Ordering};

use lineage_api::{FileBlame, RevisionNumber};
use lineage_source_api::{BlameSource, SourceError, SourceResult};

#[derive(Debug, Clone)]
enum Entry {
    Text(FileBlame),
    Binary,
    Directory,
    Failing(String),
}

/// In-process blame source holding a fixed file tree.
///
/// Paths are stored exactly as given and listed in insertion order; a later
/// entry for the same path shadows earlier ones when blaming. The tree looks
/// the same at every revision up to `latest`.
#[derive(Debug)]
pub struct MemorySource {
    root: String,
    latest: RevisionNumber,
    entries: Vec<(String, Entry)>,
    blame_calls: AtomicUsize,
}

impl MemorySource {
    /// Create an empty source whose latest revision is 1.
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            latest: 1,
            entries: Vec::new(),
            blame_calls: AtomicUsize::new(0),
        }
    }

    /// Set the latest revision.
    #[must_use]
    pub const fn with_latest(mut self, latest: RevisionNumber) -> Self {
        self.latest = latest;
        self
    }

    /// Add a text file with the given blame.
    #[must_use]
    pub fn with_file(self, path: impl Into<String>, blame: impl Into<FileBlame>) -> Self {
        self.with_entry(path, Entry::Text(blame.into()))
    }

    /// Add a file the source refuses to blame as binary.
    #[must_use]
    pub fn with_binary(self, path: impl Into<String>) -> Self {
        self.with_entry(path, Entry::Binary)
    }

    /// Add a directory entry; it is not listed and cannot be blamed.
    #[must_use]
    pub fn with_directory(self, path: impl Into<String>) -> Self {
        self.with_entry(path, Entry::Directory)
    }

    /// Add a file whose blame fails with a backend error.
    #[must_use]
    pub fn with_failing(self, path: impl Into<String>, message: impl Into<String>) -> Self {
        self.with_entry(path, Entry::Failing(message.into()))
    }

    /// Number of `blame` calls served so far.
    pub fn blame_calls(&self) -> usize {
        self.blame_calls.load(Ordering::Relaxed)
    }

    fn with_entry(mut self, path: impl Into<String>, entry: Entry) -> Self {
        self.entries.push((path.into(), entry));
        self
    }

    fn check_revision(&self, revision: RevisionNumber) -> SourceResult<()> {
        if revision == 0 || revision > self.latest {
            return Err(SourceError::UnknownRevision {
                revision,
                latest: self.latest,
            });
        }
        Ok(())
    }
}

impl BlameSource for MemorySource {
    fn id(&self) -> &'static str {
        "memory"
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn latest_revision(&self) -> SourceResult<RevisionNumber> {
        Ok(self.latest)
    }

    fn list_files(&self, branch: &str, revision: RevisionNumber) -> SourceResult<Vec<String>> {
        self.check_revision(revision)?;
        let branch = branch.trim_matches('/');
        let files = self
            .entries
            .iter()
            .filter(|(_, entry)| !matches!(entry, Entry::Directory))
            .filter_map(|(path, _)| {
                if branch.is_empty() {
                    Some(path.clone())
                } else {
                    path.strip_prefix(branch)
                        .and_then(|rest| rest.strip_prefix('/'))
                        .map(str::to_owned)
                }
            })
            .collect();
        Ok(files)
    }

    fn blame(&self, path: &str, revision: RevisionNumber) -> SourceResult<FileBlame> {
        self.blame_calls.fetch_add(1, Ordering::Relaxed);
        self.check_revision(revision)?;
        let found = self
            .entries
            .iter()
            .rev()
            .find(|(candidate, _)| candidate == path)
            .map(|(_, entry)| entry);
        match found {
            Some(Entry::Text(blame)) => Ok(blame.clone()),
            Some(Entry::Binary) => Err(SourceError::BinaryFile {
                path: path.to_owned(),
            }),
            Some(Entry::Directory) => Err(SourceError::NotAFile {
                path: path.to_owned(),
            }),
            Some(Entry::Failing(message)) => Err(SourceError::message(message.clone())),
            None => Err(SourceError::MissingEntry {
                path: path.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_api::BlameLine;

    fn sample() -> MemorySource {
        MemorySource::new("mem://left")
            .with_latest(3)
            .with_file("trunk/b.txt", vec![BlameLine::new(1, "b", "bob", 2)])
            .with_binary("trunk/logo.png")
            .with_directory("trunk/src")
            .with_file("trunk/src/a.c", vec![BlameLine::new(1, "a", "bob", 1)])
            .with_file("branches/x/a.c", FileBlame::empty())
    }

    #[test]
    fn lists_files_under_branch_in_insertion_order() {
        let files = sample().list_files("trunk", 3).expect("list");
        assert_eq!(files, ["b.txt", "logo.png", "src/a.c"]);
    }

    #[test]
    fn blame_reports_entry_kinds() {
        let source = sample();
        assert_eq!(source.blame("trunk/b.txt", 2).expect("blame").len(), 1);
        assert!(matches!(
            source.blame("trunk/logo.png", 2),
            Err(SourceError::BinaryFile { .. })
        ));
        assert!(matches!(
            source.blame("trunk/src", 2),
            Err(SourceError::NotAFile { .. })
        ));
        assert!(matches!(
            source.blame("trunk/none", 2),
            Err(SourceError::MissingEntry { .. })
        ));
        assert_eq!(source.blame_calls(), 4);
    }

    #[test]
    fn unknown_revision_is_rejected() {
        let err = sample().list_files("trunk", 4).expect_err("revision 4 unknown");
        assert!(matches!(
            err,
            SourceError::UnknownRevision {
                revision: 4,
                latest: 3
            }
        ));
    }
}
