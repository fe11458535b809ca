//! Git blame source built on top of libgit2.
//!
//! Commits reachable from the configured reference are numbered densely,
//! oldest first, so a git history can be compared revision-for-revision with
//! a centralized one.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use git2::{
    BlameOptions, ErrorClass, ErrorCode, ObjectType, Oid, Repository as GitRepository, Sort,
    TreeWalkMode, TreeWalkResult,
};
use tracing::{debug, info};

use crate::{
    BlameLine, BlameSource, Error, FileBlame, Result, RevisionNumber, SourceError, SourceResult,
};

/// How a git repository is exposed as a blame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSourceOptions {
    /// Reference whose history is numbered.
    pub reference: String,
    /// Attribute commits brought in by a mainline merge to that merge.
    pub merged_revisions: bool,
}

impl Default for GitSourceOptions {
    fn default() -> Self {
        Self {
            reference: "HEAD".to_owned(),
            merged_revisions: false,
        }
    }
}

/// Dense revision numbering over the history of one reference.
#[derive(Debug, Default, Clone)]
struct RevisionIndex {
    commits: Vec<Oid>,
    numbers: HashMap<Oid, RevisionNumber>,
    merged_at: HashMap<Oid, RevisionNumber>,
}

impl RevisionIndex {
    fn build(repo: &GitRepository, tip: Oid, merged_revisions: bool) -> Result<Self> {
        let mut walk = repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        walk.push(tip)?;
        let commits = walk.collect::<std::result::Result<Vec<_>, _>>()?;
        let numbers = commits.iter().copied().zip(1..).collect();

        let mut index = Self {
            commits,
            numbers,
            merged_at: HashMap::new(),
        };
        if merged_revisions {
            index.attribute_merges(repo, tip)?;
        }
        Ok(index)
    }

    /// Map every commit that entered the first-parent chain through a merge
    /// to the number of that merge.
    fn attribute_merges(&mut self, repo: &GitRepository, tip: Oid) -> Result<()> {
        let mut mainline = Vec::new();
        let mut cursor = Some(repo.find_commit(tip)?);
        while let Some(commit) = cursor {
            cursor = commit.parents().next();
            mainline.push(commit);
        }
        let on_mainline: HashSet<Oid> = mainline.iter().map(git2::Commit::id).collect();

        for merge in mainline.iter().rev().filter(|c| c.parent_count() > 1) {
            let Some(&number) = self.numbers.get(&merge.id()) else {
                continue;
            };
            let mut walk = repo.revwalk()?;
            for side in merge.parent_ids().skip(1) {
                walk.push(side)?;
            }
            walk.hide(merge.parent_id(0)?)?;
            for oid in walk {
                let oid = oid?;
                if !on_mainline.contains(&oid) {
                    self.merged_at.entry(oid).or_insert(number);
                }
            }
        }
        debug!(merged = self.merged_at.len(), "attributed merged commits");
        Ok(())
    }

    fn latest(&self) -> RevisionNumber {
        self.commits.len() as RevisionNumber
    }

    fn commit_id(&self, revision: RevisionNumber) -> SourceResult<Oid> {
        revision
            .checked_sub(1)
            .and_then(|offset| usize::try_from(offset).ok())
            .and_then(|offset| self.commits.get(offset))
            .copied()
            .ok_or_else(|| SourceError::UnknownRevision {
                revision,
                latest: self.latest(),
            })
    }
}

/// Handle to a git repository serving blame by revision number.
pub struct Repository {
    inner: GitRepository,
    root: String,
    options: GitSourceOptions,
    index: RevisionIndex,
}

impl Repository {
    /// Open a repository with default options.
    ///
    /// # Errors
    ///
    /// See [`Repository::open_with`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, GitSourceOptions::default())
    }

    /// Open the repository containing `path` and number its history.
    ///
    /// Bare repositories are accepted. A repository whose reference is unborn
    /// has no revisions.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be canonicalized, does not resolve
    /// to a git repository, or the history cannot be walked.
    pub fn open_with(path: impl AsRef<Path>, options: GitSourceOptions) -> Result<Self> {
        let original = path.as_ref();
        let canonical = std::fs::canonicalize(original).map_err(|source| Error::Io {
            path: display_path(original),
            source,
        })?;

        let repo = match GitRepository::discover(&canonical) {
            Ok(repo) => repo,
            Err(err)
                if err.class() == ErrorClass::Repository && err.code() == ErrorCode::NotFound =>
            {
                return Err(Error::NotARepository {
                    path: display_path(&canonical),
                })
            }
            Err(err) => return Err(Error::from(err)),
        };

        let root = display_path(repo.workdir().unwrap_or_else(|| repo.path()))
            .trim_end_matches(['/', '\\'])
            .to_owned();

        let index = match resolve_tip(&repo, &options.reference)? {
            Some(tip) => RevisionIndex::build(&repo, tip, options.merged_revisions)?,
            None => RevisionIndex::default(),
        };
        info!(
            root = %root,
            reference = %options.reference,
            revisions = index.latest(),
            "opened git repository"
        );

        Ok(Self {
            inner: repo,
            root,
            options,
            index,
        })
    }

    /// Options the repository was opened with.
    #[must_use]
    pub const fn options(&self) -> &GitSourceOptions {
        &self.options
    }

    /// Commit numbered `revision`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::UnknownRevision`] outside `1..=latest`.
    pub fn commit_id(&self, revision: RevisionNumber) -> SourceResult<Oid> {
        self.index.commit_id(revision)
    }

    /// Number assigned to `oid`, if it is reachable from the reference.
    #[must_use]
    pub fn revision_of(&self, oid: Oid) -> Option<RevisionNumber> {
        self.index.numbers.get(&oid).copied()
    }

    fn commit_at(&self, revision: RevisionNumber) -> SourceResult<git2::Commit<'_>> {
        let oid = self.index.commit_id(revision)?;
        self.inner.find_commit(oid).map_err(git_failure)
    }

    fn merged_revision(&self, oid: Oid) -> Option<RevisionNumber> {
        if self.options.merged_revisions {
            self.index.merged_at.get(&oid).copied()
        } else {
            None
        }
    }
}

impl BlameSource for Repository {
    fn id(&self) -> &'static str {
        "git"
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn latest_revision(&self) -> SourceResult<RevisionNumber> {
        Ok(self.index.latest())
    }

    fn list_files(&self, branch: &str, revision: RevisionNumber) -> SourceResult<Vec<String>> {
        let commit = self.commit_at(revision)?;
        let mut tree = commit.tree().map_err(git_failure)?;

        let branch = branch.trim_matches('/');
        if !branch.is_empty() {
            let entry = tree
                .get_path(Path::new(branch))
                .map_err(|err| missing_or_failure(branch, err))?;
            if entry.kind() != Some(ObjectType::Tree) {
                return Err(SourceError::NotAFile {
                    path: branch.to_owned(),
                });
            }
            tree = self.inner.find_tree(entry.id()).map_err(git_failure)?;
        }

        let mut files = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                files.push(format!("{dir}{}", String::from_utf8_lossy(entry.name_bytes())));
            }
            TreeWalkResult::Ok
        })
        .map_err(git_failure)?;
        Ok(files)
    }

    fn blame(&self, path: &str, revision: RevisionNumber) -> SourceResult<FileBlame> {
        let commit = self.commit_at(revision)?;
        let tree = commit.tree().map_err(git_failure)?;
        let relative = path.trim_start_matches('/');

        let entry = tree
            .get_path(Path::new(relative))
            .map_err(|err| missing_or_failure(relative, err))?;
        if entry.kind() != Some(ObjectType::Blob) {
            return Err(SourceError::NotAFile {
                path: relative.to_owned(),
            });
        }
        let blob = self.inner.find_blob(entry.id()).map_err(git_failure)?;
        if blob.is_binary() {
            return Err(SourceError::BinaryFile {
                path: relative.to_owned(),
            });
        }

        let mut options = BlameOptions::new();
        options.newest_commit(commit.id());
        let blame = self
            .inner
            .blame_file(Path::new(relative), Some(&mut options))
            .map_err(git_failure)?;

        let content = String::from_utf8_lossy(blob.content());
        content
            .split_terminator('\n')
            .zip(1_u32..)
            .map(|(text, line_number)| {
                let hunk = blame.get_line(line_number as usize).ok_or_else(|| {
                    SourceError::message(format!("no blame for {relative}:{line_number}"))
                })?;
                let oid = hunk.final_commit_id();
                let revision = self.revision_of(oid).ok_or_else(|| {
                    SourceError::message(format!("commit {oid} is not numbered"))
                })?;
                let signature = hunk.final_signature();
                let author = String::from_utf8_lossy(signature.name_bytes());
                let text = text.strip_suffix('\r').unwrap_or(text);

                let mut line = BlameLine::new(line_number, text, author, revision);
                line.merged_revision = self.merged_revision(oid);
                Ok(line)
            })
            .collect()
    }
}

fn resolve_tip(repo: &GitRepository, reference: &str) -> Result<Option<Oid>> {
    match repo.revparse_single(reference) {
        Ok(object) => Ok(Some(object.peel_to_commit()?.id())),
        Err(err) if matches!(err.code(), ErrorCode::NotFound | ErrorCode::UnbornBranch) => {
            Ok(None)
        }
        Err(err) => Err(Error::from(err)),
    }
}

fn missing_or_failure(path: &str, err: git2::Error) -> SourceError {
    if err.code() == ErrorCode::NotFound {
        SourceError::MissingEntry {
            path: path.to_owned(),
        }
    } else {
        git_failure(err)
    }
}

fn git_failure(err: git2::Error) -> SourceError {
    SourceError::message(format!("git: {}", err.message()))
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .field("options", &self.options)
            .field("revisions", &self.index.latest())
            .finish_non_exhaustive()
    }
}
