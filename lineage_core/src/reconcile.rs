//! Establishes that both sides track exactly the same files.

use std::fs;

use camino::Utf8Path;
use tracing::{debug, info};

use crate::report::escapes_root;
use crate::run::SideSpec;
use crate::{Error, PathSet, Result, Side};

/// Why two file listings cannot be compared.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathSetMismatch {
    /// The sides list a different number of files.
    #[error("count of files inconsistent: {left} != {right}")]
    Count {
        /// Number of files on the left side.
        left: usize,
        /// Number of files on the right side.
        right: usize,
    },
    /// The sorted listings differ at `index`.
    #[error("files differ at index {index}: {left} != {right}")]
    Path {
        /// First index at which the listings differ.
        index: usize,
        /// Left path at `index`.
        left: String,
        /// Right path at `index`.
        right: String,
    },
}

/// Sort both listings and require them to be identical.
///
/// Paths are ordered byte-wise, which is what every later step relies on.
///
/// # Errors
///
/// Returns [`PathSetMismatch::Count`] when the lengths differ, otherwise
/// [`PathSetMismatch::Path`] for the first differing index.
pub fn reconcile_listings(
    mut left: Vec<String>,
    mut right: Vec<String>,
) -> std::result::Result<PathSet, PathSetMismatch> {
    left.sort_unstable();
    right.sort_unstable();

    if left.len() != right.len() {
        return Err(PathSetMismatch::Count {
            left: left.len(),
            right: right.len(),
        });
    }

    if let Some((index, (l, r))) = left
        .iter()
        .zip(right.iter())
        .enumerate()
        .find(|(_, (l, r))| l != r)
    {
        return Err(PathSetMismatch::Path {
            index,
            left: l.clone(),
            right: r.clone(),
        });
    }

    Ok(PathSet::new(left))
}

/// Fetches both listings and reconciles them.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathReconciler;

impl PathReconciler {
    /// Construct a new reconciler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// List files on both sides and return the shared, sorted path set.
    ///
    /// No blame is fetched here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] if either listing fails and
    /// [`Error::PathSetMismatch`] if the listings differ.
    pub fn reconcile(&self, left: &SideSpec<'_>, right: &SideSpec<'_>) -> Result<PathSet> {
        let left_files = list_side(Side::Left, left)?;
        let right_files = list_side(Side::Right, right)?;
        info!(
            left = left_files.len(),
            right = right_files.len(),
            "listed files on both sides"
        );
        Ok(reconcile_listings(left_files, right_files)?)
    }
}

fn list_side(side: Side, spec: &SideSpec<'_>) -> Result<Vec<String>> {
    spec.source
        .list_files(spec.branch, spec.revision)
        .map_err(|source| Error::Source {
            side,
            operation: "list files",
            source,
        })
}

/// Read a newline-delimited path list.
///
/// # Errors
///
/// Returns [`Error::Io`] when the file cannot be read, and
/// [`Error::UnsafePath`] for an entry with a `..` component.
pub fn load_paths(path: &Utf8Path) -> Result<PathSet> {
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_string(),
        source,
    })?;
    let paths = PathSet::parse(&text);
    if let Some(unsafe_path) = paths.iter().find(|entry| escapes_root(entry)) {
        return Err(Error::UnsafePath {
            path: unsafe_path.to_owned(),
        });
    }
    debug!(file = %path, paths = paths.len(), "loaded path list");
    Ok(paths)
}

/// Write `paths` one per line, replacing any existing file.
///
/// # Errors
///
/// Returns [`Error::Io`] when the file cannot be written.
pub fn save_paths(path: &Utf8Path, paths: &PathSet) -> Result<()> {
    fs::write(path, paths.to_text()).map_err(|source| Error::Io {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn owned(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| (*p).to_owned()).collect()
    }

    #[test]
    fn equal_listings_reconcile_sorted() {
        let set = reconcile_listings(owned(&["b.txt", "a.txt"]), owned(&["a.txt", "b.txt"]))
            .expect("reconcile");
        assert_eq!(set.as_slice(), ["a.txt", "b.txt"]);
    }

    #[test]
    fn sorting_is_bytewise() {
        let set = reconcile_listings(
            owned(&["b", "B", "a/b", "a.c"]),
            owned(&["a.c", "a/b", "B", "b"]),
        )
        .expect("reconcile");
        assert_eq!(set.as_slice(), ["B", "a.c", "a/b", "b"]);
    }

    #[test]
    fn count_difference_is_reported_first() {
        let err = reconcile_listings(owned(&["a", "b"]), owned(&["z"])).expect_err("mismatch");
        assert_eq!(err, PathSetMismatch::Count { left: 2, right: 1 });
        assert_eq!(err.to_string(), "count of files inconsistent: 2 != 1");
    }

    #[test]
    fn first_differing_path_is_reported() {
        let err = reconcile_listings(
            owned(&["a.txt", "b.txt", "d.txt"]),
            owned(&["a.txt", "c.txt", "e.txt"]),
        )
        .expect_err("mismatch");
        assert_eq!(
            err,
            PathSetMismatch::Path {
                index: 1,
                left: "b.txt".into(),
                right: "c.txt".into(),
            }
        );
    }

    fn list_file(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("paths.txt")).expect("utf8 path")
    }

    #[test]
    fn saved_paths_load_back_in_order() {
        let temp = TempDir::new().expect("tempdir");
        let file = list_file(&temp);
        let set = reconcile_listings(
            owned(&["src/b.c", "README", "src/a.c"]),
            owned(&["README", "src/a.c", "src/b.c"]),
        )
        .expect("reconcile");

        save_paths(&file, &set).expect("save");
        assert_eq!(
            fs::read_to_string(&file).expect("read"),
            "README\nsrc/a.c\nsrc/b.c\n"
        );
        assert_eq!(load_paths(&file).expect("load"), set);
    }

    #[test]
    fn loaded_paths_skip_blank_lines() {
        let temp = TempDir::new().expect("tempdir");
        let file = list_file(&temp);
        fs::write(&file, "a.c\r\n\n  \nb.c").expect("seed");

        let set = load_paths(&file).expect("load");
        assert_eq!(set.as_slice(), ["a.c", "b.c"]);
    }

    #[test]
    fn loaded_paths_reject_parent_components() {
        let temp = TempDir::new().expect("tempdir");
        let file = list_file(&temp);
        fs::write(&file, "a.c\nsrc/../../etc/passwd\n").expect("seed");

        let err = load_paths(&file).expect_err("parent component");
        assert!(
            matches!(&err, Error::UnsafePath { path } if path == "src/../../etc/passwd"),
            "{err}"
        );
    }

    #[test]
    fn missing_path_list_is_an_io_error() {
        let temp = TempDir::new().expect("tempdir");
        let err = load_paths(&list_file(&temp)).expect_err("missing file");
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn empty_listings_reconcile() {
        let set = reconcile_listings(Vec::new(), Vec::new()).expect("reconcile");
        assert!(set.is_empty());
    }
}
