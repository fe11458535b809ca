//! Rendering of divergent blames and the sinks results are written to.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{LineWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::{Divergence, Error, FileBlame, Result, Side};

/// Suffix appended to every artifact file name.
pub const ARTIFACT_SUFFIX: &str = ".txt";

/// Append-only, line-oriented result log.
pub trait LogSink {
    /// Append one line; `line` carries no terminator.
    ///
    /// # Errors
    ///
    /// Implementors surface write failures.
    fn append_line(&mut self, line: &str) -> Result<()>;
}

impl LogSink for Vec<String> {
    fn append_line(&mut self, line: &str) -> Result<()> {
        self.push(line.to_owned());
        Ok(())
    }
}

/// Result log backed by a file, truncated on creation and flushed per line.
#[derive(Debug)]
pub struct FileLog {
    path: Utf8PathBuf,
    writer: LineWriter<File>,
}

impl FileLog {
    /// Create (or truncate) the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be created.
    pub fn create(path: impl Into<Utf8PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|source| Error::Io {
            path: path.to_string(),
            source,
        })?;
        Ok(Self {
            path,
            writer: LineWriter::new(file),
        })
    }

    /// Location of the log.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl LogSink for FileLog {
    fn append_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{line}").map_err(|source| Error::Io {
            path: self.path.to_string(),
            source,
        })
    }
}

/// Destination for rendered blame artifacts.
pub trait ArtifactSink {
    /// Remove every artifact from previous runs.
    ///
    /// # Errors
    ///
    /// Implementors surface cleanup failures.
    fn clear(&mut self) -> Result<()>;

    /// Store `contents` for `location` on `side`.
    ///
    /// # Errors
    ///
    /// Implementors surface write failures.
    fn write(&mut self, side: Side, location: &str, contents: &str) -> Result<()>;
}

/// Artifacts laid out as `<root>/<side>/<location>.txt`.
#[derive(Debug, Clone)]
pub struct DirectoryArtifacts {
    root: Utf8PathBuf,
}

impl DirectoryArtifacts {
    /// Use `root` as the artifact directory.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Artifact directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// File an artifact for `location` on `side` is written to.
    #[must_use]
    pub fn artifact_path(&self, side: Side, location: &str) -> Utf8PathBuf {
        let relative = location.trim_start_matches('/');
        self.root
            .join(side.label())
            .join(format!("{relative}{ARTIFACT_SUFFIX}"))
    }
}

impl ArtifactSink for DirectoryArtifacts {
    fn clear(&mut self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root).map_err(|source| Error::Io {
                path: self.root.to_string(),
                source,
            })?;
        }
        fs::create_dir_all(&self.root).map_err(|source| Error::Io {
            path: self.root.to_string(),
            source,
        })
    }

    fn write(&mut self, side: Side, location: &str, contents: &str) -> Result<()> {
        if escapes_root(location) {
            return Err(Error::UnsafePath {
                path: location.to_owned(),
            });
        }
        let path = self.artifact_path(side, location);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_string(),
                source,
            })?;
        }
        fs::write(&path, contents).map_err(|source| Error::Io {
            path: path.to_string(),
            source,
        })
    }
}

/// Whether `location` has a `..` component and could resolve outside the
/// directory it is joined onto.
pub(crate) fn escapes_root(location: &str) -> bool {
    location.split(['/', '\\']).any(|component| component == "..")
}

/// Artifacts kept in memory, keyed by side and location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryArtifacts {
    files: BTreeMap<(Side, String), String>,
}

impl MemoryArtifacts {
    /// Create an empty artifact store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered artifact for `location` on `side`, if written.
    #[must_use]
    pub fn get(&self, side: Side, location: &str) -> Option<&str> {
        self.files
            .get(&(side, location.to_owned()))
            .map(String::as_str)
    }

    /// Number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no artifact has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ArtifactSink for MemoryArtifacts {
    fn clear(&mut self) -> Result<()> {
        self.files.clear();
        Ok(())
    }

    fn write(&mut self, side: Side, location: &str, contents: &str) -> Result<()> {
        self.files
            .insert((side, location.to_owned()), contents.to_owned());
        Ok(())
    }
}

/// Render a blame as fixed-column text, one row per line:
/// revision (merged revision if present), author, then the line text.
#[must_use]
pub fn render_blame(blame: &FileBlame) -> String {
    let mut rendered = String::new();
    for line in blame {
        rendered.push_str(&format!(
            "{:<10} {:<20}: {}\n",
            line.display_revision(),
            line.author,
            line.text
        ));
    }
    rendered
}

/// Writes divergence artifacts and result log entries.
pub struct DivergenceReporter<'a> {
    simple_log: &'a mut dyn LogSink,
    enhanced_log: &'a mut dyn LogSink,
    artifacts: &'a mut dyn ArtifactSink,
}

impl<'a> DivergenceReporter<'a> {
    /// Construct a reporter over the given sinks.
    pub fn new(
        simple_log: &'a mut dyn LogSink,
        enhanced_log: &'a mut dyn LogSink,
        artifacts: &'a mut dyn ArtifactSink,
    ) -> Self {
        Self {
            simple_log,
            enhanced_log,
            artifacts,
        }
    }

    /// Wipe artifacts left by previous runs. Called once per run.
    ///
    /// # Errors
    ///
    /// Propagates artifact sink failures.
    pub fn reset(&mut self) -> Result<()> {
        self.artifacts.clear()
    }

    /// Record a divergent file: render both sides, then log the path.
    ///
    /// `path` is relative to the branch; `location` is the branch-qualified
    /// path the artifacts mirror.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn report_mismatch(
        &mut self,
        path: &str,
        location: &str,
        divergence: &Divergence,
        left: &FileBlame,
        right: &FileBlame,
    ) -> Result<()> {
        debug!(
            path,
            kinds = %divergence.kind_list(),
            index = divergence.index,
            "reporting divergence"
        );
        self.artifacts
            .write(Side::Right, location, &render_blame(right))?;
        self.artifacts
            .write(Side::Left, location, &render_blame(left))?;
        self.simple_log.append_line(path)?;
        self.enhanced_log
            .append_line(&format!("{}\t{path}", divergence.kind_list()))
    }

    /// Record a file whose blame could not be fetched.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn report_failure(&mut self, path: &str, cause: &str) -> Result<()> {
        self.simple_log.append_line(path)?;
        self.simple_log.append_line("=>")?;
        self.simple_log.append_line(cause)?;
        self.enhanced_log.append_line(&format!("Error\t{path}"))
    }
}

impl std::fmt::Debug for DivergenceReporter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DivergenceReporter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlameLine, MismatchKind};
    use tempfile::TempDir;

    fn two_lines() -> FileBlame {
        vec![
            BlameLine::new(1, "a", "bob", 5),
            BlameLine::new(2, "b", "alice", 7).merged_at(9),
        ]
        .into()
    }

    #[test]
    fn render_uses_fixed_columns() {
        let rendered = render_blame(&two_lines());
        let expected = "5          bob                 : a\n9          alice               : b\n";
        assert_eq!(rendered, expected);
        assert_eq!(render_blame(&FileBlame::empty()), "");
    }

    #[test]
    fn mismatch_writes_both_sides_and_logs() {
        let mut simple: Vec<String> = Vec::new();
        let mut enhanced: Vec<String> = Vec::new();
        let mut artifacts = MemoryArtifacts::new();

        let mut right = two_lines();
        right.lines.push(BlameLine::new(3, "c", "carol", 11));
        {
            let mut reporter = DivergenceReporter::new(&mut simple, &mut enhanced, &mut artifacts);
            reporter
                .report_mismatch(
                    "src/a.c",
                    "trunk/src/a.c",
                    &Divergence::line_count(),
                    &two_lines(),
                    &right,
                )
                .expect("report");
        }

        assert_eq!(simple, ["src/a.c"]);
        assert_eq!(enhanced, ["LineCount\tsrc/a.c"]);
        let left_text = artifacts.get(Side::Left, "trunk/src/a.c").expect("left");
        let right_text = artifacts.get(Side::Right, "trunk/src/a.c").expect("right");
        assert_eq!(left_text.lines().count(), 2);
        assert_eq!(right_text.lines().count(), 3);
    }

    #[test]
    fn failure_is_logged_without_artifacts() {
        let mut simple: Vec<String> = Vec::new();
        let mut enhanced: Vec<String> = Vec::new();
        let mut artifacts = MemoryArtifacts::new();
        {
            let mut reporter = DivergenceReporter::new(&mut simple, &mut enhanced, &mut artifacts);
            reporter
                .report_failure("a.c", "left trunk/a.c: connection reset")
                .expect("report");
        }
        assert_eq!(simple, ["a.c", "=>", "left trunk/a.c: connection reset"]);
        assert_eq!(enhanced, ["Error\ta.c"]);
        assert!(artifacts.is_empty());
    }

    #[test]
    fn directory_artifacts_mirror_locations_and_clear() {
        let temp = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(temp.path().join("_compare")).expect("utf8 path");
        let mut artifacts = DirectoryArtifacts::new(root.clone());

        artifacts.clear().expect("initial clear");
        artifacts
            .write(Side::Left, "trunk/src/a.c", "left\n")
            .expect("write");
        let written = root.join("left/trunk/src/a.c.txt");
        assert_eq!(artifacts.artifact_path(Side::Left, "trunk/src/a.c"), written);
        assert_eq!(fs::read_to_string(&written).expect("read"), "left\n");

        artifacts.clear().expect("second clear");
        assert!(root.exists());
        assert!(!written.exists());
    }

    #[test]
    fn directory_artifacts_refuse_parent_components() {
        let temp = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(temp.path().join("_compare")).expect("utf8 path");
        let mut artifacts = DirectoryArtifacts::new(root);

        let err = artifacts
            .write(Side::Left, "trunk/../../../outside", "x\n")
            .expect_err("parent component");
        assert!(matches!(err, Error::UnsafePath { .. }));
        assert!(!temp.path().join("outside.txt").exists());

        assert!(escapes_root("..\\a.c"));
        assert!(!escapes_root("src/..a.c"));
    }

    #[test]
    fn file_log_truncates_and_appends_lines() {
        let temp = TempDir::new().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(temp.path().join("bad-blames")).expect("utf8 path");
        fs::write(&path, "stale\n").expect("seed");

        let mut log = FileLog::create(path.clone()).expect("create");
        log.append_line("a.c").expect("append");
        let divergence = Divergence::new([MismatchKind::Author, MismatchKind::Content], 0);
        log.append_line(&format!("{}\tb.c", divergence.kind_list()))
            .expect("append");

        assert_eq!(
            fs::read_to_string(log.path()).expect("read"),
            "a.c\nContent,Author\tb.c\n"
        );
    }
}
