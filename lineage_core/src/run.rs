//! Orchestrates a comparison run over a reconciled path set.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compare::BlameComparator;
use crate::reconcile::PathReconciler;
use crate::report::DivergenceReporter;
use crate::{
    BlameSource, CompareOptions, ComparisonOutcome, Divergence, Error, FileBlame, PathSet, Result,
    RevisionNumber, Side, SourceError, SourceResult,
};

/// One side of the comparison: a source, a branch under its root and a revision.
#[derive(Clone, Copy)]
pub struct SideSpec<'a> {
    /// Backend serving this side.
    pub source: &'a dyn BlameSource,
    /// Sub-path under the source root; empty for the root itself.
    pub branch: &'a str,
    /// Revision compared on this side.
    pub revision: RevisionNumber,
}

impl<'a> SideSpec<'a> {
    /// Describe a side.
    #[must_use]
    pub fn new(source: &'a dyn BlameSource, branch: &'a str, revision: RevisionNumber) -> Self {
        Self {
            source,
            branch,
            revision,
        }
    }

    /// Branch-qualified location of `path` relative to the source root.
    #[must_use]
    pub fn location(&self, path: &str) -> String {
        let branch = self.branch.trim_matches('/');
        if branch.is_empty() {
            path.to_owned()
        } else {
            format!("{branch}/{path}")
        }
    }
}

impl fmt::Debug for SideSpec<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideSpec")
            .field("source", &self.source.id())
            .field("root", &self.source.root())
            .field("branch", &self.branch)
            .field("revision", &self.revision)
            .finish()
    }
}

/// Revisions requested for the two sides; unset sides fall back to a common
/// revision both repositories have.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevisionSelection {
    /// Revision applied to both sides.
    pub both: Option<RevisionNumber>,
    /// Left-side override.
    pub left: Option<RevisionNumber>,
    /// Right-side override.
    pub right: Option<RevisionNumber>,
}

impl RevisionSelection {
    /// Resolve to concrete `(left, right)` revisions.
    ///
    /// Side-specific values win over `both`. If a side is still unset, it gets
    /// the smaller of the two sources' latest revisions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] if a latest revision has to be queried and
    /// the query fails.
    pub fn resolve(
        &self,
        left: &dyn BlameSource,
        right: &dyn BlameSource,
    ) -> Result<(RevisionNumber, RevisionNumber)> {
        let left_revision = self.left.or(self.both);
        let right_revision = self.right.or(self.both);
        if let (Some(l), Some(r)) = (left_revision, right_revision) {
            return Ok((l, r));
        }

        let latest = |side: Side, source: &dyn BlameSource| {
            source
                .latest_revision()
                .map_err(|source| Error::Source {
                    side,
                    operation: "query latest revision",
                    source,
                })
        };
        let common = latest(Side::Left, left)?.min(latest(Side::Right, right)?);
        info!(common, "using common revision");

        Ok((
            left_revision.unwrap_or(common),
            right_revision.unwrap_or(common),
        ))
    }
}

/// Where the run gets its paths from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPlan {
    /// List both sides and reconcile them first.
    Reconcile,
    /// Use a known path list; reconciliation is skipped.
    Provided(PathSet),
}

/// Per-file result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Blames agree.
    Match,
    /// Blames diverge.
    Mismatch(Divergence),
    /// Blame could not be fetched; the file was not compared.
    Failed {
        /// Description of the failure.
        cause: String,
    },
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Paths in the run's path set.
    pub total: usize,
    /// Paths processed before the run ended.
    pub compared: usize,
    /// Files whose blames agree.
    pub matches: usize,
    /// Files whose blames diverge.
    pub mismatches: usize,
    /// Files whose blame could not be fetched.
    pub failures: usize,
    /// Whether the run stopped early on cancellation.
    #[serde(default)]
    pub cancelled: bool,
}

/// Shared flag that asks a run to stop before its next file.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The shared flag, for code that sets it directly such as a signal
    /// handler registered with `signal_hook::flag::register`.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}

/// Fetch blame, mapping "cannot be blamed" errors to an empty blame.
///
/// # Errors
///
/// Returns every source error other than binary, missing or non-file entries.
pub fn fetch_blame(
    source: &dyn BlameSource,
    location: &str,
    revision: RevisionNumber,
) -> SourceResult<FileBlame> {
    match source.blame(location, revision) {
        Err(err) if err.is_unblameable() => {
            debug!(source = source.id(), location, %err, "no blame available");
            Ok(FileBlame::empty())
        }
        other => other,
    }
}

struct FetchFailure {
    side: Side,
    location: String,
    source: SourceError,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.side, self.location, self.source)
    }
}

struct FileComparison {
    location: String,
    left: FileBlame,
    right: FileBlame,
    outcome: ComparisonOutcome,
}

/// Drives reconciliation, per-file comparison and reporting.
pub struct RunController<'a> {
    left: SideSpec<'a>,
    right: SideSpec<'a>,
    comparator: BlameComparator,
    reporter: DivergenceReporter<'a>,
    cancellation: CancellationToken,
}

impl<'a> RunController<'a> {
    /// Construct a controller comparing `left` against `right`.
    #[must_use]
    pub fn new(
        left: SideSpec<'a>,
        right: SideSpec<'a>,
        options: CompareOptions,
        reporter: DivergenceReporter<'a>,
    ) -> Self {
        Self {
            left,
            right,
            comparator: BlameComparator::new(options),
            reporter,
            cancellation: CancellationToken::new(),
        }
    }

    /// Stop the run before the next file once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Execute a run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PathSetMismatch`] or [`Error::Source`] when
    /// reconciliation fails, before any file is compared, and sink errors
    /// raised while reporting.
    pub fn run(&mut self, plan: PathPlan) -> Result<RunSummary> {
        let paths = match plan {
            PathPlan::Reconcile => PathReconciler::new().reconcile(&self.left, &self.right)?,
            PathPlan::Provided(paths) => paths,
        };
        self.run_paths(&paths)
    }

    /// Compare every path in `paths`, assuming both sides track them.
    ///
    /// # Errors
    ///
    /// Returns sink errors raised while reporting.
    pub fn run_paths(&mut self, paths: &PathSet) -> Result<RunSummary> {
        self.reporter.reset()?;

        let mut summary = RunSummary {
            total: paths.len(),
            ..RunSummary::default()
        };

        for (index, path) in paths.iter().enumerate() {
            if self.cancellation.is_cancelled() {
                warn!(index, total = summary.total, "run cancelled");
                summary.cancelled = true;
                break;
            }

            info!(index, total = summary.total, path, "comparing");
            summary.compared += 1;

            match self.compare_file(path) {
                Ok(comparison) => match &comparison.outcome {
                    ComparisonOutcome::Match => summary.matches += 1,
                    ComparisonOutcome::Mismatch(divergence) => {
                        summary.mismatches += 1;
                        warn!(
                            path,
                            kinds = %divergence.kind_list(),
                            mismatches = summary.mismatches,
                            "blame mismatch"
                        );
                        self.reporter.report_mismatch(
                            path,
                            &comparison.location,
                            divergence,
                            &comparison.left,
                            &comparison.right,
                        )?;
                    }
                },
                Err(failure) => {
                    summary.failures += 1;
                    warn!(path, %failure, failures = summary.failures, "blame unavailable");
                    self.reporter.report_failure(path, &failure.to_string())?;
                }
            }
        }

        info!(
            compared = summary.compared,
            mismatches = summary.mismatches,
            failures = summary.failures,
            "run finished"
        );
        Ok(summary)
    }

    /// Fetch and compare a single path without reporting it.
    #[must_use]
    pub fn compare_path(&self, path: &str) -> FileOutcome {
        match self.compare_file(path) {
            Ok(comparison) => match comparison.outcome {
                ComparisonOutcome::Match => FileOutcome::Match,
                ComparisonOutcome::Mismatch(divergence) => FileOutcome::Mismatch(divergence),
            },
            Err(failure) => FileOutcome::Failed {
                cause: failure.to_string(),
            },
        }
    }

    fn compare_file(&self, path: &str) -> std::result::Result<FileComparison, FetchFailure> {
        let left = Self::fetch(Side::Left, &self.left, path)?;
        let right = Self::fetch(Side::Right, &self.right, path)?;
        let outcome = self.comparator.compare(&left, &right);
        Ok(FileComparison {
            location: self.left.location(path),
            left,
            right,
            outcome,
        })
    }

    fn fetch(
        side: Side,
        spec: &SideSpec<'_>,
        path: &str,
    ) -> std::result::Result<FileBlame, FetchFailure> {
        let location = spec.location(path);
        fetch_blame(spec.source, &location, spec.revision).map_err(|source| FetchFailure {
            side,
            location,
            source,
        })
    }
}

impl fmt::Debug for RunController<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunController")
            .field("left", &self.left)
            .field("right", &self.right)
            .field("comparator", &self.comparator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryArtifacts;
    use crate::{BlameLine, MemorySource, MismatchKind};

    fn line(number: u32, text: &str, author: &str) -> BlameLine {
        BlameLine::new(number, text, author, 5)
    }

    #[test]
    fn location_joins_branch() {
        let source = MemorySource::new("mem");
        assert_eq!(SideSpec::new(&source, "", 1).location("a.c"), "a.c");
        assert_eq!(SideSpec::new(&source, "/trunk/", 1).location("a.c"), "trunk/a.c");
    }

    #[test]
    fn revision_selection_prefers_side_overrides() {
        let left = MemorySource::new("l").with_latest(10);
        let right = MemorySource::new("r").with_latest(8);

        let selection = RevisionSelection {
            both: Some(4),
            left: Some(6),
            right: None,
        };
        assert_eq!(selection.resolve(&left, &right).expect("resolve"), (6, 4));
    }

    #[test]
    fn revision_selection_detects_common_revision() {
        let left = MemorySource::new("l").with_latest(10);
        let right = MemorySource::new("r").with_latest(8);

        let detected = RevisionSelection::default()
            .resolve(&left, &right)
            .expect("resolve");
        assert_eq!(detected, (8, 8));

        let partial = RevisionSelection {
            left: Some(9),
            ..RevisionSelection::default()
        };
        assert_eq!(partial.resolve(&left, &right).expect("resolve"), (9, 8));
    }

    #[test]
    fn fetch_blame_treats_known_kinds_as_empty() {
        let source = MemorySource::new("mem")
            .with_binary("logo.png")
            .with_directory("src")
            .with_failing("broken.c", "connection reset");

        assert!(fetch_blame(&source, "logo.png", 1).expect("binary").is_empty());
        assert!(fetch_blame(&source, "src", 1).expect("directory").is_empty());
        assert!(fetch_blame(&source, "missing.c", 1).expect("missing").is_empty());
        assert!(fetch_blame(&source, "broken.c", 1).is_err());
    }

    #[test]
    fn compare_path_distinguishes_failures_from_matches() {
        let left = MemorySource::new("l")
            .with_file("a.c", vec![line(1, "x", "bob")])
            .with_failing("b.c", "connection reset");
        let right = MemorySource::new("r")
            .with_file("a.c", vec![line(1, "x", "alice")])
            .with_file("b.c", vec![line(1, "y", "bob")]);

        let mut simple: Vec<String> = Vec::new();
        let mut enhanced: Vec<String> = Vec::new();
        let mut artifacts = MemoryArtifacts::new();
        let reporter = DivergenceReporter::new(&mut simple, &mut enhanced, &mut artifacts);
        let controller = RunController::new(
            SideSpec::new(&left, "", 1),
            SideSpec::new(&right, "", 1),
            CompareOptions::default(),
            reporter,
        );

        assert_eq!(
            controller.compare_path("a.c"),
            FileOutcome::Mismatch(Divergence::new([MismatchKind::Author], 0))
        );
        match controller.compare_path("b.c") {
            FileOutcome::Failed { cause } => {
                assert_eq!(cause, "left b.c: connection reset");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn setting_the_flag_cancels_the_token() {
        let token = CancellationToken::new();
        let flag = token.flag();
        flag.store(true, Ordering::SeqCst);
        assert!(token.is_cancelled());
        assert!(Arc::ptr_eq(&flag, &token.clone().flag()));
    }

    #[test]
    fn summary_serializes() {
        let summary = RunSummary {
            total: 3,
            compared: 3,
            matches: 1,
            mismatches: 1,
            failures: 1,
            cancelled: false,
        };
        let json = serde_json::to_string(&summary).expect("serialize summary");
        let decoded: RunSummary = serde_json::from_str(&json).expect("deserialize summary");
        assert_eq!(summary, decoded);
    }
}
