use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of disagreement found between two blames.
///
/// Declaration order is the canonical rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MismatchKind {
    /// The two blames have a different number of lines.
    LineCount,
    /// Revision or merged revision differs.
    Revision,
    /// Line text differs.
    Content,
    /// Line author differs.
    Author,
    /// Reported line number differs.
    LineNumber,
}

impl MismatchKind {
    /// Stable name used in result logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LineCount => "LineCount",
            Self::Revision => "Revision",
            Self::Content => "Content",
            Self::Author => "Author",
            Self::LineNumber => "LineNumber",
        }
    }
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First point of disagreement between two blames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// Every kind that failed at `index`.
    pub kinds: BTreeSet<MismatchKind>,
    /// Zero-based line index of the first divergence.
    pub index: usize,
}

impl Divergence {
    /// Build a divergence from the kinds failing at `index`.
    pub fn new(kinds: impl IntoIterator<Item = MismatchKind>, index: usize) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            index,
        }
    }

    /// The exclusive line-count divergence.
    pub fn line_count() -> Self {
        Self::new([MismatchKind::LineCount], 0)
    }

    /// Whether `kind` is part of the divergence.
    pub fn contains(&self, kind: MismatchKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Kinds joined with commas, e.g. `Content,Author`.
    pub fn kind_list(&self) -> String {
        self.kinds
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Result of comparing two blames of the same file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOutcome {
    /// Both blames agree on every checked field.
    Match,
    /// The blames diverge.
    Mismatch(Divergence),
}

impl ComparisonOutcome {
    /// Whether the outcome is a match.
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }

    /// The divergence, if any.
    pub const fn divergence(&self) -> Option<&Divergence> {
        match self {
            Self::Match => None,
            Self::Mismatch(divergence) => Some(divergence),
        }
    }
}

/// Switches for the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareOptions {
    /// Check revision and merged revision. Disable when the two sides number
    /// revisions differently.
    pub compare_revisions: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            compare_revisions: true,
        }
    }
}

/// Which of the two compared repositories something refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Source side of the migration.
    Left,
    /// Target side of the migration.
    Right,
}

impl Side {
    /// Both sides in reporting order.
    pub const BOTH: [Self; 2] = [Self::Left, Self::Right];

    /// Lowercase label used for artifact directories.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
