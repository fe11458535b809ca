use serde::{Deserialize, Serialize};

/// Revision identifier as reported by a blame source.
pub type RevisionNumber = u64;

/// Provenance of a single line at a point in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlameLine {
    /// 1-based line number reported by the source.
    pub line_number: u32,
    /// Line content without its terminator.
    pub text: String,
    /// Author of the revision that last touched the line.
    pub author: String,
    /// Revision that last touched the line.
    pub revision: RevisionNumber,
    /// Revision the line was merged in at, when the source tracks merges.
    #[serde(default)]
    pub merged_revision: Option<RevisionNumber>,
}

impl BlameLine {
    /// Convenience constructor for lines without merge attribution.
    pub fn new(
        line_number: u32,
        text: impl Into<String>,
        author: impl Into<String>,
        revision: RevisionNumber,
    ) -> Self {
        Self {
            line_number,
            text: text.into(),
            author: author.into(),
            revision,
            merged_revision: None,
        }
    }

    /// Attach a merged revision to the line.
    #[must_use]
    pub fn merged_at(mut self, revision: RevisionNumber) -> Self {
        self.merged_revision = Some(revision);
        self
    }

    /// Revision shown in rendered blame: the merged revision when present.
    pub const fn display_revision(&self) -> RevisionNumber {
        match self.merged_revision {
            Some(merged) => merged,
            None => self.revision,
        }
    }
}

/// Ordered blame of a whole file, index-aligned with the file's lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlame {
    /// Lines in file order.
    #[serde(default)]
    pub lines: Vec<BlameLine>,
}

impl FileBlame {
    /// Blame with no lines, used when a file cannot be blamed.
    pub const fn empty() -> Self {
        Self { lines: Vec::new() }
    }

    /// Number of lines in the blame.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the blame has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Iterate over the lines in order.
    pub fn iter(&self) -> std::slice::Iter<'_, BlameLine> {
        self.lines.iter()
    }
}

impl From<Vec<BlameLine>> for FileBlame {
    fn from(lines: Vec<BlameLine>) -> Self {
        Self { lines }
    }
}

impl FromIterator<BlameLine> for FileBlame {
    fn from_iter<I: IntoIterator<Item = BlameLine>>(iter: I) -> Self {
        Self {
            lines: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FileBlame {
    type Item = &'a BlameLine;
    type IntoIter = std::slice::Iter<'a, BlameLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}
