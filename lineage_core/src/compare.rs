//! Positional comparison of two blames of the same file.

use std::collections::BTreeSet;

use crate::{BlameLine, CompareOptions, ComparisonOutcome, Divergence, FileBlame, MismatchKind};

/// Compares two blames line by line and reports the first divergence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlameComparator {
    options: CompareOptions,
}

impl BlameComparator {
    /// Construct a comparator with the given options.
    #[must_use]
    pub const fn new(options: CompareOptions) -> Self {
        Self { options }
    }

    /// Options in effect.
    #[must_use]
    pub const fn options(&self) -> CompareOptions {
        self.options
    }

    /// Compare `left` against `right`.
    ///
    /// Differing lengths yield an exclusive [`MismatchKind::LineCount`] at
    /// index 0. Otherwise the result carries every kind failing at the first
    /// index where any check fails; later lines are not inspected.
    #[must_use]
    pub fn compare(&self, left: &FileBlame, right: &FileBlame) -> ComparisonOutcome {
        if left.len() != right.len() {
            return ComparisonOutcome::Mismatch(Divergence::line_count());
        }

        left.iter()
            .zip(right.iter())
            .enumerate()
            .find_map(|(index, (left_line, right_line))| {
                let kinds = self.failing_kinds(left_line, right_line);
                (!kinds.is_empty()).then_some(Divergence { kinds, index })
            })
            .map_or(ComparisonOutcome::Match, ComparisonOutcome::Mismatch)
    }

    fn failing_kinds(&self, left: &BlameLine, right: &BlameLine) -> BTreeSet<MismatchKind> {
        let mut kinds = BTreeSet::new();
        if self.options.compare_revisions
            && (left.revision != right.revision || left.merged_revision != right.merged_revision)
        {
            kinds.insert(MismatchKind::Revision);
        }
        if left.text != right.text {
            kinds.insert(MismatchKind::Content);
        }
        if left.author != right.author {
            kinds.insert(MismatchKind::Author);
        }
        if left.line_number != right.line_number {
            kinds.insert(MismatchKind::LineNumber);
        }
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blame(lines: &[(&str, &str, u64)]) -> FileBlame {
        lines
            .iter()
            .zip(1_u32..)
            .map(|(&(text, author, revision), number)| {
                BlameLine::new(number, text, author, revision)
            })
            .collect()
    }

    fn sample() -> FileBlame {
        blame(&[("a", "bob", 5), ("b", "bob", 5), ("c", "carol", 7)])
    }

    fn compare(left: &FileBlame, right: &FileBlame) -> ComparisonOutcome {
        BlameComparator::default().compare(left, right)
    }

    #[test]
    fn identical_blames_match() {
        assert_eq!(compare(&sample(), &sample()), ComparisonOutcome::Match);
        assert_eq!(
            compare(&FileBlame::empty(), &FileBlame::empty()),
            ComparisonOutcome::Match
        );
    }

    #[test]
    fn author_difference_is_reported_at_its_index() {
        for index in 0..3 {
            let mut right = sample();
            right.lines[index].author = "alice".into();
            assert_eq!(
                compare(&sample(), &right),
                ComparisonOutcome::Mismatch(Divergence::new([MismatchKind::Author], index)),
                "index {index}"
            );
        }
    }

    #[test]
    fn length_difference_is_exclusive_line_count() {
        let left = sample();
        let mut right = sample();
        right.lines.push(BlameLine::new(4, "d", "dave", 9));
        right.lines[0].author = "alice".into();

        let outcome = compare(&left, &right);
        assert_eq!(outcome, ComparisonOutcome::Mismatch(Divergence::line_count()));

        let outcome = compare(&right, &FileBlame::empty());
        assert_eq!(outcome, ComparisonOutcome::Mismatch(Divergence::line_count()));
    }

    #[test]
    fn simultaneous_differences_are_collected_at_first_index_only() {
        let left = sample();
        let mut right = sample();
        right.lines[1].author = "alice".into();
        right.lines[1].text = "B".into();
        right.lines[2].revision = 8;
        right.lines[2].line_number = 30;

        let outcome = compare(&left, &right);
        let divergence = outcome.divergence().expect("mismatch");
        assert_eq!(divergence.index, 1);
        assert_eq!(
            divergence.kinds,
            BTreeSet::from([MismatchKind::Content, MismatchKind::Author])
        );
    }

    #[test]
    fn merged_revision_counts_as_revision_difference() {
        let left = sample();
        let mut right = sample();
        right.lines[0].merged_revision = Some(6);

        assert_eq!(
            compare(&left, &right),
            ComparisonOutcome::Mismatch(Divergence::new([MismatchKind::Revision], 0))
        );
    }

    #[test]
    fn disabling_revision_checks_hides_revision_differences() {
        let left = sample();
        let mut right = sample();
        for line in &mut right.lines {
            line.revision += 100;
            line.merged_revision = Some(200);
        }

        let comparator = BlameComparator::new(CompareOptions {
            compare_revisions: false,
        });
        assert_eq!(comparator.compare(&left, &right), ComparisonOutcome::Match);

        right.lines[2].line_number = 9;
        assert_eq!(
            comparator.compare(&left, &right),
            ComparisonOutcome::Mismatch(Divergence::new([MismatchKind::LineNumber], 2))
        );
    }

    #[test]
    fn every_field_can_fail_together() {
        let left = blame(&[("a", "bob", 5)]);
        let mut right = blame(&[("z", "alice", 6)]);
        right.lines[0].line_number = 2;

        let divergence = compare(&left, &right).divergence().cloned().expect("mismatch");
        assert_eq!(divergence.kind_list(), "Revision,Content,Author,LineNumber");
        assert_eq!(divergence.index, 0);
    }
}
