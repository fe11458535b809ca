use serde::{Deserialize, Serialize};

/// Ordered list of file paths, relative to the compared branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathSet {
    paths: Vec<String>,
}

impl PathSet {
    /// Wrap an already ordered list of paths.
    pub const fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }

    /// Parse a newline-delimited path list, skipping blank lines.
    pub fn parse(text: &str) -> Self {
        let paths = text
            .lines()
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.trim().is_empty())
            .map(str::to_owned)
            .collect();
        Self { paths }
    }

    /// Render the list one path per line.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for path in &self.paths {
            text.push_str(path);
            text.push('\n');
        }
        text
    }

    /// Number of paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the set has no paths.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterate over the paths in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.paths.iter().map(String::as_str)
    }

    /// Borrow the paths as a slice.
    pub fn as_slice(&self) -> &[String] {
        &self.paths
    }
}

impl From<Vec<String>> for PathSet {
    fn from(paths: Vec<String>) -> Self {
        Self::new(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_blank_lines_and_carriage_returns() {
        let set = PathSet::parse("a.txt\r\n\n   \ndir/b.txt\n");
        assert_eq!(set.as_slice(), ["a.txt", "dir/b.txt"]);
    }

    #[test]
    fn text_rendering_is_line_per_path() {
        let set = PathSet::new(vec!["a.txt".into(), "dir/b.txt".into()]);
        assert_eq!(set.to_text(), "a.txt\ndir/b.txt\n");
        assert_eq!(PathSet::parse(&set.to_text()), set);
    }

    #[test]
    fn empty_set() {
        let set = PathSet::parse("\n\n");
        assert!(set.is_empty());
        assert_eq!(set.to_text(), "");
    }
}
