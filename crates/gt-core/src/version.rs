use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A three-part `major.minor.patch` version.
///
/// Parsing is total: missing or non-numeric segments read as `0`, so a
/// garbled version string still compares, it just compares low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        let mut segments = trimmed.split('.').map(parse_segment);
        let major = segments.next().unwrap_or(0);
        let minor = segments.next().unwrap_or(0);
        let patch = segments.next().unwrap_or(0);
        Self::new(major, minor, patch)
    }

    /// Finds the first `X.Y` or `X.Y.Z` token in free-form tool output, e.g.
    /// `dolt version 1.82.4` or `bd version 0.47.1 (dev)`.
    pub fn find_in(output: &str) -> Option<Self> {
        output
            .split(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')')
            .map(|token| token.trim_start_matches(['v', 'V']))
            .find(|token| looks_like_version(token))
            .map(Self::parse)
    }

    pub fn at_least(&self, minimum: &Version) -> bool {
        self >= minimum
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Lexicographic over `(major, minor, patch)`.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

/// Compares two version strings, returning -1, 0 or 1.
pub fn compare_str(a: &str, b: &str) -> i32 {
    match compare(&Version::parse(a), &Version::parse(b)) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

fn parse_segment(segment: &str) -> u64 {
    let digits: String = segment
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.len() != segment.trim().len() && !segment.trim().contains('-') {
        // "12abc" is treated as garbage, "4-rc1" as a pre-release of 4
        return 0;
    }
    digits.parse().unwrap_or(0)
}

fn looks_like_version(token: &str) -> bool {
    let mut parts = token.split('.');
    let first = parts.next().unwrap_or_default();
    let second = parts.next();
    !first.is_empty()
        && first.chars().all(|c| c.is_ascii_digit())
        && second
            .map(|part| part.chars().next().is_some_and(|c| c.is_ascii_digit()))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_known_pairs() {
        assert_eq!(compare_str("1.82.4", "1.82.4"), 0);
        assert_eq!(compare_str("1.0.0", "1.82.4"), -1);
        assert_eq!(compare_str("10.20.30", "1.82.4"), 1);
    }

    #[test]
    fn comparison_is_antisymmetric_and_reflexive() {
        let samples = [
            "0.0.0", "0.0.1", "0.1.0", "1.0.0", "1.82.3", "1.82.4", "1.83.0", "2.0.0",
            "10.20.30",
        ];
        for a in samples {
            assert_eq!(compare_str(a, a), 0, "{a} vs itself");
            for b in samples {
                assert_eq!(
                    compare_str(a, b),
                    -compare_str(b, a),
                    "{a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn orders_by_major_then_minor_then_patch() {
        assert_eq!(
            compare(&Version::new(1, 82, 4), &Version::new(1, 9, 99)),
            Ordering::Greater
        );
        assert_eq!(
            compare(&Version::new(0, 9, 0), &Version::new(1, 0, 0)),
            Ordering::Less
        );
    }

    #[test]
    fn missing_and_garbage_segments_default_to_zero() {
        assert_eq!(Version::parse("1"), Version::new(1, 0, 0));
        assert_eq!(Version::parse("1.2"), Version::new(1, 2, 0));
        assert_eq!(Version::parse("x.y.z"), Version::new(0, 0, 0));
        assert_eq!(Version::parse(""), Version::new(0, 0, 0));
        assert_eq!(Version::parse("v1.82.4"), Version::new(1, 82, 4));
        assert_eq!(Version::parse("1.82.4-rc1"), Version::new(1, 82, 4));
        assert_eq!(Version::parse("1.2abc.3"), Version::new(1, 0, 3));
    }

    #[test]
    fn finds_version_in_tool_output() {
        assert_eq!(
            Version::find_in("dolt version 1.82.4\n"),
            Some(Version::new(1, 82, 4))
        );
        assert_eq!(
            Version::find_in("bd version v0.47.1 (dev)"),
            Some(Version::new(0, 47, 1))
        );
        assert_eq!(Version::find_in("no version here"), None);
        assert_eq!(Version::find_in("build 42"), None);
    }
}
