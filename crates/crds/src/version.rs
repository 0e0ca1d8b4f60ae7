//! Ledger release version parsing and comparison.
//!
//! Versions are declared in component specs as `major.minor.fixpack[-tag]`
//! strings. Missing components default to 0. Out-of-range or non-numeric
//! segments are coerced to 0 and logged, so a malformed spec never blocks
//! reconciliation.

use std::fmt;
use tracing::warn;

/// Parsed ledger release version.
///
/// The tag participates in strict ordering (`1.4.7 < 1.4.7-1`) but is
/// excluded from range-boundary checks via [`Version::equal_without_tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Version {
    /// Major release number
    pub major: u32,
    /// Minor release number
    pub minor: u32,
    /// Fixpack (patch) number
    pub fixpack: u32,
    /// Build tag, 0 when absent
    pub tag: u32,
}

impl Version {
    /// Parses a `major.minor.fixpack[-tag]` string.
    ///
    /// Missing dot-separated components default to 0. Segments that fail to
    /// parse as numbers are coerced to 0 with a warning rather than failing,
    /// since malformed version strings already exist in the wild.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (release, tag_str) = match s.split_once('-') {
            Some((r, t)) => (r, Some(t)),
            None => (s, None),
        };

        let mut parts = release.split('.');
        let major = Self::segment(s, parts.next());
        let minor = Self::segment(s, parts.next());
        let fixpack = Self::segment(s, parts.next());
        let tag = Self::segment(s, tag_str);

        Self {
            major,
            minor,
            fixpack,
            tag,
        }
    }

    fn segment(full: &str, part: Option<&str>) -> u32 {
        match part {
            None | Some("") => 0,
            Some(p) => match p.parse::<u32>() {
                Ok(n) => n,
                Err(_) => {
                    warn!(
                        "Unparsable segment {:?} in version string {:?}, treating as 0",
                        p, full
                    );
                    0
                }
            },
        }
    }

    /// True iff all four components match.
    #[must_use]
    pub fn equal(&self, other: &Self) -> bool {
        self == other
    }

    /// True iff major, minor and fixpack match, ignoring the tag.
    #[must_use]
    pub fn equal_without_tag(&self, other: &Self) -> bool {
        self.major == other.major && self.minor == other.minor && self.fixpack == other.fixpack
    }

    /// Strict lexicographic ordering, major through tag.
    #[must_use]
    pub fn less_than(&self, other: &Self) -> bool {
        self < other
    }

    /// Strict lexicographic ordering, major through tag.
    #[must_use]
    pub fn greater_than(&self, other: &Self) -> bool {
        self > other
    }

    /// True iff this version is at least `other`, ignoring tags on the
    /// boundary. Used by range checks in the version-transition table.
    #[must_use]
    pub fn at_least(&self, other: &Self) -> bool {
        self.equal_without_tag(other) || self.greater_than(other)
    }

    /// Buckets the version into a coarse major release epoch.
    ///
    /// Returns `"2"` for 2.x versions and `"1"` for everything else.
    #[must_use]
    pub fn major_release_epoch(&self) -> &'static str {
        match self.major {
            2 => "2",
            _ => "1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag == 0 {
            write!(f, "{}.{}.{}", self.major, self.minor, self.fixpack)
        } else {
            write!(
                f,
                "{}.{}.{}-{}",
                self.major, self.minor, self.fixpack, self.tag
            )
        }
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_version() {
        let v = Version::parse("2.4.1-1");
        assert_eq!(v.major, 2);
        assert_eq!(v.minor, 4);
        assert_eq!(v.fixpack, 1);
        assert_eq!(v.tag, 1);
    }

    #[test]
    fn missing_components_default_to_zero() {
        assert_eq!(Version::parse("1.4"), Version::parse("1.4.0"));
        assert_eq!(Version::parse("2"), Version::parse("2.0.0"));
        assert_eq!(Version::parse(""), Version::default());
    }

    #[test]
    fn unparsable_segments_coerce_to_zero() {
        assert_eq!(Version::parse("1.x.7"), Version::parse("1.0.7"));
        assert_eq!(Version::parse("1.4.7-rc1"), Version::parse("1.4.7"));
    }

    #[test]
    fn equality_includes_tag() {
        let v = Version::parse("1.4.7");
        assert!(v.equal(&Version::parse("1.4.7")));
        assert!(!v.equal(&Version::parse("1.4.7-1")));
        assert!(v.equal_without_tag(&Version::parse("1.4.7-1")));
    }

    #[test]
    fn ordering_is_lexicographic_through_tag() {
        assert!(Version::parse("1.4.7").less_than(&Version::parse("1.4.7-1")));
        assert!(!Version::parse("2.2.5-5").greater_than(&Version::parse("2.4.1-1")));
        assert!(Version::parse("2.4.1-1").greater_than(&Version::parse("2.2.5-5")));
    }

    #[test]
    fn epoch_buckets() {
        assert_eq!(Version::parse("1.4.9").major_release_epoch(), "1");
        assert_eq!(Version::parse("2.2.1").major_release_epoch(), "2");
        assert_eq!(Version::parse("3.0.0").major_release_epoch(), "1");
        assert_eq!(Version::parse("").major_release_epoch(), "1");
    }

    #[test]
    fn at_least_ignores_tag_on_boundary() {
        let boundary = Version::parse("2.4.1");
        assert!(Version::parse("2.4.1-1").at_least(&boundary));
        assert!(Version::parse("2.4.1").at_least(&boundary));
        assert!(Version::parse("2.5.0").at_least(&boundary));
        assert!(!Version::parse("2.4.0-9").at_least(&boundary));
    }
}
