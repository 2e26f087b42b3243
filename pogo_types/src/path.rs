use std::fmt;

use anyhow::{bail, Result};

/// A repository-relative path, always forward-slash separated regardless of
/// the host OS, never empty, and never `.`/`..`-escaping.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Serialize, serde::Deserialize)]
pub struct RepoPath(String);

impl RepoPath {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into().replace('\\', "/");
        if raw.is_empty() {
            bail!("repository path must not be empty");
        }
        if raw.starts_with('/') {
            bail!("repository path '{}' must be relative", raw);
        }
        for component in raw.split('/') {
            if component.is_empty() {
                bail!("repository path '{}' has an empty component", raw);
            }
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True once `..`, applied left to right, would walk above the
    /// repository root. Used both for symlink-target validation (`§4.6`)
    /// and for generic path-escape checks.
    pub fn escapes_root(raw: &str) -> bool {
        let mut depth: i64 = 0;
        for component in raw.replace('\\', "/").split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    depth -= 1;
                    if depth < 0 {
                        return true;
                    }
                }
                _ => depth += 1,
            }
        }
        false
    }

    /// `path.<suffix>`, used for binary-conflict sibling files (`§4.8`).
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self(format!("{}.{}", self.0, suffix))
    }

    /// True if `self` is exactly `base` with a `.<something>` suffix
    /// appended; used by the name-based binary-conflict recognizer.
    pub fn conflict_suffix_of<'a>(&'a self, base: &str) -> Option<&'a str> {
        self.0
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('.'))
            .filter(|suffix| !suffix.is_empty())
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoPath({})", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalizes_backslashes() {
        let p = RepoPath::new("a\\b\\c").unwrap();
        assert_eq!(p.as_str(), "a/b/c");
    }

    #[test]
    fn rejects_absolute() {
        assert!(RepoPath::new("/etc/passwd").is_err());
    }

    #[test]
    fn detects_root_escape() {
        assert!(RepoPath::escapes_root("../outside"));
        assert!(RepoPath::escapes_root("a/../../outside"));
        assert!(!RepoPath::escapes_root("a/../b"));
        assert!(!RepoPath::escapes_root("a/b/../c"));
    }

    #[test]
    fn conflict_suffix_detection() {
        let p = RepoPath::new("img.bin.qr7hD4a2").unwrap();
        assert_eq!(p.conflict_suffix_of("img.bin"), Some("qr7hD4a2"));
        assert_eq!(p.conflict_suffix_of("other.bin"), None);
    }
}
