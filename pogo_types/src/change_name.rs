use std::fmt;

use anyhow::{bail, Result};

/// 32-symbol alphabet for change names, deliberately missing the letters and
/// digits that are easy to confuse with one another (no `B`/`8`, no `O`/`0`,
/// no `l`/`1`, and so on).
pub const CHANGE_NAME_ALPHABET: &[u8; 32] = b"abcdefhkmnprwxyACDEFHJKLMNPRXY34";
pub const CHANGE_NAME_LEN: usize = 16;

/// A repository-unique, visually unambiguous identifier for a [`Change`].
///
/// [`Change`]: crate::Change
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Serialize, serde::Deserialize)]
pub struct ChangeName(String);

impl ChangeName {
    /// Validate a string against the alphabet and length. Generation of new,
    /// random names lives in `change_graph`, which also owns collision
    /// retry against the database.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.len() != CHANGE_NAME_LEN {
            bail!(
                "change name must be {} characters, got {}",
                CHANGE_NAME_LEN,
                raw.len()
            );
        }
        if !raw.bytes().all(|b| CHANGE_NAME_ALPHABET.contains(&b)) {
            bail!("change name '{}' uses characters outside the alphabet", raw);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ChangeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeName({})", self.0)
    }
}

/// The shortest prefix of `name` that is not a prefix of any `other` name.
/// Returns the full name if every shorter prefix collides with something.
pub fn unique_prefix(name: &str, others: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    let others: Vec<String> = others
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .filter(|s| s != name)
        .collect();
    for len in 1..=name.len() {
        let candidate = &name[..len];
        if !others.iter().any(|other| other.starts_with(candidate)) {
            return candidate.to_string();
        }
    }
    name.to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        assert!(ChangeName::new("abc").is_err());
    }

    #[test]
    fn rejects_ambiguous_letters() {
        // 'B' is not in the alphabet (only uppercase non-ambiguous letters are).
        let mut s = "a".repeat(CHANGE_NAME_LEN);
        s.replace_range(0..1, "B");
        assert!(ChangeName::new(s).is_err());
    }

    #[test]
    fn accepts_valid_name() {
        let name = "abcdefhkmnprwxyA";
        assert_eq!(name.len(), CHANGE_NAME_LEN);
        assert!(ChangeName::new(name).is_ok());
    }

    #[test]
    fn unique_prefix_picks_shortest_disambiguator() {
        assert_eq!(unique_prefix("abcdef", ["abczzz", "xyz"]), "abcd");
        assert_eq!(unique_prefix("abcdef", ["xyz"]), "a");
        assert_eq!(unique_prefix("abcdef", ["abcdef"]), "abcdef");
    }
}
