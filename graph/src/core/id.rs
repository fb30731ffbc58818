use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Minimum number of hex digits in a commit hash (SHA-1).
pub const MIN_HEX_LEN: usize = 40;

/// Length of the abbreviated form shown in lists.
pub const SHORT_LEN: usize = 7;

/// Identity of a commit: the content hash exactly as the plumbing printed it.
///
/// Comparison is byte-wise on the stored text. Upper and lower case hex are
/// both accepted but never folded, so `ABC…` and `abc…` are different ids.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitId(Arc<str>);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidCommitId {
    #[error("commit id is {0} characters, expected at least {MIN_HEX_LEN}")]
    TooShort(usize),
    #[error("commit id has odd length {0}")]
    OddLength(usize),
    #[error("commit id contains non-hex character {0:?}")]
    NotHex(char),
}

impl CommitId {
    pub fn parse(text: &str) -> Result<Self, InvalidCommitId> {
        if text.len() < MIN_HEX_LEN {
            return Err(InvalidCommitId::TooShort(text.len()));
        }
        if let Some(bad) = text.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(InvalidCommitId::NotHex(bad));
        }
        if text.len() % 2 != 0 {
            return Err(InvalidCommitId::OddLength(text.len()));
        }
        Ok(Self(Arc::from(text)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated id for display
    pub fn short(&self) -> &str {
        &self.0[..SHORT_LEN.min(self.0.len())]
    }
}

impl FromStr for CommitId {
    type Err = InvalidCommitId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.short())
    }
}

impl AsRef<str> for CommitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for CommitId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
pub(crate) fn test_id(n: u32) -> CommitId {
    CommitId::parse(&format!("{:040x}", n)).unwrap()
}
