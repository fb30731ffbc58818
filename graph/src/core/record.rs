use super::id::CommitId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use smallvec::SmallVec;

/// Parent list; most commits have one parent, merges two.
pub type Parents = SmallVec<[CommitId; 2]>;

/// One commit as read from the plumbing output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    /// Commit hash
    pub id: CommitId,
    /// Parent hashes in parent order
    pub parents: Parents,
    /// Author name
    pub author: String,
    /// Committer name
    pub committer: String,
    /// Committer timestamp
    pub timestamp: DateTime<Utc>,
    /// First line of the message
    pub subject: String,
    /// Full raw message
    pub message: String,
}

impl CommitRecord {
    pub fn new(
        id: CommitId,
        parents: Parents,
        author: String,
        committer: String,
        timestamp: DateTime<Utc>,
        subject: String,
        message: String,
    ) -> Self {
        Self {
            id,
            parents,
            author,
            committer,
            timestamp,
            subject,
            message,
        }
    }

    /// Check if this is a root commit (no parents)
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Check if this is a merge commit (multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}
