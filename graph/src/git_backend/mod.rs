pub mod enumerator;
pub mod parser;
pub mod reader;
pub mod request;

pub use enumerator::{Enumerator, ParseMode, TraversalOptions};
pub use parser::{parse_record, serialize_record, Field, ParseError};
pub use reader::{CancelToken, PlumbingCommand, PlumbingReader};
pub use request::{GitSource, RefSpec, SortOrder, TraversalRequest};

#[cfg(test)]
pub(crate) mod fixtures {
    use super::parser::{serialize_record, RECORD_TERMINATOR};
    use super::PlumbingCommand;
    use crate::core::{CommitId, CommitRecord};
    use git2::{Oid, Repository, Signature, Time};
    use std::io::Write;
    use std::process::Command;
    use tempfile::NamedTempFile;

    /// Records as the history command would print them
    pub fn stream(records: &[CommitRecord]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for r in records {
            bytes.extend(serialize_record(r));
            bytes.push(RECORD_TERMINATOR);
        }
        bytes
    }

    pub fn fixture(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    pub fn cat(file: &NamedTempFile) -> PlumbingCommand {
        PlumbingCommand::new("cat", std::env::temp_dir()).arg(file.path())
    }

    /// `sh -c script` with the fixture path as `$1`
    pub fn sh(script: &str, file: &NamedTempFile) -> PlumbingCommand {
        PlumbingCommand::new("sh", std::env::temp_dir())
            .args(["-c", script, "sh"])
            .arg(file.path())
    }

    pub fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Commit with a fixed signature time, not moving any ref
    pub fn commit_at(
        repo: &Repository,
        message: &str,
        parents: &[Oid],
        seconds: i64,
    ) -> Result<Oid, git2::Error> {
        let sig = Signature::new("Test User", "test@example.com", &Time::new(seconds, 0))?;
        let tree_id = repo.index()?.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let parents = parents
            .iter()
            .map(|oid| repo.find_commit(*oid))
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<_> = parents.iter().collect();
        repo.commit(None, &sig, &sig, message, &tree, &parent_refs)
    }

    pub fn id_of(oid: Oid) -> CommitId {
        CommitId::parse(&oid.to_string()).unwrap()
    }
}
