use crate::core::CommitId;
use crate::git_backend::ParseError;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The executable or the working directory is unusable
    #[error("failed to start {program}: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The history command failed; everything it printed is discarded
    #[error("history command failed ({}): {stderr}", describe_exit(.code))]
    ProcessExit { code: Option<i32>, stderr: String },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("traversal cancelled")]
    Cancelled,

    /// The commit is not part of the rows loaded so far
    #[error("commit {0} is not loaded")]
    NotMaterialized(CommitId),

    #[error("history is stale, reload it")]
    ReloadRequired,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "killed by signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_error_mentions_status_and_stderr() {
        let err = GraphError::ProcessExit {
            code: Some(128),
            stderr: "fatal: bad revision 'nope'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "history command failed (exit status 128): fatal: bad revision 'nope'"
        );
    }
}
