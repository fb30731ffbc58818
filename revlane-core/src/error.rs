use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("invalid commit id: {0}")]
    InvalidId(#[from] revlane_graph::core::InvalidCommitId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Every candidate location, in the order they were tried
    #[error("could not find a git executable; searched: {}", list_paths(.searched))]
    GitNotFound { searched: Vec<PathBuf> },
}

fn list_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, CoreError>;
