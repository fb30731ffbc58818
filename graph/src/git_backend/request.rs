use super::parser::LOG_FORMAT;
use super::reader::PlumbingCommand;
use crate::core::CommitId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where traversal starts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefSpec {
    /// Every ref matching a shell glob, e.g. `refs/heads/*`
    Glob(String),
    Literal(CommitId),
}

impl RefSpec {
    pub fn glob(pattern: impl Into<String>) -> Self {
        RefSpec::Glob(pattern.into())
    }

    pub fn local_branches() -> Vec<RefSpec> {
        vec![RefSpec::glob("refs/heads/*")]
    }

    /// Branches, remotes, tags and stashes. Notes refs are left out on purpose.
    pub fn all_branches() -> Vec<RefSpec> {
        vec![
            RefSpec::glob("refs/heads/*"),
            RefSpec::glob("refs/remotes/*"),
            RefSpec::glob("refs/tags/*"),
            RefSpec::glob("refs/stash*"),
        ]
    }

    pub fn to_arg(&self) -> String {
        match self {
            RefSpec::Glob(pattern) => format!("--glob={}", pattern),
            RefSpec::Literal(id) => id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Children before parents, in the tool's native graph order
    #[default]
    Topo,
    /// Newest committer timestamp first, ties by id
    Time,
}

impl SortOrder {
    fn flag(self) -> &'static str {
        match self {
            SortOrder::Topo => "--topo-order",
            SortOrder::Time => "--date-order",
        }
    }
}

/// The git executable and the working tree it runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSource {
    pub program: PathBuf,
    pub workdir: PathBuf,
}

impl GitSource {
    pub fn new(program: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            workdir: workdir.into(),
        }
    }
}

/// One history listing: roots, order and pass-through filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalRequest {
    pub roots: Vec<RefSpec>,
    pub sort: SortOrder,
    /// Extra revision options (`--author=…`, `-S…`), passed through unmodified
    pub filters: Vec<String>,
    pub paths: Vec<PathBuf>,
}

impl TraversalRequest {
    pub fn new(roots: Vec<RefSpec>, sort: SortOrder) -> Self {
        Self {
            roots,
            sort,
            filters: Vec::new(),
            paths: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.paths = paths;
        self
    }

    pub fn has_path_limiter(&self) -> bool {
        !self.paths.is_empty()
    }

    pub fn command(&self, source: &GitSource) -> PlumbingCommand {
        PlumbingCommand::new(&source.program, &source.workdir)
            .args(["log", "-z", "--no-color", "--encoding=UTF-8"])
            .arg(format!("--format={}", LOG_FORMAT))
            .arg(self.sort.flag())
            .args(self.roots.iter().map(RefSpec::to_arg))
            .args(&self.filters)
            .arg("--")
            .args(&self.paths)
    }
}
