use crate::error::{CoreError, Result};
use revlane_graph::{ParseMode, RefSpec, SortOrder, TraversalOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which refs a listing starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Branches, remotes, tags and stashes
    #[default]
    All,
    /// Local branches only
    Local,
}

impl Scope {
    pub fn roots(self) -> Vec<RefSpec> {
        match self {
            Scope::All => RefSpec::all_branches(),
            Scope::Local => RefSpec::local_branches(),
        }
    }
}

/// User settings, read from `config.toml`. Missing keys take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Overrides the git executable search
    pub git_executable: Option<PathBuf>,
    /// Rows loaded by a reload
    pub page_size: usize,
    /// Records buffered between the reader thread and the list
    pub window: usize,
    pub parse_mode: ParseMode,
    pub sort: SortOrder,
    pub scope: Scope,
}

impl Default for Config {
    fn default() -> Self {
        let traversal = TraversalOptions::default();
        Self {
            git_executable: None,
            page_size: traversal.page_size,
            window: traversal.window,
            parse_mode: traversal.parse_mode,
            sort: SortOrder::default(),
            scope: Scope::default(),
        }
    }
}

impl Config {
    /// `<config dir>/revlane/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("revlane").join("config.toml"))
    }

    /// Load `path`, or the default location when `None`.
    ///
    /// A missing file at the default location yields the defaults; an
    /// explicitly given file has to exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => match Self::default_path() {
                Some(path) => match Self::read(&path) {
                    Err(CoreError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                        debug!(path = %path.display(), "no config file, using defaults");
                        Ok(Self::default())
                    }
                    other => other,
                },
                None => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = Self::parse(&contents, path)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse(contents: &str, path: &Path) -> Result<Self> {
        toml::from_str(contents).map_err(|source| CoreError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn traversal_options(&self) -> TraversalOptions {
        TraversalOptions {
            parse_mode: self.parse_mode,
            window: self.window.max(1),
            page_size: self.page_size,
        }
    }
}
