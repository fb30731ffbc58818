//! Locating the git executable.
//!
//! Candidates are tried in order: the configured path, `$GIT_PATH`, every
//! `PATH` entry, then a fixed list of common install locations.

use crate::error::{CoreError, Result};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const GIT_PATH_ENV: &str = "GIT_PATH";

/// Common install locations, checked after `PATH`
pub fn search_locations() -> Vec<PathBuf> {
    let mut locations: Vec<PathBuf> = [
        "/opt/local/bin/git",
        "/sw/bin/git",
        "/opt/git/bin/git",
        "/usr/local/bin/git",
        "/usr/local/git/bin/git",
        "/opt/homebrew/bin/git",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    if let Some(home) = dirs::home_dir() {
        locations.push(home.join("bin").join("git"));
    }
    locations.push(PathBuf::from("/usr/bin/git"));
    locations
}

/// Find git, preferring `configured` when it points at an executable
pub fn locate(configured: Option<&Path>) -> Result<PathBuf> {
    locate_in(
        configured,
        env::var_os(GIT_PATH_ENV),
        env::var_os("PATH"),
        &search_locations(),
    )
}

fn locate_in(
    configured: Option<&Path>,
    env_override: Option<OsString>,
    path_var: Option<OsString>,
    fallbacks: &[PathBuf],
) -> Result<PathBuf> {
    let mut searched = Vec::new();

    if let Some(configured) = configured {
        if is_executable(configured) {
            return Ok(configured.to_path_buf());
        }
        warn!(path = %configured.display(), "configured git executable is unusable, searching");
        searched.push(configured.to_path_buf());
    }

    let from_path = path_var
        .iter()
        .flat_map(env::split_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(executable_name()));

    let candidates = env_override
        .map(PathBuf::from)
        .into_iter()
        .chain(from_path)
        .chain(fallbacks.iter().cloned());

    for candidate in candidates {
        if is_executable(&candidate) {
            debug!(path = %candidate.display(), "found git executable");
            return Ok(candidate);
        }
        searched.push(candidate);
    }

    Err(CoreError::GitNotFound { searched })
}

fn executable_name() -> &'static str {
    if cfg!(windows) {
        "git.exe"
    } else {
        "git"
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
