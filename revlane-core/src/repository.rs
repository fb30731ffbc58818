use crate::error::{CoreError, Result};
use git2::{BranchType, ErrorCode, Repository as Git2Repository};
use revlane_graph::{CommitId, GitSource, RefSpec};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    /// Detached HEAD
    Head,
    Branch,
    Remote,
    Tag,
}

/// A ref pointing at a commit, for decorating rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefInfo {
    pub name: String,
    pub kind: RefKind,
    /// The branch HEAD points to
    pub is_head: bool,
}

impl RefInfo {
    pub fn label(&self) -> String {
        match (self.kind, self.is_head) {
            (RefKind::Branch, true) => format!("HEAD -> {}", self.name),
            (RefKind::Tag, _) => format!("tag: {}", self.name),
            _ => self.name.clone(),
        }
    }
}

/// The repository a history listing runs against
pub struct Repository {
    git_repo: Git2Repository,
    workdir: PathBuf,
}

impl Repository {
    /// Find the repository containing `path`
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let git_repo = Git2Repository::discover(path).map_err(|err| match err.code() {
            ErrorCode::NotFound => CoreError::NotARepository(path.to_path_buf()),
            _ => CoreError::Git(err),
        })?;
        // bare repositories have no working tree; git runs in the git dir
        let workdir = git_repo
            .workdir()
            .unwrap_or_else(|| git_repo.path())
            .to_path_buf();
        Ok(Self { git_repo, workdir })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn git_dir(&self) -> &Path {
        self.git_repo.path()
    }

    /// Where a traversal with `program` runs
    pub fn git_source(&self, program: impl Into<PathBuf>) -> GitSource {
        GitSource::new(program, &self.workdir)
    }

    /// Commit HEAD points at; `None` on an unborn branch
    pub fn head_id(&self) -> Result<Option<String>> {
        match self.git_repo.head() {
            Ok(head) => Ok(head.target().map(|oid| oid.to_string())),
            Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Commit id a revision expression (`main`, `v1.0^`, a sha) names
    pub fn resolve(&self, revision: &str) -> Result<String> {
        let commit = self.git_repo.revparse_single(revision)?.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Traversal root for a revision given by the user.
    ///
    /// Wildcard patterns are passed on as ref globs; anything else (branch
    /// names, `HEAD~3`, full ref names) is resolved to the commit it names,
    /// so an unknown revision fails here instead of listing nothing.
    pub fn root_for(&self, revision: &str) -> Result<RefSpec> {
        if is_ref_pattern(revision) {
            return Ok(RefSpec::glob(revision));
        }
        Ok(RefSpec::Literal(CommitId::parse(&self.resolve(revision)?)?))
    }

    pub fn is_detached(&self) -> Result<bool> {
        Ok(self.git_repo.head_detached()?)
    }

    /// Refs grouped by the commit they point at (hex id)
    pub fn refs_by_oid(&self) -> Result<HashMap<String, Vec<RefInfo>>> {
        let mut map: HashMap<String, Vec<RefInfo>> = HashMap::new();
        let mut push = |oid: git2::Oid, name: &str, kind: RefKind, is_head: bool| {
            map.entry(oid.to_string()).or_default().push(RefInfo {
                name: name.to_string(),
                kind,
                is_head,
            });
        };

        let head_branch = match self.git_repo.head() {
            Ok(head) if head.is_branch() => head.shorthand().map(str::to_string),
            Ok(head) => {
                if let Some(target) = head.target() {
                    push(target, "HEAD", RefKind::Head, false);
                }
                None
            }
            Err(_) => None,
        };

        for (branch_type, kind) in [
            (BranchType::Local, RefKind::Branch),
            (BranchType::Remote, RefKind::Remote),
        ] {
            for entry in self.git_repo.branches(Some(branch_type))? {
                let (branch, _) = entry?;
                let (Some(name), Some(target)) = (branch.name()?, branch.get().target()) else {
                    continue;
                };
                let is_head = kind == RefKind::Branch && head_branch.as_deref() == Some(name);
                push(target, name, kind, is_head);
            }
        }

        let mut tags = Vec::new();
        self.git_repo.tag_foreach(|oid, name| {
            if let Some(tag) = std::str::from_utf8(name)
                .ok()
                .and_then(|n| n.strip_prefix("refs/tags/"))
            {
                tags.push((oid, tag.to_string()));
            }
            true
        })?;
        for (oid, name) in tags {
            // annotated tags point at a tag object
            let target = self
                .git_repo
                .find_tag(oid)
                .map(|tag| tag.target_id())
                .unwrap_or(oid);
            push(target, &name, RefKind::Tag, false);
        }

        for refs in map.values_mut() {
            refs.sort_by(|a, b| {
                b.is_head
                    .cmp(&a.is_head)
                    .then(a.kind.cmp(&b.kind))
                    .then_with(|| a.name.cmp(&b.name))
            });
        }
        Ok(map)
    }
}

/// `git log --glob` appends `/*` to patterns without wildcards, so only
/// real wildcard patterns can be handed over unresolved
fn is_ref_pattern(revision: &str) -> bool {
    revision.contains(['*', '?', '['])
}
