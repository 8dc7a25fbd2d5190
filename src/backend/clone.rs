//! Local clone strategy: stage on a local branch, converge by pushing.
//!
//! Each destination repository is cloned once per run into a temporary
//! directory. A unit is a local branch forked from `origin/<branch>`; its
//! first change is committed and every further change amends that commit,
//! so each target receives exactly one commit.
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Cred, ErrorCode, FetchOptions, PushOptions, RemoteCallbacks, Repository,
    Signature, Tree,
};
use tempfile::TempDir;

use super::{Cleanup, Mutation, Publication, StagingBackend};
use crate::error::SyncError;
use crate::fingerprint::{ContentFingerprint, is_noop};
use crate::github::RepoId;
use crate::staging::{StagingUnit, TargetBranch};

/// Default remote base for `https://github.com/<owner>/<repo>.git` URLs.
pub const DEFAULT_GIT_URL: &str = "https://github.com";

const FALLBACK_NAME: &str = "repo-sync";
const FALLBACK_EMAIL: &str = "repo-sync@users.noreply.github.com";

/// Stages through local clones.
///
/// Clones live in a run-scoped temporary directory removed on drop.
pub struct CloneBackend {
    // Declared before `workdir` so repositories close before the directory
    // is removed.
    repos: Mutex<HashMap<RepoId, Repository>>,
    workdir: TempDir,
    remote_base: String,
    token: Option<String>,
}

impl std::fmt::Debug for CloneBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloneBackend")
            .field("workdir", &self.workdir.path())
            .field("remote_base", &self.remote_base)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl CloneBackend {
    /// Backend cloning from `<remote_base>/<owner>/<repo>.git`.
    ///
    /// `remote_base` is normally [`DEFAULT_GIT_URL`]; a local directory works
    /// too. When `token` is set it is offered as HTTPS basic credentials.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Workspace`] if the temporary directory cannot be
    /// created.
    pub fn new(remote_base: impl Into<String>, token: Option<String>) -> Result<Self, SyncError> {
        let workdir = tempfile::Builder::new()
            .prefix("repo-sync-")
            .tempdir()
            .map_err(|source| SyncError::Workspace {
                path: std::env::temp_dir(),
                source,
            })?;
        Ok(Self {
            repos: Mutex::new(HashMap::new()),
            workdir,
            remote_base: remote_base.into(),
            token,
        })
    }

    /// Directory holding the clones.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    fn remote_url(&self, repo: &RepoId) -> String {
        format!(
            "{}/{}/{}.git",
            self.remote_base.trim_end_matches('/'),
            repo.owner,
            repo.name
        )
    }

    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        if let Some(token) = self.token.as_deref() {
            callbacks.credentials(move |_, _, _| Cred::userpass_plaintext("x-access-token", token));
        }
        callbacks
    }

    /// Run `f` against the clone of `repo`, cloning it on first use.
    fn with_repo<T>(
        &self,
        repo: &RepoId,
        f: impl FnOnce(&Repository) -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        let mut repos = self.repos.lock().unwrap_or_else(PoisonError::into_inner);
        let repository = match repos.entry(repo.clone()) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                let dest = self.workdir.path().join(&repo.owner).join(&repo.name);
                tracing::debug!("cloning {} into {}", repo, dest.display());
                let mut fetch = FetchOptions::new();
                fetch.remote_callbacks(self.callbacks());
                let cloned = RepoBuilder::new()
                    .fetch_options(fetch)
                    .clone(&self.remote_url(repo), &dest)
                    .map_err(|e| SyncError::git("clone", e))?;
                slot.insert(cloned)
            }
        };
        f(repository)
    }
}

/// Digest of `path` within `tree`, or `None` if absent.
fn tree_digest(tree: &Tree<'_>, path: &str) -> Result<Option<ContentFingerprint>, SyncError> {
    match tree.get_path(Path::new(path)) {
        Ok(entry) => Ok(Some(ContentFingerprint::from_hex(&entry.id().to_string()))),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(SyncError::git("read tree", e)),
    }
}

fn local_branch_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

fn remote_branch_ref(branch: &str) -> String {
    format!("refs/remotes/origin/{branch}")
}

fn workspace_error(path: PathBuf) -> impl FnOnce(std::io::Error) -> SyncError {
    move |source| SyncError::Workspace { path, source }
}

/// Write or remove `path` in the working tree and stage it in the index.
fn stage_in_worktree<'r>(
    repo: &'r Repository,
    path: &str,
    mutation: Mutation<'_>,
) -> Result<Tree<'r>, SyncError> {
    let root = repo
        .workdir()
        .ok_or_else(|| SyncError::git("checkout", git2::Error::from_str("bare clone")))?;
    let full = root.join(path);
    let mut index = repo.index().map_err(|e| SyncError::git("read index", e))?;
    match mutation {
        Mutation::Write(bytes) => {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).map_err(workspace_error(parent.to_path_buf()))?;
            }
            fs::write(&full, bytes).map_err(workspace_error(full.clone()))?;
            index
                .add_path(Path::new(path))
                .map_err(|e| SyncError::git("stage file", e))?;
        }
        Mutation::Delete => {
            fs::remove_file(&full).map_err(workspace_error(full.clone()))?;
            index
                .remove_path(Path::new(path))
                .map_err(|e| SyncError::git("stage file", e))?;
        }
    }
    index.write().map_err(|e| SyncError::git("write index", e))?;
    let tree_id = index
        .write_tree()
        .map_err(|e| SyncError::git("write tree", e))?;
    repo.find_tree(tree_id)
        .map_err(|e| SyncError::git("write tree", e))
}

fn signature(repo: &Repository) -> Result<Signature<'static>, SyncError> {
    repo.signature()
        .or_else(|_| Signature::now(FALLBACK_NAME, FALLBACK_EMAIL))
        .map_err(|e| SyncError::git("signature", e))
}

impl StagingBackend for CloneBackend {
    fn name(&self) -> &'static str {
        "clone"
    }

    fn list_branches(&self, repo: &RepoId) -> Result<Vec<String>, SyncError> {
        self.with_repo(repo, |repository| {
            let branches = repository
                .branches(Some(BranchType::Remote))
                .map_err(|e| SyncError::git("list branches", e))?;
            let mut names = Vec::new();
            for branch in branches {
                let (branch, _) = branch.map_err(|e| SyncError::git("list branches", e))?;
                let name = branch
                    .name()
                    .map_err(|e| SyncError::git("list branches", e))?;
                if let Some(name) = name.and_then(|n| n.strip_prefix("origin/"))
                    && name != "HEAD"
                {
                    names.push(name.to_string());
                }
            }
            Ok(names)
        })
    }

    fn current_digest(
        &self,
        target: &TargetBranch,
        path: &str,
    ) -> Result<Option<ContentFingerprint>, SyncError> {
        self.with_repo(&target.repo, |repository| {
            let tree = repository
                .find_reference(&remote_branch_ref(&target.branch))
                .and_then(|r| r.peel_to_tree())
                .map_err(|e| SyncError::git("read branch", e))?;
            tree_digest(&tree, path)
        })
    }

    fn create_unit(&self, target: &TargetBranch, staging_name: &str) -> Result<(), SyncError> {
        self.with_repo(&target.repo, |repository| {
            let base = repository
                .find_reference(&remote_branch_ref(&target.branch))
                .and_then(|r| r.peel_to_commit())
                .map_err(|e| SyncError::BaseRef {
                    target: target.to_string(),
                    source: Box::new(e),
                })?;
            repository
                .branch(staging_name, &base, true)
                .map_err(|e| SyncError::git("create branch", e))?;
            Ok(())
        })
    }

    fn apply(
        &self,
        unit: &StagingUnit,
        path: &str,
        mutation: Mutation<'_>,
        message: &str,
    ) -> Result<bool, SyncError> {
        let head_ref = local_branch_ref(&unit.staging_name);
        self.with_repo(&unit.target.repo, |repository| {
            let tip = repository
                .find_reference(&head_ref)
                .and_then(|r| r.peel_to_commit())
                .map_err(|e| SyncError::git("read branch", e))?;
            let existing = {
                let tree = tip.tree().map_err(|e| SyncError::git("read tree", e))?;
                tree_digest(&tree, path)?
            };
            let unchanged = match mutation {
                Mutation::Write(bytes) => is_noop(existing.as_ref(), bytes),
                Mutation::Delete => existing.is_none(),
            };
            if unchanged {
                return Ok(false);
            }

            // Several units share one clone; switch the working tree over.
            repository
                .checkout_tree(tip.as_object(), Some(CheckoutBuilder::new().force()))
                .map_err(|e| SyncError::git("checkout", e))?;
            repository
                .set_head(&head_ref)
                .map_err(|e| SyncError::git("checkout", e))?;

            let tree = stage_in_worktree(repository, path, mutation)?;
            let sig = signature(repository)?;
            if unit.has_change {
                tip.amend(
                    Some(&head_ref),
                    Some(&sig),
                    Some(&sig),
                    None,
                    Some(message),
                    Some(&tree),
                )
                .map_err(|e| SyncError::git("amend", e))?;
            } else {
                repository
                    .commit(Some(&head_ref), &sig, &sig, message, &tree, &[&tip])
                    .map_err(|e| SyncError::git("commit", e))?;
            }
            Ok(true)
        })
    }

    fn publish(&self, unit: &StagingUnit, _message: &str) -> Result<Publication, SyncError> {
        let refspec = format!(
            "{}:{}",
            local_branch_ref(&unit.staging_name),
            local_branch_ref(&unit.target.branch)
        );
        let push_error = |reason: String| SyncError::Push {
            target: unit.target.to_string(),
            reason,
        };
        self.with_repo(&unit.target.repo, |repository| {
            let mut remote = repository
                .find_remote("origin")
                .map_err(|e| SyncError::git("find remote", e))?;
            let mut rejection = None;
            {
                let mut callbacks = self.callbacks();
                callbacks.push_update_reference(|_, status| {
                    if let Some(status) = status {
                        rejection = Some(status.to_string());
                    }
                    Ok(())
                });
                let mut options = PushOptions::new();
                options.remote_callbacks(callbacks);
                remote
                    .push(&[refspec.as_str()], Some(&mut options))
                    .map_err(|e| push_error(e.message().to_string()))?;
            }
            match rejection {
                Some(reason) => Err(push_error(reason)),
                None => Ok(Publication::Pushed),
            }
        })
    }

    fn cleanup(
        &self,
        _unit: &StagingUnit,
        _publication: Option<&Publication>,
    ) -> Result<Cleanup, SyncError> {
        Ok(Cleanup::Local)
    }
}
