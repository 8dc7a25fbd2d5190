//! GitHub API strategy: temporary branch, file commits, pull request.
//!
//! Each unit is a `sync/t_<epoch>/<branch>` ref created at the target's tip.
//! File changes are committed to that ref through the contents API, so the
//! live branch is untouched until the pull request is merged.
use base64::Engine as _;

use super::{Cleanup, Mutation, Publication, StagingBackend};
use crate::error::SyncError;
use crate::fingerprint::{ContentFingerprint, is_noop};
use crate::github::{
    ApiError, FileDelete, FileWrite, GitHubApi, MergeRequest, NewPullRequest, RepoId,
};
use crate::staging::{StagingUnit, TargetBranch};

/// Stages through the GitHub REST API.
#[derive(Debug)]
pub struct ApiBackend<G> {
    github: G,
    auto_merge: bool,
}

impl<G: GitHubApi> ApiBackend<G> {
    /// Wrap a GitHub client. With `auto_merge`, every opened pull request is
    /// squash-merged immediately.
    #[must_use]
    pub const fn new(github: G, auto_merge: bool) -> Self {
        Self { github, auto_merge }
    }

    /// The wrapped client.
    pub const fn github(&self) -> &G {
        &self.github
    }

    fn stored_digest(
        &self,
        repo: &RepoId,
        path: &str,
        branch: &str,
    ) -> Result<Option<ContentFingerprint>, SyncError> {
        Ok(self
            .github
            .get_file(repo, path, branch)
            .map_err(|e| SyncError::remote("get content", e))?
            .map(|f| ContentFingerprint::from_hex(&f.sha)))
    }
}

impl<G: GitHubApi> StagingBackend for ApiBackend<G> {
    fn name(&self) -> &'static str {
        "api"
    }

    fn list_branches(&self, repo: &RepoId) -> Result<Vec<String>, SyncError> {
        self.github
            .list_branches(repo)
            .map_err(|e| SyncError::remote("list branches", e))
    }

    fn current_digest(
        &self,
        target: &TargetBranch,
        path: &str,
    ) -> Result<Option<ContentFingerprint>, SyncError> {
        self.stored_digest(&target.repo, path, &target.branch)
    }

    fn create_unit(&self, target: &TargetBranch, staging_name: &str) -> Result<(), SyncError> {
        let sha = self
            .github
            .get_branch_sha(&target.repo, &target.branch)
            .map_err(|e| SyncError::BaseRef {
                target: target.to_string(),
                source: Box::new(e),
            })?;
        self.github
            .create_branch(&target.repo, staging_name, &sha)
            .map_err(|e| SyncError::remote("create ref", e))
    }

    fn apply(
        &self,
        unit: &StagingUnit,
        path: &str,
        mutation: Mutation<'_>,
        message: &str,
    ) -> Result<bool, SyncError> {
        let repo = &unit.target.repo;
        let existing = self.stored_digest(repo, path, &unit.staging_name)?;
        match mutation {
            Mutation::Write(bytes) => {
                if is_noop(existing.as_ref(), bytes) {
                    return Ok(false);
                }
                let write = FileWrite {
                    message: message.to_string(),
                    content: base64::engine::general_purpose::STANDARD.encode(bytes),
                    sha: existing.map(|d| d.as_str().to_string()),
                    branch: unit.staging_name.clone(),
                };
                self.github
                    .put_file(repo, path, &write)
                    .map_err(|e| SyncError::remote("update file", e))?;
                Ok(true)
            }
            Mutation::Delete => {
                let Some(existing) = existing else {
                    return Ok(false);
                };
                let delete = FileDelete {
                    message: message.to_string(),
                    sha: existing.as_str().to_string(),
                    branch: unit.staging_name.clone(),
                };
                self.github
                    .delete_file(repo, path, &delete)
                    .map_err(|e| SyncError::remote("delete file", e))?;
                Ok(true)
            }
        }
    }

    fn publish(&self, unit: &StagingUnit, message: &str) -> Result<Publication, SyncError> {
        let repo = &unit.target.repo;
        let pr_error = |stage: &'static str, source: ApiError| SyncError::PullRequest {
            stage,
            target: unit.target.to_string(),
            source,
        };
        let pr = self
            .github
            .create_pull_request(
                repo,
                &NewPullRequest {
                    title: message.to_string(),
                    head: unit.staging_name.clone(),
                    base: unit.target.branch.clone(),
                    maintainer_can_modify: true,
                },
            )
            .map_err(|e| pr_error("create pull request", e))?;
        if !self.auto_merge {
            return Ok(Publication::Opened { number: pr.number });
        }
        self.github
            .merge_pull_request(
                repo,
                pr.number,
                &MergeRequest {
                    commit_title: message.to_string(),
                    sha: pr.head.sha.clone(),
                    merge_method: "squash".to_string(),
                },
            )
            .map_err(|e| pr_error("merge pull request", e))?;
        Ok(Publication::Merged { number: pr.number })
    }

    fn cleanup(
        &self,
        unit: &StagingUnit,
        publication: Option<&Publication>,
    ) -> Result<Cleanup, SyncError> {
        if matches!(publication, Some(Publication::Opened { .. })) {
            return Ok(Cleanup::Retained);
        }
        self.github
            .delete_branch(&unit.target.repo, &unit.staging_name)
            .map_err(|e| SyncError::Cleanup {
                repo: unit.target.repo.to_string(),
                staging: unit.staging_name.clone(),
                source: Box::new(e),
            })?;
        Ok(Cleanup::Deleted)
    }

    fn parallel_publish(&self) -> bool {
        true
    }
}
