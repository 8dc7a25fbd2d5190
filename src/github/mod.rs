//! GitHub REST surface consumed by the API staging backend.
//!
//! [`GitHubApi`] lists exactly the remote operations the sync engine needs.
//! [`Client`] implements it over `ureq`; tests substitute an in-memory fake
//! or a `mockall` mock.

mod client;

pub use client::{Client, DEFAULT_API_URL};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by [`GitHubApi`] calls.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The addressed object (branch, ref, file) does not exist.
    #[error("not found")]
    NotFound,

    /// The API answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or message extracted from it.
        message: String,
    },

    /// The request never produced a response.
    #[error("transport: {0}")]
    Transport(#[from] ureq::Error),

    /// A response body could not be decoded.
    #[error("decode response: {0}")]
    Decode(String),

    /// The configured base URL cannot carry path segments.
    #[error("invalid API base URL '{0}'")]
    InvalidBaseUrl(String),
}

impl ApiError {
    /// Whether repeating the same idempotent request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::NotFound | Self::Decode(_) | Self::InvalidBaseUrl(_) => false,
        }
    }
}

/// `owner/name` of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId {
    /// Account or organisation owning the repository.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl RepoId {
    /// Build a repository id.
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A file as reported by the contents API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    /// Git blob digest of the stored content.
    pub sha: String,
}

/// Create-or-update request for a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileWrite {
    /// Commit message.
    pub message: String,
    /// Base64-encoded content.
    pub content: String,
    /// Digest of the file being replaced; absent for inserts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    /// Branch receiving the commit.
    pub branch: String,
}

/// Delete request for a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileDelete {
    /// Commit message.
    pub message: String,
    /// Digest of the file being removed.
    pub sha: String,
    /// Branch receiving the commit.
    pub branch: String,
}

/// Pull request creation payload.
#[derive(Debug, Clone, Serialize)]
pub struct NewPullRequest {
    /// PR title.
    pub title: String,
    /// Branch holding the changes.
    pub head: String,
    /// Branch the changes are merged into.
    pub base: String,
    /// Allow maintainers to push to the head branch.
    pub maintainer_can_modify: bool,
}

/// Head commit of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestHead {
    /// Commit SHA at the tip of the head branch.
    pub sha: String,
}

/// Pull request as returned on creation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    /// PR number within the repository.
    pub number: u64,
    /// Head commit, used to guard the merge.
    pub head: PullRequestHead,
}

/// Merge payload; `merge_method` is always `squash` in this tool.
#[derive(Debug, Clone, Serialize)]
pub struct MergeRequest {
    /// Title of the squash commit.
    pub commit_title: String,
    /// Expected head SHA; the merge fails if the branch moved.
    pub sha: String,
    /// Merge strategy.
    pub merge_method: String,
}

/// The remote operations the API staging backend consumes.
#[cfg_attr(test, mockall::automock)]
pub trait GitHubApi: Send + Sync {
    /// All branch names of `repo`, following pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if any page cannot be fetched.
    fn list_branches(&self, repo: &RepoId) -> Result<Vec<String>, ApiError>;

    /// Commit SHA that `refs/heads/<branch>` points to.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] if the branch does not exist.
    fn get_branch_sha(&self, repo: &RepoId, branch: &str) -> Result<String, ApiError>;

    /// Create `refs/heads/<branch>` at `sha`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ref exists already or the call fails.
    fn create_branch(&self, repo: &RepoId, branch: &str, sha: &str) -> Result<(), ApiError>;

    /// Stored file at `path` on `branch`; `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error for failures other than "not found".
    fn get_file(
        &self,
        repo: &RepoId,
        path: &str,
        branch: &str,
    ) -> Result<Option<RemoteFile>, ApiError>;

    /// Create or overwrite `path` with a commit on `write.branch`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected.
    fn put_file(&self, repo: &RepoId, path: &str, write: &FileWrite) -> Result<(), ApiError>;

    /// Remove `path` with a commit on `delete.branch`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete is rejected.
    fn delete_file(
        &self,
        repo: &RepoId,
        path: &str,
        delete: &FileDelete,
    ) -> Result<(), ApiError>;

    /// Open a pull request.
    ///
    /// # Errors
    ///
    /// Returns an error if GitHub refuses the PR.
    fn create_pull_request(
        &self,
        repo: &RepoId,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, ApiError>;

    /// Merge pull request `number`.
    ///
    /// # Errors
    ///
    /// Returns an error if the PR cannot be merged.
    fn merge_pull_request(
        &self,
        repo: &RepoId,
        number: u64,
        merge: &MergeRequest,
    ) -> Result<(), ApiError>;

    /// Delete `refs/heads/<branch>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ref cannot be deleted.
    fn delete_branch(&self, repo: &RepoId, branch: &str) -> Result<(), ApiError>;
}
