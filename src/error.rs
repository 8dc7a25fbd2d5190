//! Domain-specific error types for the sync engine.
//!
//! Library code returns [`SyncError`] (and the [`ConfigError`] it wraps);
//! the binary converts to [`anyhow::Error`] at the top level via `?`.
//!
//! # Error hierarchy
//!
//! ```text
//! SyncError
//! ├── Config(ConfigError)   JSON parsing, destinations, branch patterns
//! ├── ReadSource            local source file unreadable
//! ├── BaseRef               staging base branch missing or unreadable
//! ├── Remote / Git          transport failure, labelled with its stage
//! ├── Push                  clone strategy push rejected
//! ├── Workspace             clone strategy local I/O failed
//! ├── PullRequest           recoverable: PR create/merge failed
//! ├── Cleanup               recoverable: staging ref not deleted
//! ├── MissingCredentials
//! └── Cancelled
//! ```
//!
//! Only [`SyncError::PullRequest`] and [`SyncError::Cleanup`] are
//! recoverable; see [`SyncError::is_fatal`].

use std::path::PathBuf;

use thiserror::Error;

use crate::github::ApiError;

/// Boxed error used where the cause depends on the staging backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A config file could not be loaded or one of its entries is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The local source file for an entry could not be read.
    #[error("read file {}: {source}", path.display())]
    ReadSource {
        /// Path of the local source file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The target branch could not be resolved to a base commit for staging.
    #[error("resolve base of {target}: {source}")]
    BaseRef {
        /// `owner/repo/branch` of the target.
        target: String,
        /// Backend-specific cause.
        source: BoxError,
    },

    /// A GitHub API call failed.
    #[error("{stage}: {source}")]
    Remote {
        /// Operation label, e.g. `"get content"`.
        stage: &'static str,
        /// Underlying API error.
        source: ApiError,
    },

    /// A local git operation failed.
    #[error("{stage}: {source}")]
    Git {
        /// Operation label, e.g. `"clone"`.
        stage: &'static str,
        /// Underlying libgit2 error.
        source: git2::Error,
    },

    /// Pushing a staged branch onto its target was rejected or failed.
    #[error("push {target}: {reason}")]
    Push {
        /// `owner/repo/branch` of the target.
        target: String,
        /// Rejection message or transport error.
        reason: String,
    },

    /// Opening or merging a pull request failed.
    #[error("{stage} for {target}: {source}")]
    PullRequest {
        /// `"create pull request"` or `"merge pull request"`.
        stage: &'static str,
        /// `owner/repo/branch` of the target.
        target: String,
        /// Underlying API error.
        source: ApiError,
    },

    /// Deleting a staging unit failed.
    #[error("delete ref {staging} in {repo}: {source}")]
    Cleanup {
        /// `owner/repo` holding the staging ref.
        repo: String,
        /// Staging branch name.
        staging: String,
        /// Backend-specific cause.
        source: BoxError,
    },

    /// The clone strategy's local workspace could not be prepared or written.
    #[error("workspace {}: {source}", path.display())]
    Workspace {
        /// File or directory being touched.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// No usable credentials were supplied.
    #[error("no credentials: {0}")]
    MissingCredentials(String),

    /// The run was interrupted before it completed.
    #[error("run cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether this error must abort the whole run.
    ///
    /// Pull request and cleanup failures are isolated to one target and the
    /// run continues past them; everything else is unrecoverable.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::PullRequest { .. } | Self::Cleanup { .. })
    }

    /// Wrap a GitHub API error with the operation it came from.
    #[must_use]
    pub const fn remote(stage: &'static str, source: ApiError) -> Self {
        Self::Remote { stage, source }
    }

    /// Wrap a libgit2 error with the operation it came from.
    #[must_use]
    pub const fn git(stage: &'static str, source: git2::Error) -> Self {
        Self::Git { stage, source }
    }
}

/// Errors that arise from loading config files.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("IO error reading config file {}: {source}", path.display())]
    Io {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not a JSON array of entries.
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        /// Path to the offending file.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// A destination is not of the form `owner/repo/path`.
    #[error("wrong dest '{0}'. example: owner/repo/file")]
    InvalidDestination(String),

    /// A branch selector is not a valid regular expression.
    #[error("invalid branch pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as written in the config file.
        pattern: String,
        /// Compilation error.
        source: regex_lite::Error,
    },

    /// An update entry has no `src`.
    #[error("entry for '{0}' has no src and is not a delete")]
    MissingSource(String),
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io;

    // -----------------------------------------------------------------------
    // ConfigError
    // -----------------------------------------------------------------------

    #[test]
    fn invalid_destination_display() {
        let e = ConfigError::InvalidDestination("acme/widgets".to_string());
        assert_eq!(
            e.to_string(),
            "wrong dest 'acme/widgets'. example: owner/repo/file"
        );
    }

    #[test]
    fn io_error_mentions_path_and_has_source() {
        use std::error::Error as StdError;
        let e = ConfigError::Io {
            path: PathBuf::from("/conf/sync.json"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert!(e.to_string().contains("/conf/sync.json"));
        assert!(e.source().is_some());
    }

    #[test]
    fn missing_source_display() {
        let e = ConfigError::MissingSource("acme/widgets/a.txt".to_string());
        assert_eq!(
            e.to_string(),
            "entry for 'acme/widgets/a.txt' has no src and is not a delete"
        );
    }

    // -----------------------------------------------------------------------
    // SyncError
    // -----------------------------------------------------------------------

    #[test]
    fn remote_error_is_labelled_with_stage() {
        let e = SyncError::remote("get content", ApiError::NotFound);
        assert!(e.to_string().starts_with("get content: "));
    }

    #[test]
    fn pull_request_and_cleanup_are_recoverable() {
        let pr = SyncError::PullRequest {
            stage: "create pull request",
            target: "acme/widgets/main".to_string(),
            source: ApiError::Status {
                status: 422,
                message: "no commits".to_string(),
            },
        };
        let cleanup = SyncError::Cleanup {
            repo: "acme/widgets".to_string(),
            staging: "sync/t_1/main".to_string(),
            source: "boom".into(),
        };
        assert!(!pr.is_fatal());
        assert!(!cleanup.is_fatal());
    }

    #[test]
    fn staging_failures_are_fatal() {
        let base = SyncError::BaseRef {
            target: "acme/widgets/main".to_string(),
            source: "not found".into(),
        };
        let push = SyncError::Push {
            target: "acme/widgets/main".to_string(),
            reason: "non-fast-forward".to_string(),
        };
        assert!(base.is_fatal());
        assert!(push.is_fatal());
        assert!(SyncError::Cancelled.is_fatal());
        assert!(SyncError::from(ConfigError::MissingSource("x".into())).is_fatal());
    }

    #[test]
    fn config_error_converts_into_sync_error() {
        let e: SyncError = ConfigError::InvalidDestination("x".to_string()).into();
        assert!(e.to_string().contains("Configuration error"));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn all_error_types_are_send_sync() {
        assert_send_sync::<SyncError>();
        assert_send_sync::<ConfigError>();
    }

    #[test]
    fn sync_error_converts_to_anyhow() {
        let _anyhow_err: anyhow::Error = SyncError::Cancelled.into();
    }
}
