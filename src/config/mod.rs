//! Sync config entries: what to copy, where, and onto which branches.
//!
//! Config files are JSON arrays; [`loader`] reads them and turns each raw
//! item into a validated [`ConfigEntry`]. Validation happens up front so a
//! malformed destination or branch pattern aborts the run before any remote
//! call is made.
pub mod loader;

use std::path::PathBuf;

use regex_lite::Regex;
use serde::Deserialize;

pub use loader::{load_file, load_files};

use crate::error::ConfigError;
use crate::github::RepoId;

/// An item exactly as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEntry {
    /// Local source file.
    #[serde(default)]
    pub src: Option<PathBuf>,
    /// `owner/repo/path` destination.
    pub dest: String,
    /// Branch patterns; omitted or empty means every branch.
    #[serde(default)]
    pub branches: Option<Vec<String>>,
    /// Delete the destination file instead of writing it.
    #[serde(default)]
    pub delete: bool,
}

/// Destination coordinate of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Repository receiving the file.
    pub repo: RepoId,
    /// Path of the file inside the repository.
    pub path: String,
}

impl Destination {
    /// Parse `owner/repo/path`; the path itself may contain further slashes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDestination`] unless all three parts are
    /// present and non-empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use repo_sync::config::Destination;
    ///
    /// let d = Destination::parse("acme/widgets/.github/CODEOWNERS").unwrap();
    /// assert_eq!(d.repo.to_string(), "acme/widgets");
    /// assert_eq!(d.path, ".github/CODEOWNERS");
    /// assert!(Destination::parse("acme/widgets").is_err());
    /// ```
    pub fn parse(dest: &str) -> Result<Self, ConfigError> {
        let mut parts = dest.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), Some(path))
                if !owner.is_empty() && !repo.is_empty() && !path.is_empty() =>
            {
                Ok(Self {
                    repo: RepoId::new(owner, repo),
                    path: path.to_string(),
                })
            }
            _ => Err(ConfigError::InvalidDestination(dest.to_string())),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.repo, self.path)
    }
}

/// Which branches of the destination repository an entry applies to.
#[derive(Debug, Clone)]
pub enum BranchSelector {
    /// Every branch except staging branches.
    All,
    /// Branches matched by at least one of these (unanchored) expressions.
    Patterns(Vec<Regex>),
}

impl BranchSelector {
    /// Compile a selector from the raw pattern list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] for the first pattern that does
    /// not compile.
    pub fn compile(patterns: Option<&[String]>) -> Result<Self, ConfigError> {
        match patterns {
            None | Some([]) => Ok(Self::All),
            Some(patterns) => patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|source| ConfigError::InvalidPattern {
                        pattern: p.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Patterns),
        }
    }
}

/// What an entry does to its destination file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write the contents of this local file.
    Update(PathBuf),
    /// Remove the destination file.
    Delete,
}

/// A validated config entry.
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    /// Update-from-source or delete.
    pub action: Action,
    /// Destination coordinate.
    pub dest: Destination,
    /// Branch selection.
    pub branches: BranchSelector,
}

impl ConfigEntry {
    /// Validate a raw entry.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed destination, an invalid branch
    /// pattern, or an update entry without `src`.
    pub fn from_raw(raw: RawEntry) -> Result<Self, ConfigError> {
        let dest = Destination::parse(&raw.dest)?;
        let branches = BranchSelector::compile(raw.branches.as_deref())?;
        let action = if raw.delete {
            Action::Delete
        } else {
            Action::Update(raw.src.ok_or(ConfigError::MissingSource(raw.dest))?)
        };
        Ok(Self {
            action,
            dest,
            branches,
        })
    }

    /// One-line description for log output.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.action {
            Action::Update(src) => format!("Sync {} to {}", src.display(), self.dest),
            Action::Delete => format!("Delete {}", self.dest),
        }
    }
}
