//! Target branch selection.
use std::collections::HashSet;

use crate::config::BranchSelector;

/// Prefix of every staging branch created by this tool.
pub const STAGING_PREFIX: &str = "sync/t_";

/// Name of the staging branch for `branch` in the run started at `epoch`.
///
/// # Examples
///
/// ```
/// use repo_sync::branches::{is_staging_branch, staging_branch_name};
///
/// let name = staging_branch_name(1_700_000_000, "release/1.x");
/// assert_eq!(name, "sync/t_1700000000/release/1.x");
/// assert!(is_staging_branch(&name));
/// ```
#[must_use]
pub fn staging_branch_name(epoch: i64, branch: &str) -> String {
    format!("{STAGING_PREFIX}{epoch}/{branch}")
}

/// Whether `name` follows the reserved `sync/t_<epoch>[/...]` convention.
#[must_use]
pub fn is_staging_branch(name: &str) -> bool {
    name.strip_prefix(STAGING_PREFIX).is_some_and(|rest| {
        let digits = rest.find('/').map_or(rest, |slash| &rest[..slash]);
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    })
}

/// Result of resolving a selector against a repository's branches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Concrete branches to sync, in listing order, without duplicates.
    pub branches: Vec<String>,
    /// Patterns that matched no branch at all.
    pub unmatched: Vec<String>,
}

/// Pick the branches an entry applies to.
///
/// Staging branches are never returned. With [`BranchSelector::All`] every
/// other branch is selected; with patterns, each branch matched by at least
/// one pattern is selected.
#[must_use]
pub fn resolve(available: &[String], selector: &BranchSelector) -> Resolution {
    let candidates = available.iter().filter(|b| !is_staging_branch(b));
    match selector {
        BranchSelector::All => Resolution {
            branches: candidates.cloned().collect(),
            unmatched: Vec::new(),
        },
        BranchSelector::Patterns(patterns) => {
            let candidates: Vec<&String> = candidates.collect();
            let mut seen = HashSet::new();
            let mut branches = Vec::new();
            let mut unmatched = Vec::new();
            for pattern in patterns {
                let mut hit = false;
                for branch in candidates.iter().filter(|b| pattern.is_match(b)) {
                    hit = true;
                    if seen.insert(branch.as_str()) {
                        branches.push((*branch).clone());
                    }
                }
                if !hit {
                    unmatched.push(pattern.as_str().to_string());
                }
            }
            Resolution {
                branches,
                unmatched,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn patterns(list: &[&str]) -> BranchSelector {
        BranchSelector::compile(Some(names(list).as_slice())).unwrap()
    }

    #[test]
    fn staging_branch_detection() {
        assert!(is_staging_branch("sync/t_1700000000/main"));
        assert!(is_staging_branch("sync/t_42"));
        assert!(!is_staging_branch("sync/t_/main"));
        assert!(!is_staging_branch("sync/t_abc/main"));
        assert!(!is_staging_branch("feature/sync/t_1/main"));
        assert!(!is_staging_branch("main"));
    }

    #[test]
    fn all_excludes_staging_branches() {
        let available = names(&["main", "sync/t_1700000000/main", "release"]);
        let r = resolve(&available, &BranchSelector::All);
        assert_eq!(r.branches, names(&["main", "release"]));
        assert!(r.unmatched.is_empty());
    }

    #[test]
    fn patterns_select_matched_branch_names() {
        let available = names(&["main", "release/1.0", "release/2.0", "dev"]);
        let r = resolve(&available, &patterns(&["^release/"]));
        assert_eq!(r.branches, names(&["release/1.0", "release/2.0"]));
    }

    #[test]
    fn patterns_are_unanchored() {
        let available = names(&["main", "main-old"]);
        let r = resolve(&available, &patterns(&["main"]));
        assert_eq!(r.branches, names(&["main", "main-old"]));
    }

    #[test]
    fn overlapping_patterns_do_not_duplicate() {
        let available = names(&["main", "master"]);
        let r = resolve(&available, &patterns(&["^ma", "^main$"]));
        assert_eq!(r.branches, names(&["main", "master"]));
    }

    #[test]
    fn patterns_never_select_staging_branches() {
        let available = names(&["main", "sync/t_99/main"]);
        let r = resolve(&available, &patterns(&["main"]));
        assert_eq!(r.branches, names(&["main"]));
    }

    #[test]
    fn unmatched_patterns_are_reported() {
        let available = names(&["main"]);
        let r = resolve(&available, &patterns(&["^main$", "^gh-pages$"]));
        assert_eq!(r.branches, names(&["main"]));
        assert_eq!(r.unmatched, names(&["^gh-pages$"]));
    }
}
