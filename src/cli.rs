use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::backend::clone::DEFAULT_GIT_URL;
use crate::github::DEFAULT_API_URL;

/// Propagate files from a control repository into many repositories and
/// branches, changing only what differs.
#[derive(Parser, Debug)]
#[command(
    name = "repo-sync",
    about = "Sync files into GitHub repositories and branches",
    version = option_env!("REPO_SYNC_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
)]
pub struct Cli {
    /// Whitespace-separated JSON config files
    #[arg(long, required = true, num_args = 1..)]
    pub files: Vec<String>,

    /// Commit message and pull request title
    #[arg(long, default_value = "chore: Sync by .github")]
    pub message: String,

    /// Resolve branches and report intended changes without writing
    #[arg(short = 'd', long, alias = "dryRun")]
    pub dry_run: bool,

    /// Squash-merge opened pull requests (api strategy)
    #[arg(
        long,
        alias = "autoMerge",
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub auto_merge: bool,

    /// How changes are staged and published
    #[arg(long, value_enum, default_value_t = Strategy::Api)]
    pub strategy: Strategy,

    /// Installation or personal access token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// GitHub App id
    #[arg(long, alias = "app_id")]
    pub app_id: Option<u64>,

    /// GitHub App installation id
    #[arg(long, alias = "installation_id")]
    pub installation_id: Option<u64>,

    /// Pre-signed GitHub App JWT, exchanged for an installation token
    #[arg(long, env = "GITHUB_APP_JWT", hide_env_values = true, hide = true)]
    pub app_jwt: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Base URL that repositories are cloned from (clone strategy)
    #[arg(long, env = "GITHUB_SERVER_URL", default_value = DEFAULT_GIT_URL)]
    pub git_url: String,

    /// Publish targets one at a time (parallel is enabled by default)
    #[arg(long = "no-parallel", action = ArgAction::SetFalse)]
    pub parallel: bool,

    /// Enable verbose output (`REPO_SYNC_LOG` takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Config file paths, with every `--files` value split on runs of
    /// whitespace (spaces, tabs, newlines).
    #[must_use]
    pub fn config_files(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .flat_map(|value| value.split_whitespace())
            .map(PathBuf::from)
            .collect()
    }
}

/// Staging strategy.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Temporary branch, pull request, squash merge
    Api,
    /// Local clone, single amended commit, push
    Clone,
}
