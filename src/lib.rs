//! File synchronisation across GitHub repositories and branches.
//!
//! Config entries name a local source file, a destination
//! `owner/repo/path` and the branches it applies to. A run stages every
//! change, publishes each changed branch once, and cleans up after itself.
//!
//! The public API is organised into layers:
//!
//! - **[`config`]**: load and validate JSON config files
//! - **[`branches`]** and **[`fingerprint`]**: pick targets, detect no-ops
//! - **[`staging`]** and **[`backend`]**: per-branch staging units and the
//!   API and clone strategies behind them
//! - **[`publish`]** and **[`reconcile`]**: convergence and the run controller
//! - **[`commands`]**: top-level orchestration used by the binary
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod auth;
pub mod backend;
pub mod branches;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod github;
pub mod logging;
pub mod publish;
pub mod reconcile;
pub mod staging;
