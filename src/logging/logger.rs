//! Structured logger with dry-run awareness and summary collection.
use std::path::PathBuf;
use std::sync::Mutex;

use super::subscriber::{DRY_RUN_TARGET, STAGE_TARGET};
use super::types::{Log, TargetEntry, TargetStatus};
use super::utils::log_file_path;

/// Implement the display methods of [`Log`] by delegating to inherent methods
/// of the same name on the implementing type.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Structured logger with dry-run awareness and summary collection.
///
/// All messages are also written to a persistent log file at
/// `$XDG_CACHE_HOME/repo-sync/<command>.log` (default
/// `~/.cache/repo-sync/<command>.log`) regardless of the verbose flag.
#[derive(Debug)]
pub struct Logger {
    targets: Mutex<Vec<TargetEntry>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a new logger.
    ///
    /// Stores the log file path for display in the run summary. The file
    /// itself is created by [`init_subscriber`](super::subscriber::init_subscriber).
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self::with_log_file(log_file_path(command))
    }

    /// Create a logger that reports `log_file` in its summary.
    #[must_use]
    pub const fn with_log_file(log_file: Option<PathBuf>) -> Self {
        Self {
            targets: Mutex::new(Vec::new()),
            log_file,
        }
    }

    /// Return the log file path, if available.
    #[cfg(test)]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Return a clone of all recorded entries.
    #[must_use]
    pub fn entries(&self) -> Vec<TargetEntry> {
        self.targets.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose; always
    /// written to the log file).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log a dry-run action message.
    pub fn dry_run(&self, msg: &str) {
        tracing::info!(target: DRY_RUN_TARGET, "{msg}");
    }

    /// Record a target outcome for the summary.
    pub fn record_target(&self, target: &str, status: TargetStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.targets.lock() {
            guard.push(TargetEntry {
                target: target.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// Print the summary of all recorded targets.
    pub fn print_summary(&self) {
        let targets = self.entries();
        if targets.is_empty() {
            return;
        }

        println!();
        self.stage("Summary");

        let mut synced = 0u32;
        let mut opened = 0u32;
        let mut unchanged = 0u32;
        let mut dry_run = 0u32;
        let mut failed = 0u32;

        for entry in &targets {
            let (icon, color) = match entry.status {
                TargetStatus::Synced => {
                    synced += 1;
                    ("✓", "\x1b[32m")
                }
                TargetStatus::Opened => {
                    opened += 1;
                    ("↑", "\x1b[36m")
                }
                TargetStatus::Unchanged => {
                    unchanged += 1;
                    ("·", "\x1b[2m")
                }
                TargetStatus::DryRun => {
                    dry_run += 1;
                    ("~", "\x1b[37m")
                }
                TargetStatus::Failed => {
                    failed += 1;
                    ("✗", "\x1b[31m")
                }
            };

            let suffix = entry
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));

            self.info(&format!("{color}{icon} {}{suffix}\x1b[0m", entry.target));
        }

        println!();
        let total = synced + opened + unchanged + dry_run + failed;
        self.info(&format!(
            "{total} targets: \x1b[32m{synced} synced\x1b[0m, \x1b[36m{opened} pr open\x1b[0m, \x1b[2m{unchanged} unchanged\x1b[0m, \x1b[37m{dry_run} dry-run\x1b[0m, \x1b[31m{failed} failed\x1b[0m"
        ));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error, dry_run);

    fn record_target(&self, target: &str, status: TargetStatus, message: Option<&str>) {
        self.record_target(target, status, message);
    }
}
