//! The `sync` command: load configs, pick a strategy, run, summarise.
use anyhow::Result;
use chrono::Utc;

use crate::auth::{self, Credentials, TokenSource};
use crate::backend::StagingBackend;
use crate::backend::api::ApiBackend;
use crate::backend::clone::CloneBackend;
use crate::cli::{Cli, Strategy};
use crate::config;
use crate::error::SyncError;
use crate::github::Client;
use crate::logging::Logger;
use crate::reconcile::{CancelFlag, RunOptions, RunReport, SyncRun};

/// Run a sync over every config file named on the command line.
///
/// The summary is printed whether or not the run succeeds.
///
/// # Errors
///
/// Returns an error if configuration or credentials are unusable, if the
/// run hits a fatal error, or if any target failed recoverably.
pub fn run(cli: &Cli, log: &Logger, cancel: CancelFlag) -> Result<()> {
    let version = option_env!("REPO_SYNC_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
    log.info(&format!("repo-sync {version}"));

    log.stage("Loading configuration");
    let files = cli.config_files();
    if files.is_empty() {
        anyhow::bail!("--files names no config file");
    }
    let entries = config::load_files(&files)?;
    log.info(&format!(
        "loaded {} entr{} from {} file(s)",
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" },
        files.len()
    ));
    if entries.is_empty() {
        log.warn("nothing to sync");
        return Ok(());
    }

    let token = resolve_token(cli, log)?;
    let options = RunOptions {
        message: cli.message.clone(),
        dry_run: cli.dry_run,
        parallel: cli.parallel,
    };

    let result = match cli.strategy {
        Strategy::Api => {
            let token = token.ok_or_else(|| {
                SyncError::MissingCredentials("the api strategy needs a token".to_string())
            })?;
            let backend = ApiBackend::new(Client::new(&cli.api_url, token)?, cli.auto_merge);
            execute(&backend, log, options, cancel, &entries)
        }
        Strategy::Clone => {
            if !cli.auto_merge {
                log.warn("--auto-merge has no effect with the clone strategy");
            }
            let backend = CloneBackend::new(cli.git_url.as_str(), token)?;
            log.debug(&format!("clones in {}", backend.workdir().display()));
            execute(&backend, log, options, cancel, &entries)
        }
    };

    log.print_summary();
    let report = result?;
    let failures = report.failures();
    if failures > 0 {
        anyhow::bail!("{failures} target(s) failed");
    }
    Ok(())
}

fn execute<B: StagingBackend>(
    backend: &B,
    log: &Logger,
    options: RunOptions,
    cancel: CancelFlag,
    entries: &[config::ConfigEntry],
) -> Result<RunReport, SyncError> {
    SyncRun::new(backend, log, options, cancel, Utc::now()).execute(entries)
}

/// Resolve credentials; the clone strategy may run without any (local or
/// SSH-configured remotes).
fn resolve_token(cli: &Cli, log: &Logger) -> Result<Option<String>, SyncError> {
    let creds = Credentials {
        token: cli.token.as_deref(),
        app_id: cli.app_id,
        installation_id: cli.installation_id,
        app_jwt: cli.app_jwt.as_deref(),
    };
    match auth::resolve_token(&creds, |jwt, id| {
        Client::installation_token(&cli.api_url, jwt, id)
    }) {
        Ok((token, TokenSource::Direct)) => Ok(Some(token)),
        Ok((token, TokenSource::Installation { installation_id })) => {
            log.info(&format!(
                "using installation {installation_id} of app {}",
                cli.app_id.unwrap_or_default()
            ));
            Ok(Some(token))
        }
        Err(SyncError::MissingCredentials(_)) if cli.strategy == Strategy::Clone => {
            log.debug("no credentials; cloning anonymously");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
