use std::process::ExitCode;

use clap::Parser;

use repo_sync::cli::Cli;
use repo_sync::commands;
use repo_sync::logging::{self, Logger};
use repo_sync::reconcile::CancelFlag;

const LOG_NAME: &str = "sync";

fn main() -> ExitCode {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();
    logging::init_subscriber(args.verbose, LOG_NAME);
    let log = Logger::new(LOG_NAME);

    let cancel = CancelFlag::default();
    let handler_flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.cancel()) {
        log.warn(&format!("Ctrl-C handler not installed: {e}"));
    }

    match commands::sync::run(&args, &log, cancel) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
