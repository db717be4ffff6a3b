//! Service entry point.
//!
//! # Responsibility
//! - Parse configuration, start logging, and serve until Ctrl-C.

use clap::Parser;
use log::{error, info};
use segments_server::{Cli, SegmentServer};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = cli.init_log() {
        eprintln!("Failed to initialize logging. Cause: {err}");
        return ExitCode::from(2);
    }
    info!(
        "event=app_start module=server status=ok core_version={}",
        segments_core::core_version()
    );

    let server = match SegmentServer::bind(cli.server_config()) {
        Ok(server) => server,
        Err(err) => {
            error!("event=app_start module=server status=error error={err}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = server.shutdown_handle();
    if let Err(err) = ctrlc::set_handler(move || shutdown.shutdown()) {
        error!("event=app_start module=server status=error error_code=signal_handler_failed error={err}");
        return ExitCode::FAILURE;
    }

    match server.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=app_stop module=server status=error error={err}");
            ExitCode::FAILURE
        }
    }
}
