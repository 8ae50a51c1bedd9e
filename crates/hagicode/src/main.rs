mod cli;
mod commands;
mod error;
mod logging;
mod progress;
mod settings;
mod single_instance;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use hagicode_platform::AppPaths;
use log::warn;

use crate::cli::Cli;
use crate::error::AppError;
use crate::settings::AppSettings;
use crate::single_instance::SingleInstance;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error}");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let paths = match cli.user_data {
        Some(root) => AppPaths::from_user_data(root),
        None => AppPaths::new()?,
    };
    paths
        .ensure_directories()
        .map_err(|error| AppError::io("failed to create application directories", error))?;

    let (mut settings, settings_error) = match AppSettings::load(&paths) {
        Ok(settings) => (settings, None),
        Err(error) => (AppSettings::default(), Some(error)),
    };
    let log_result = logging::init_logging(
        &paths.log_file(),
        cli.verbose || settings.debug_logging,
        cli.verbose,
        settings.max_log_size_bytes,
    );
    if let Err(error) = log_result {
        eprintln!("warning: cannot write {}: {error}", paths.log_file().display());
    }
    if let Some(error) = settings_error {
        warn!("{error}; using default settings");
    }
    log::debug!("User data root: {}", paths.user_data().display());

    let _instance = if cli.command.mutates_state() {
        Some(SingleInstance::acquire(&paths)?)
    } else {
        None
    };

    commands::run(cli.command, Arc::new(paths), &mut settings).await
}
