mod app;
mod atomic_file;
mod cli;
mod error;
mod logging;
mod notifier;
mod settings;
mod single_instance;
mod store;

use std::process::ExitCode;

use clap::Parser;
use log::info;
use scriptup_platform::AppPaths;
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::cli::{Cli, Command};
use crate::error::AppError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("scriptup: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let paths = match &cli.data_dir {
        Some(root) => AppPaths::under(root),
        None => AppPaths::new()?,
    };
    let app = App::open(paths, cli.verbose)?;
    let settings = app.settings().snapshot();
    logging::init_logging(
        app.paths(),
        settings.debug_logging || cli.verbose,
        settings.max_log_size_bytes,
    );

    match cli.command {
        Command::Check { ids } => {
            let updated = app.check(ids).await?;
            println!("{updated} script(s) updated");
        }
        Command::Watch => {
            let shutdown = CancellationToken::new();
            let on_signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl-C, stopping");
                    on_signal.cancel();
                }
            });
            app.watch(shutdown).await?;
        }
        Command::List => {
            for line in app.list() {
                println!("{line}");
            }
        }
        Command::Set(args) => {
            app.change_settings(&args)?;
            println!("Settings saved to {}", app.paths().settings_file().display());
        }
    }
    Ok(())
}
