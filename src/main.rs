use anyhow::Context;
use forktree::commands::{Cli, Commands, RunArgs};
use forktree::config::RunConfig;
use forktree::supervisor;
use forktree::utils::logger::init_logger;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let command = Cli::parse_command();
    match main_impl(command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("forktree: {:#}", err);
            ExitCode::from(1)
        }
    }
}

fn main_impl(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Run(args) => handle_run(args),
        Commands::Show { log } => handle_show(&log),
    }
}

fn handle_run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let config = args.apply(RunConfig::load(args.config.as_deref())?);
    init_logger(config.log_level.as_deref(), None).context("failed to initialise logging")?;

    // Only the root ever returns from `run`; descendants exit inside it.
    let mut stdout = std::io::stdout();
    match supervisor::run(&config, &mut stdout) {
        Ok(_) => Ok(ExitCode::from(0)),
        Err(err) => {
            tracing::error!(category = err.category().display_name(), "{}", err.user_message());
            eprintln!("forktree: {}", err);
            Ok(ExitCode::from(1))
        }
    }
}

fn handle_show(log: &Path) -> anyhow::Result<ExitCode> {
    init_logger(None, None).context("failed to initialise logging")?;

    let mut stdout = std::io::stdout();
    match supervisor::show(log, &mut stdout) {
        Ok(stats) => {
            tracing::info!("{}", stats);
            Ok(ExitCode::from(0))
        }
        Err(err) => {
            eprintln!("forktree: {}", err);
            Ok(ExitCode::from(1))
        }
    }
}
