mod api;
mod checklist;
mod commands;
mod config;
mod error;
mod estimate;
mod spawn;
mod subprocess;
mod telemetry;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::check::CheckArgs;
use commands::status::StatusArgs;
use commands::watch::WatchArgs;

#[derive(Debug, Parser)]
#[command(
    name = "chainwatch",
    version,
    about = "Supervise a remote cloud coding worker with bounded context rotation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Supervise a worker: warn, rotate, nudge, or give up as needed
    Watch(WatchArgs),
    /// Show a one-shot worker status and context estimate
    Status(StatusArgs),
    /// Check the task checklist for unchecked items
    Check(CheckArgs),
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Watch(_) => "watch",
            Self::Status(_) => "status",
            Self::Check(_) => "check",
        }
    }
}

fn main() -> ExitCode {
    telemetry::init();

    let cli = Cli::parse();

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Watch(args) => args.execute(),
        Commands::Status(args) => args.execute(),
        Commands::Check(args) => args.execute(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(exit_err) = e.downcast_ref::<error::ExitError>() {
                eprintln!("error: {exit_err}");
                exit_err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
