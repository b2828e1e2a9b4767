// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ralphy: autonomous multi-agent task runner.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ralphy", version, about = "Autonomous multi-agent task runner")]
struct Cli {
    /// Verbose logging (overridden by RUST_LOG)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute tasks from a source file
    Run(commands::run::RunArgs),
    /// Show task and queue state
    Status(commands::status::StatusArgs),
    /// Return a failed or skipped task to pending
    Reset(commands::reset::ResetArgs),
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Task source file (csv, yaml, json, or md)
    #[arg(long)]
    tasks: PathBuf,

    /// Project working directory
    #[arg(long, default_value = ".")]
    workdir: PathBuf,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Run(args) => commands::run::run(args).await,
        Command::Status(args) => commands::status::status(args).await,
        Command::Reset(args) => commands::reset::reset(args).await,
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
