// ─────────────────────────────────────────────────────────────────────
// SCPN Heat Diffusion — Command Line
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! `heat`: run, validate, plan and compare heat diffusion jobs.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use flexi_logger::{Duplicate, FileSpec, Logger, LoggerHandle};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "heat", version, about = "Domain-decomposed 2D heat diffusion solver", long_about = None)]
struct Cli {
    /// Log level or flexi_logger spec (`RUST_LOG` wins when set).
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Also write logs to a file in this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a simulation.
    Run(commands::run::RunArgs),
    /// Check a configuration against a worker count.
    Validate(commands::validate::ValidateArgs),
    /// Suggest a process grid for a grid size and worker count.
    Grid(commands::grid::GridArgs),
    /// Report how far two written fields are apart.
    Compare(commands::compare::CompareArgs),
}

fn init_logging(level: &str, log_dir: Option<&Path>) -> anyhow::Result<LoggerHandle> {
    let logger = Logger::try_with_env_or_str(level)
        .with_context(|| format!("invalid log level '{level}'"))?;
    let logger = match log_dir {
        Some(dir) => logger
            .log_to_file(
                FileSpec::default()
                    .directory(dir)
                    .basename("heat")
                    .discriminant(format!("pid{}", std::process::id()))
                    .suppress_timestamp()
                    .suffix("log"),
            )
            .duplicate_to_stderr(Duplicate::Info),
        None => logger.log_to_stderr(),
    };
    logger.start().context("failed to start logger")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _logger = init_logging(&cli.log_level, cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
        Commands::Grid(args) => commands::grid::execute(args),
        Commands::Compare(args) => commands::compare::execute(args),
    }
}
