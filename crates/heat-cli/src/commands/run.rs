//! `heat run`

use super::load_config;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use heat_core::driver::{run_serial, run_threaded};
use heat_core::output::write_output;
use heat_types::config::{HeatConfig, OutputFormat};
use heat_types::state::SolveResult;
use log::info;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Text,
    Npy,
}

impl From<FormatArg> for OutputFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Npy => OutputFormat::Npy,
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Worker count; defaults to nx_domains * ny_domains.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Override solver.max_steps.
    #[arg(long)]
    pub steps: Option<usize>,

    /// Override solver.tolerance.
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Override output.path.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Override output.format.
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Ignore the process grid and run one tile on this thread.
    #[arg(long)]
    pub serial: bool,

    /// Split each stencil sweep across the rayon pool.
    #[arg(long)]
    pub threaded_stencil: bool,

    /// Run as one rank of an MPI job; the world size is the worker count.
    #[cfg(feature = "mpi")]
    #[arg(long, conflicts_with_all = ["serial", "workers"])]
    pub mpi: bool,
}

fn apply_overrides(cfg: &mut HeatConfig, args: &RunArgs) {
    if let Some(steps) = args.steps {
        cfg.solver.max_steps = steps;
    }
    if let Some(tol) = args.tolerance {
        cfg.solver.tolerance = Some(tol);
    }
    if let Some(path) = &args.output {
        cfg.output.path = Some(path.to_string_lossy().into_owned());
    }
    if let Some(format) = args.format {
        cfg.output.format = format.into();
    }
    if args.threaded_stencil {
        cfg.solver.threaded_stencil = true;
    }
}

pub fn execute(args: RunArgs) -> Result<()> {
    #[cfg(feature = "mpi")]
    if args.mpi {
        return execute_mpi(&args);
    }

    let mut cfg = load_config(&args.config)?;
    apply_overrides(&mut cfg, &args);

    let result = if args.serial {
        run_serial(&cfg)?
    } else {
        let workers = args.workers.unwrap_or_else(|| cfg.workers());
        run_threaded(&cfg, workers)?
    };
    report(&cfg, &result)
}

/// Rank 0 reads the configuration; the solver distributes it.
#[cfg(feature = "mpi")]
fn execute_mpi(args: &RunArgs) -> Result<()> {
    use heat_core::comm::Communicator;
    use heat_core::driver::run_distributed;
    use heat_core::mpi_comm::MpiComm;
    use log::error;

    let comm = MpiComm::initialize()?;
    let cfg = if comm.rank() == 0 {
        match load_config(&args.config) {
            Ok(mut cfg) => {
                apply_overrides(&mut cfg, args);
                Some(cfg)
            }
            Err(e) => {
                error!("{e:#}");
                None
            }
        }
    } else {
        None
    };

    let result = run_distributed(&comm, cfg.clone())?;
    match (cfg, result) {
        (Some(cfg), Some(result)) => report(&cfg, &result),
        _ => Ok(()),
    }
}

fn report(cfg: &HeatConfig, result: &SolveResult) -> Result<()> {
    match &cfg.output.path {
        Some(path) => {
            write_output(path, &result.field, cfg.output.format)
                .with_context(|| format!("failed to write {path}"))?;
            info!("wrote {:?} field to {path}", cfg.output.format);
        }
        None => info!("no output path configured; field not written"),
    }

    println!(
        "{}: {:?} after {} steps, residual {}, {:.1} ms",
        cfg.run_name,
        result.termination,
        result.steps,
        result
            .residual
            .map_or_else(|| "n/a".to_string(), |r| format!("{r:.3e}")),
        result.elapsed_ms
    );
    Ok(())
}
