//! `heat grid`

use anyhow::{bail, Result};
use clap::Args;
use heat_core::decomposition::optimal_process_grid;

#[derive(Debug, Args)]
pub struct GridArgs {
    #[arg(long)]
    pub size_x: usize,

    #[arg(long)]
    pub size_y: usize,

    #[arg(short, long)]
    pub workers: usize,
}

pub fn execute(args: GridArgs) -> Result<()> {
    let Some((nx, ny)) = optimal_process_grid(args.size_x, args.size_y, args.workers) else {
        bail!(
            "no {}-worker process grid divides a {}x{} grid evenly",
            args.workers,
            args.size_x,
            args.size_y
        );
    };
    println!(
        "\"decomposition\": {{ \"nx_domains\": {nx}, \"ny_domains\": {ny} }}  # tiles {}x{}",
        args.size_x / nx,
        args.size_y / ny
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_rejects_indivisible() {
        let args = GridArgs {
            size_x: 7,
            size_y: 7,
            workers: 4,
        };
        assert!(execute(args).is_err());
    }

    #[test]
    fn test_grid_accepts_square() {
        let args = GridArgs {
            size_x: 64,
            size_y: 64,
            workers: 4,
        };
        assert!(execute(args).is_ok());
    }
}
