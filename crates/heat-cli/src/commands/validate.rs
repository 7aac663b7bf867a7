//! `heat validate`: check a configuration and print the tile layout.

use super::load_config;
use anyhow::Result;
use clap::Args;
use heat_core::decomposition::{Decomposition, Direction};
use log::info;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// JSON configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Worker count to check against; defaults to nx_domains * ny_domains.
    #[arg(short, long)]
    pub workers: Option<usize>,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let cfg = load_config(&args.config)?;
    let workers = args.workers.unwrap_or_else(|| cfg.workers());
    cfg.validate(workers)?;
    let decomp = Decomposition::from_config(&cfg, workers)?;
    info!("{} is valid for {workers} workers", args.config.display());

    println!(
        "grid {}x{} over {}x{} workers, tiles {}x{}, global layout {}x{}",
        decomp.size_x,
        decomp.size_y,
        decomp.nx_domains,
        decomp.ny_domains,
        decomp.xcell,
        decomp.ycell,
        decomp.size_total_x(),
        decomp.size_total_y()
    );
    println!("rank  row  col      xs..xe      ys..ye   N    S    E    W");
    for sub in &decomp.subdomains {
        let n = |d: Direction| {
            sub.neighbors
                .get(d)
                .map_or_else(|| "-".to_string(), |r| r.to_string())
        };
        println!(
            "{:>4} {:>4} {:>4} {:>6}..{:<4} {:>6}..{:<4} {:>3} {:>4} {:>4} {:>4}",
            sub.rank,
            sub.row,
            sub.col,
            sub.xs,
            sub.xe,
            sub.ys,
            sub.ye,
            n(Direction::North),
            n(Direction::South),
            n(Direction::East),
            n(Direction::West)
        );
    }
    Ok(())
}
