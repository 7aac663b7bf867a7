//! `heat compare`: distance between two written fields, e.g. a serial run
//! against a decomposed one.

use anyhow::{bail, Context, Result};
use clap::Args;
use heat_core::output::read_output;
use heat_math::norms::{l2_norm_delta, max_abs_delta};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Reference field (`.npy` or text).
    pub reference: PathBuf,

    /// Field to check against the reference.
    pub candidate: PathBuf,

    /// Fail when the largest pointwise difference exceeds this.
    #[arg(long)]
    pub tolerance: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDelta {
    pub l2: f64,
    pub max: f64,
}

pub fn field_delta(reference: &Path, candidate: &Path) -> Result<FieldDelta> {
    let a = read_output(reference)
        .with_context(|| format!("failed to read {}", reference.display()))?;
    let b = read_output(candidate)
        .with_context(|| format!("failed to read {}", candidate.display()))?;
    Ok(FieldDelta {
        l2: l2_norm_delta(&a, &b)?,
        max: max_abs_delta(&a, &b)?,
    })
}

pub fn execute(args: CompareArgs) -> Result<()> {
    let delta = field_delta(&args.reference, &args.candidate)?;
    info!(
        "compared {} with {}",
        args.reference.display(),
        args.candidate.display()
    );
    println!("l2 {:.6e}  max {:.6e}", delta.l2, delta.max);
    if let Some(tol) = args.tolerance {
        if delta.max > tol {
            bail!("fields differ by {:.6e}, above tolerance {tol:e}", delta.max);
        }
    }
    Ok(())
}
