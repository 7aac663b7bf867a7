//! Five-point Laplacian stencil updates.
//!
//! Both variants read only from `prev` and write only the interior of
//! `next`; the outermost ring of either array (boundary or ghost cells) is
//! never touched. Every update returns the sum of squared differences
//! between `prev` and `next` over the updated cells, which the driver uses
//! as the local convergence residual.
//!
//! Relaxation (Jacobi):
//!   next[i,j] = 0.25 (prev[i-1,j] + prev[i+1,j] + prev[i,j-1] + prev[i,j+1])
//!
//! Explicit diffusion (forward Euler):
//!   next[i,j] = prev[i,j] + a dt ((prev[i-1,j] - 2 prev[i,j] + prev[i+1,j]) / dx²
//!                               + (prev[i,j-1] - 2 prev[i,j] + prev[i,j+1]) / dy²)

use heat_types::config::{HeatConfig, Scheme};
use heat_types::error::{HeatError, HeatResult};
use ndarray::{s, Array2, ArrayViewMut1, Axis};
use rayon::prelude::*;

/// Precomputed coefficients of the explicit diffusion update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffusionCoefficients {
    /// `a * dt`
    pub a_dt: f64,
    /// `1 / dx²`
    pub inv_dx2: f64,
    /// `1 / dy²`
    pub inv_dy2: f64,
}

impl DiffusionCoefficients {
    pub fn new(diffusivity: f64, dt: f64, dx: f64, dy: f64) -> Self {
        DiffusionCoefficients {
            a_dt: diffusivity * dt,
            inv_dx2: 1.0 / (dx * dx),
            inv_dy2: 1.0 / (dy * dy),
        }
    }
}

/// Stencil variant, resolved from configuration once per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stencil {
    Relaxation,
    Diffusion(DiffusionCoefficients),
}

impl Stencil {
    pub fn from_config(cfg: &HeatConfig) -> Self {
        match cfg.solver.scheme {
            Scheme::Relaxation => Stencil::Relaxation,
            Scheme::Diffusion => Stencil::Diffusion(DiffusionCoefficients::new(
                cfg.physics.diffusivity,
                cfg.effective_dt(),
                cfg.grid.dx,
                cfg.grid.dy,
            )),
        }
    }

    /// Update the interior of `next` from `prev` and return the squared-difference sum.
    ///
    /// With `threaded` the row loop is split across the rayon pool. Row
    /// residuals are summed in row order either way, so both paths give
    /// bitwise identical results.
    pub fn apply(
        &self,
        prev: &Array2<f64>,
        next: &mut Array2<f64>,
        threaded: bool,
    ) -> HeatResult<f64> {
        check_shapes(prev, next)?;
        let row_residuals = if threaded {
            par_row_residuals(prev, next, *self)
        } else {
            seq_row_residuals(prev, next, *self)
        };
        Ok(row_residuals.iter().sum())
    }
}

/// One Jacobi relaxation sweep.
pub fn relaxation_step(prev: &Array2<f64>, next: &mut Array2<f64>) -> HeatResult<f64> {
    Stencil::Relaxation.apply(prev, next, false)
}

/// One explicit diffusion time step.
pub fn diffusion_step(
    prev: &Array2<f64>,
    next: &mut Array2<f64>,
    coeffs: DiffusionCoefficients,
) -> HeatResult<f64> {
    Stencil::Diffusion(coeffs).apply(prev, next, false)
}

/// Copy the freshly computed interior of `next` back into `prev`.
///
/// The border ring of `prev` is left alone: it holds fixed boundary values
/// or ghost data that the exchange refreshes.
pub fn commit(prev: &mut Array2<f64>, next: &Array2<f64>) -> HeatResult<()> {
    check_shapes(prev, next)?;
    prev.slice_mut(s![1..-1, 1..-1])
        .assign(&next.slice(s![1..-1, 1..-1]));
    Ok(())
}

fn check_shapes(prev: &Array2<f64>, next: &Array2<f64>) -> HeatResult<()> {
    if prev.dim() != next.dim() {
        return Err(HeatError::GeometryViolation(format!(
            "Stencil shape mismatch: prev {:?} vs next {:?}",
            prev.dim(),
            next.dim()
        )));
    }
    let (nx, ny) = prev.dim();
    if nx < 3 || ny < 3 {
        return Err(HeatError::GeometryViolation(format!(
            "Stencil needs at least one interior cell, got shape ({nx}, {ny})"
        )));
    }
    Ok(())
}

fn seq_row_residuals(prev: &Array2<f64>, next: &mut Array2<f64>, stencil: Stencil) -> Vec<f64> {
    let nx = prev.nrows();
    let mut out = Vec::with_capacity(nx - 2);
    for i in 1..nx - 1 {
        out.push(update_row(prev, next.row_mut(i), i, stencil));
    }
    out
}

fn par_row_residuals(prev: &Array2<f64>, next: &mut Array2<f64>, stencil: Stencil) -> Vec<f64> {
    let nx = prev.nrows();
    let mut out: Vec<f64> = next
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .map(|(i, row)| {
            if i == 0 || i == nx - 1 {
                0.0
            } else {
                update_row(prev, row, i, stencil)
            }
        })
        .collect();
    // Drop the two border rows so the summation order matches the serial path.
    out.pop();
    out.remove(0);
    out
}

/// Update row `i` of `next` and return its squared-difference sum.
#[inline(always)]
fn update_row(
    prev: &Array2<f64>,
    mut next_row: ArrayViewMut1<f64>,
    i: usize,
    stencil: Stencil,
) -> f64 {
    let ny = prev.ncols();
    let mut accum = 0.0f64;
    for j in 1..ny - 1 {
        let center = prev[[i, j]];
        let north = prev[[i - 1, j]];
        let south = prev[[i + 1, j]];
        let west = prev[[i, j - 1]];
        let east = prev[[i, j + 1]];

        let value = match stencil {
            Stencil::Relaxation => 0.25 * (north + south + west + east),
            Stencil::Diffusion(c) => {
                let d2x = (north - 2.0 * center + south) * c.inv_dx2;
                let d2y = (west - 2.0 * center + east) * c.inv_dy2;
                center + c.a_dt * (d2x + d2y)
            }
        };
        next_row[j] = value;
        let d = value - center;
        accum += d * d;
    }
    accum
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `(n+2)×(n+2)` field with a hot ring and cold interior.
    fn hot_ring(n: usize, high: f64, low: f64) -> Array2<f64> {
        Array2::from_shape_fn((n + 2, n + 2), |(i, j)| {
            if i == 0 || j == 0 || i == n + 1 || j == n + 1 {
                high
            } else {
                low
            }
        })
    }

    #[test]
    fn test_relaxation_single_sweep_4x4() {
        let prev = hot_ring(4, 10.0, 0.0);
        let mut next = prev.clone();
        let residual = relaxation_step(&prev, &mut next).expect("relax");

        // Interior corners see two hot neighbours, edges one, centre none.
        for &(i, j) in &[(1, 1), (1, 4), (4, 1), (4, 4)] {
            assert!((next[[i, j]] - 5.0).abs() < 1e-15, "corner ({i},{j})");
        }
        for &(i, j) in &[(1, 2), (1, 3), (2, 1), (3, 1), (4, 2), (4, 3), (2, 4), (3, 4)] {
            assert!((next[[i, j]] - 2.5).abs() < 1e-15, "edge ({i},{j})");
        }
        for &(i, j) in &[(2, 2), (2, 3), (3, 2), (3, 3)] {
            assert!(next[[i, j]].abs() < 1e-15, "centre ({i},{j})");
        }
        // 4 corners at 5.0 and 8 edges at 2.5.
        let expected = 4.0 * 25.0 + 8.0 * 6.25;
        assert!((residual - expected).abs() < 1e-12);
    }

    #[test]
    fn test_border_ring_untouched() {
        let prev = hot_ring(6, 3.0, 1.0);
        let mut next = Array2::from_elem(prev.dim(), -7.0);
        relaxation_step(&prev, &mut next).expect("relax");
        let (nx, ny) = next.dim();
        for j in 0..ny {
            assert_eq!(next[[0, j]], -7.0);
            assert_eq!(next[[nx - 1, j]], -7.0);
        }
        for i in 0..nx {
            assert_eq!(next[[i, 0]], -7.0);
            assert_eq!(next[[i, ny - 1]], -7.0);
        }
    }

    #[test]
    fn test_diffusion_uniform_field_is_stationary() {
        let prev = Array2::from_elem((8, 9), 4.0);
        let mut next = prev.clone();
        let coeffs = DiffusionCoefficients::new(0.5, 1e-5, 0.01, 0.01);
        let residual = diffusion_step(&prev, &mut next, coeffs).expect("diffuse");
        assert_eq!(residual, 0.0);
        assert!(next.iter().all(|&v| (v - 4.0).abs() < 1e-15));
    }

    #[test]
    fn test_diffusion_matches_hand_formula() {
        let mut prev = Array2::zeros((3, 3));
        prev[[0, 1]] = 1.0;
        prev[[2, 1]] = 2.0;
        prev[[1, 0]] = 3.0;
        prev[[1, 2]] = 4.0;
        prev[[1, 1]] = 0.5;
        let mut next = prev.clone();
        let coeffs = DiffusionCoefficients::new(2.0, 0.1, 0.5, 0.25);
        diffusion_step(&prev, &mut next, coeffs).expect("diffuse");
        let d2x = (1.0 - 1.0 + 2.0) / 0.25;
        let d2y = (3.0 - 1.0 + 4.0) / 0.0625;
        let expected = 0.5 + 0.2 * (d2x + d2y);
        assert!((next[[1, 1]] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_threaded_matches_sequential_bitwise() {
        let prev = Array2::from_shape_fn((17, 23), |(i, j)| ((i * 31 + j * 7) % 13) as f64 * 0.37);
        let coeffs = DiffusionCoefficients::new(0.5, 2.5e-5, 0.01, 0.01);
        for stencil in [Stencil::Relaxation, Stencil::Diffusion(coeffs)] {
            let mut seq = prev.clone();
            let mut par = prev.clone();
            let r_seq = stencil.apply(&prev, &mut seq, false).expect("seq");
            let r_par = stencil.apply(&prev, &mut par, true).expect("par");
            assert_eq!(r_seq.to_bits(), r_par.to_bits());
            assert_eq!(seq, par);
        }
    }

    #[test]
    fn test_commit_copies_interior_only() {
        let mut prev = Array2::from_elem((5, 5), 1.0);
        let next = Array2::from_elem((5, 5), 2.0);
        commit(&mut prev, &next).expect("commit");
        assert_eq!(prev[[0, 0]], 1.0);
        assert_eq!(prev[[4, 2]], 1.0);
        assert_eq!(prev[[2, 2]], 2.0);
        assert_eq!(prev[[1, 3]], 2.0);
    }

    #[test]
    fn test_shape_guards() {
        let prev = Array2::zeros((4, 4));
        let mut bad = Array2::zeros((4, 5));
        let err = relaxation_step(&prev, &mut bad).expect_err("mismatch must fail");
        match err {
            HeatError::GeometryViolation(msg) => assert!(msg.contains("shape mismatch")),
            other => panic!("Unexpected error: {other:?}"),
        }
        let tiny = Array2::zeros((2, 4));
        let mut tiny_next = tiny.clone();
        assert!(relaxation_step(&tiny, &mut tiny_next).is_err());
    }

    #[test]
    fn test_stencil_from_config() {
        let mut cfg = HeatConfig::new(4, 4, 1);
        assert_eq!(Stencil::from_config(&cfg), Stencil::Relaxation);
        cfg.solver.scheme = Scheme::Diffusion;
        cfg.solver.dt = Some(1e-5);
        match Stencil::from_config(&cfg) {
            Stencil::Diffusion(c) => {
                assert!((c.a_dt - 0.5e-5).abs() < 1e-20);
                assert!((c.inv_dx2 - 1e4).abs() < 1e-6);
            }
            other => panic!("Unexpected stencil: {other:?}"),
        }
    }
}
