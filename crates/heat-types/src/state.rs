// ─────────────────────────────────────────────────────────────────────
// SCPN Heat Diffusion — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use ndarray::Array2;

/// Driver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Iterating,
    Converged,
    MaxStepsReached,
    Finalizing,
}

/// Why the driver loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Converged,
    MaxStepsReached,
}

impl From<Termination> for Phase {
    fn from(t: Termination) -> Self {
        match t {
            Termination::Converged => Phase::Converged,
            Termination::MaxStepsReached => Phase::MaxStepsReached,
        }
    }
}

/// Per-worker loop counters, mutated once per iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationState {
    pub step: usize,
    /// Sum of squared differences over this worker's owned cells.
    pub local_residual: f64,
    /// All-reduced residual; only tracked when a tolerance is configured.
    pub global_residual: Option<f64>,
}

impl IterationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminal check: `step >= max_steps`, or `sqrt(global) <= tolerance`.
    pub fn termination(&self, max_steps: usize, tolerance: Option<f64>) -> Option<Termination> {
        if let (Some(tol), Some(global)) = (tolerance, self.global_residual) {
            if global.sqrt() <= tol {
                return Some(Termination::Converged);
            }
        }
        if self.step >= max_steps {
            return Some(Termination::MaxStepsReached);
        }
        None
    }
}

/// Result of a complete run, as seen from rank 0.
#[derive(Debug, Clone)]
pub struct SolveResult {
    /// Full field `(size_x+2, size_y+2)` including the fixed boundary ring.
    pub field: Array2<f64>,
    pub steps: usize,
    /// `sqrt` of the last global residual, when one was computed.
    pub residual: Option<f64>,
    pub termination: Termination,
    pub elapsed_ms: f64,
}

impl SolveResult {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}
