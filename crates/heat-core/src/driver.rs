// ─────────────────────────────────────────────────────────────────────
// SCPN Heat Diffusion — Driver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Per-rank driver loop.
//!
//! ```text
//! Initializing -> Iterating -> Converged | MaxStepsReached -> Finalizing
//! ```
//!
//! Each iteration: stencil update, ghost exchange, barrier, step counter,
//! then (when a tolerance is configured) the residual all-reduce.

use crate::comm::{broadcast_serializing, thread_universe, Communicator, SingleProcessComm};
use crate::decomposition::{Decomposition, SubDomain};
use crate::exchange::exchange_ghosts;
use crate::field::LocalField;
use crate::output::assemble_field;
use heat_math::stencil::Stencil;
use heat_types::config::{DecompositionConfig, HeatConfig};
use heat_types::error::{HeatError, HeatResult};
use heat_types::state::{IterationState, Phase, SolveResult, Termination};
use log::{debug, info};
use std::thread;
use std::time::Instant;

/// Residual progress is logged every this many steps at debug level.
const LOG_EVERY: usize = 100;

/// One rank's solver.
pub struct Solver<'c, C: Communicator + ?Sized> {
    comm: &'c C,
    config: HeatConfig,
    decomposition: Decomposition,
    subdomain: SubDomain,
    stencil: Stencil,
    field: LocalField,
    state: IterationState,
    phase: Phase,
}

impl<'c, C: Communicator + ?Sized> Solver<'c, C> {
    /// Distribute the configuration from rank 0 and build this rank's tile.
    ///
    /// Rank 0 passes `Some(config)`, other ranks `None`. Rank 0 validates
    /// before distributing and ships the verdict, so every rank fails
    /// together on a bad configuration and no exchange is ever attempted.
    /// Rank 0 returns the validation error itself; the other ranks get a
    /// [`HeatError::ConfigError`] carrying its message.
    pub fn initialize(comm: &'c C, config: Option<HeatConfig>) -> HeatResult<Self> {
        let rank = comm.rank();
        let mut rejection = None;
        let verdict: Option<Result<HeatConfig, String>> = if rank == 0 {
            let checked = config
                .ok_or_else(|| {
                    HeatError::ConfigError("rank 0 started without a configuration".to_string())
                })
                .and_then(|cfg| cfg.validate(comm.size()).map(|()| cfg));
            Some(checked.map_err(|e| {
                let msg = e.to_string();
                rejection = Some(e);
                msg
            }))
        } else {
            None
        };

        let config = match broadcast_serializing(comm, 0, verdict)? {
            Ok(cfg) => cfg,
            Err(msg) => {
                return Err(rejection.unwrap_or_else(|| {
                    HeatError::ConfigError(format!("configuration rejected at startup: {msg}"))
                }))
            }
        };
        config.validate(comm.size())?;

        let decomposition = Decomposition::from_config(&config, comm.size())?;
        let subdomain = decomposition.subdomain(rank)?.clone();
        debug!(
            "rank {rank} at ({}, {}) owns x {}..={} y {}..={}, neighbours {:?}",
            subdomain.row,
            subdomain.col,
            subdomain.xs,
            subdomain.xe,
            subdomain.ys,
            subdomain.ye,
            subdomain.neighbors
        );

        let field = LocalField::new(
            &subdomain,
            config.physics.temp_high,
            config.physics.temp_low,
        );
        let stencil = Stencil::from_config(&config);

        Ok(Solver {
            comm,
            config,
            decomposition,
            subdomain,
            stencil,
            field,
            state: IterationState::new(),
            phase: Phase::Initializing,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &IterationState {
        &self.state
    }

    pub fn config(&self) -> &HeatConfig {
        &self.config
    }

    pub fn subdomain(&self) -> &SubDomain {
        &self.subdomain
    }

    pub fn field(&self) -> &LocalField {
        &self.field
    }

    /// One full iteration.
    pub fn step(&mut self) -> HeatResult<()> {
        let local = self
            .field
            .step(&self.stencil, self.config.solver.threaded_stencil)?;
        exchange_ghosts(self.comm, &mut self.field.prev, &self.subdomain)?;
        self.comm.barrier();

        self.state.step += 1;
        self.state.local_residual = local;
        if self.config.solver.tolerance.is_some() {
            self.state.global_residual = Some(self.comm.all_reduce_sum(local)?);
        }
        Ok(())
    }

    /// Iterate to a terminal state, then gather at rank 0.
    ///
    /// Returns `Some(result)` on rank 0 and `None` elsewhere.
    pub fn run(mut self) -> HeatResult<Option<SolveResult>> {
        let started = Instant::now();
        let max_steps = self.config.solver.max_steps;
        let tolerance = self.config.solver.tolerance;

        self.phase = Phase::Iterating;
        if self.comm.rank() == 0 {
            info!(
                "{}: {}x{} grid on {}x{} workers, {:?}, max_steps={}, tolerance={:?}",
                self.config.run_name,
                self.config.grid.size_x,
                self.config.grid.size_y,
                self.decomposition.nx_domains,
                self.decomposition.ny_domains,
                self.config.solver.scheme,
                max_steps,
                tolerance
            );
        }

        let termination = loop {
            if let Some(t) = self.state.termination(max_steps, tolerance) {
                break t;
            }
            self.step()?;
            if self.comm.rank() == 0 && self.state.step % LOG_EVERY == 0 {
                debug!(
                    "step {}: local residual {:.3e}, global {:?}",
                    self.state.step, self.state.local_residual, self.state.global_residual
                );
            }
        };
        self.phase = termination.into();
        debug!(
            "rank {} left the loop as {:?} at step {}",
            self.comm.rank(),
            self.phase,
            self.state.step
        );

        self.phase = Phase::Finalizing;
        let gathered = self.comm.gather_f64(0, &self.field.owned_buffer())?;
        let Some(tiles) = gathered else {
            return Ok(None);
        };
        let buffer: Vec<f64> = tiles.concat();
        let field = assemble_field(&buffer, &self.decomposition, self.config.physics.temp_high)?;
        let residual = self.state.global_residual.map(f64::sqrt);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;

        match termination {
            Termination::Converged => info!(
                "{}: converged after {} steps (residual {:.3e}) in {:.1} ms",
                self.config.run_name,
                self.state.step,
                residual.unwrap_or(0.0),
                elapsed_ms
            ),
            Termination::MaxStepsReached => info!(
                "{}: stopped at max_steps={} in {:.1} ms",
                self.config.run_name, self.state.step, elapsed_ms
            ),
        }

        Ok(Some(SolveResult {
            field,
            steps: self.state.step,
            residual,
            termination,
            elapsed_ms,
        }))
    }
}

/// Run on the calling thread with a single `1 × 1` tile, whatever process
/// grid the configuration names.
pub fn run_serial(config: &HeatConfig) -> HeatResult<SolveResult> {
    let mut cfg = config.clone();
    cfg.decomposition = DecompositionConfig::default();
    let comm = SingleProcessComm::new();
    Solver::initialize(&comm, Some(cfg))?
        .run()?
        .ok_or_else(|| comm.failure("rank 0 finished without a result".to_string()))
}

/// Run the calling rank of a job whose ranks `comm` already connects.
///
/// Rank 0 passes `Some(config)` and gets `Some(result)` back; every other
/// rank passes `None` and gets `None`.
pub fn run_distributed<C: Communicator + ?Sized>(
    comm: &C,
    config: Option<HeatConfig>,
) -> HeatResult<Option<SolveResult>> {
    Solver::initialize(comm, config)?.run()
}

/// Run `workers` ranks as scoped threads over a [`thread_universe`].
///
/// The configuration is validated against `workers` before any thread is
/// spawned.
pub fn run_threaded(config: &HeatConfig, workers: usize) -> HeatResult<SolveResult> {
    config.validate(workers)?;
    let comms = thread_universe(workers);

    let outcomes: Vec<HeatResult<Option<SolveResult>>> = thread::scope(|s| {
        let mut handles = Vec::with_capacity(workers);
        for comm in comms {
            let rank = comm.rank();
            let cfg = (rank == 0).then(|| config.clone());
            let handle = thread::Builder::new()
                .name(format!("heat-rank-{rank}"))
                .spawn_scoped(s, move || run_distributed(&comm, cfg))?;
            handles.push((rank, handle));
        }
        Ok::<_, HeatError>(
            handles
                .into_iter()
                .map(|(rank, h)| {
                    h.join().unwrap_or_else(|_| {
                        Err(HeatError::Communication {
                            rank,
                            message: "worker thread panicked".to_string(),
                        })
                    })
                })
                .collect(),
        )
    })?;

    let mut root = None;
    for outcome in outcomes {
        if let Some(result) = outcome? {
            root = Some(result);
        }
    }
    root.ok_or_else(|| HeatError::Communication {
        rank: 0,
        message: "rank 0 finished without a result".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use heat_types::config::Scheme;

    #[test]
    fn test_serial_single_sweep_4x4() {
        let cfg = HeatConfig::new(4, 4, 1);
        let result = run_serial(&cfg).expect("run");
        assert_eq!(result.steps, 1);
        assert_eq!(result.termination, Termination::MaxStepsReached);
        assert_eq!(result.residual, None);
        assert_eq!(result.field[[1, 1]], 5.0);
        assert_eq!(result.field[[1, 2]], 2.5);
        assert_eq!(result.field[[2, 2]], 0.0);
        assert_eq!(result.field[[0, 0]], 10.0);
    }

    #[test]
    fn test_zero_steps_returns_initial_field() {
        let cfg = HeatConfig::new(3, 3, 0);
        let result = run_serial(&cfg).expect("run");
        assert_eq!(result.steps, 0);
        assert_eq!(result.field, crate::field::init_field(3, 3, 10.0, 0.0));
    }

    #[test]
    fn test_solver_phases() {
        let comm = SingleProcessComm::new();
        let solver = Solver::initialize(&comm, Some(HeatConfig::new(4, 4, 2))).expect("init");
        assert_eq!(solver.phase(), Phase::Initializing);
        assert_eq!(solver.subdomain().local_shape(), (6, 6));
        assert_eq!(solver.state().step, 0);
    }

    #[test]
    fn test_step_tracks_global_residual_only_with_tolerance() {
        let comm = SingleProcessComm::new();
        let mut solver = Solver::initialize(&comm, Some(HeatConfig::new(4, 4, 5))).expect("init");
        solver.step().expect("step");
        assert_eq!(solver.state().global_residual, None);
        assert!((solver.state().local_residual - 150.0).abs() < 1e-12);

        let mut cfg = HeatConfig::new(4, 4, 5);
        cfg.solver.tolerance = Some(1e-3);
        let mut solver = Solver::initialize(&comm, Some(cfg)).expect("init");
        solver.step().expect("step");
        let global = solver.state().global_residual.expect("tracked");
        assert!((global - 150.0).abs() < 1e-12);
    }

    #[test]
    fn test_serial_converges_with_tolerance() {
        let mut cfg = HeatConfig::new(6, 6, 10_000);
        cfg.solver.tolerance = Some(1e-6);
        let result = run_serial(&cfg).expect("run");
        assert!(result.converged());
        assert!(result.steps < 10_000);
        assert!(result.residual.expect("residual") <= 1e-6);
        // Laplace steady state with a uniform boundary is uniform.
        assert!(result.field.iter().all(|&v| (v - 10.0).abs() < 1e-4));
    }

    #[test]
    fn test_rank0_without_config_fails() {
        let comm = SingleProcessComm::new();
        assert!(matches!(
            Solver::initialize(&comm, None),
            Err(HeatError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_root_config_fails_every_rank() {
        let comms = thread_universe(2);
        let failed: Vec<bool> = thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| s.spawn(move || run_distributed(&comm, None).is_err()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("rank thread panicked"))
                .collect()
        });
        assert_eq!(failed, vec![true, true]);
    }

    #[test]
    fn test_run_serial_ignores_process_grid() {
        let mut cfg = HeatConfig::new(4, 4, 3);
        cfg.decomposition = DecompositionConfig {
            nx_domains: 2,
            ny_domains: 2,
        };
        assert!(run_serial(&cfg).is_ok());
    }

    #[test]
    fn test_threaded_diffusion_matches_serial() {
        let mut cfg = HeatConfig::new(6, 4, 25);
        cfg.solver.scheme = Scheme::Diffusion;
        cfg.decomposition = DecompositionConfig {
            nx_domains: 3,
            ny_domains: 2,
        };
        let serial = run_serial(&cfg).expect("serial");
        let threaded = run_threaded(&cfg, 6).expect("threaded");
        assert_eq!(serial.field, threaded.field);
    }

    fn initialize_on_threads(size: usize, cfg: &HeatConfig) -> Vec<Option<HeatError>> {
        let comms = thread_universe(size);
        thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let mine = (comm.rank() == 0).then(|| cfg.clone());
                    s.spawn(move || Solver::initialize(&comm, mine).err())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("rank thread panicked"))
                .collect()
        })
    }

    #[test]
    fn test_initialize_mismatch_keeps_structured_error_on_rank0() {
        let mut cfg = HeatConfig::new(8, 8, 10);
        cfg.decomposition = DecompositionConfig {
            nx_domains: 2,
            ny_domains: 2,
        };
        let errors = initialize_on_threads(3, &cfg);
        assert!(matches!(
            errors[0],
            Some(HeatError::WorkerCountMismatch {
                workers: 3,
                nx_domains: 2,
                ny_domains: 2
            })
        ));
        for err in &errors[1..] {
            match err {
                Some(HeatError::ConfigError(msg)) => assert!(msg.contains("3 workers")),
                other => panic!("expected a forwarded rejection, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_initialize_uneven_keeps_structured_error_on_rank0() {
        let mut cfg = HeatConfig::new(9, 8, 10);
        cfg.decomposition = DecompositionConfig {
            nx_domains: 2,
            ny_domains: 1,
        };
        let errors = initialize_on_threads(2, &cfg);
        assert!(matches!(
            errors[0],
            Some(HeatError::UnevenDecomposition { axis: 'x', .. })
        ));
        assert!(matches!(errors[1], Some(HeatError::ConfigError(_))));
    }

    #[test]
    fn test_threaded_rejects_mismatch_before_spawning() {
        let mut cfg = HeatConfig::new(8, 8, 1);
        cfg.decomposition = DecompositionConfig {
            nx_domains: 2,
            ny_domains: 2,
        };
        assert!(matches!(
            run_threaded(&cfg, 3),
            Err(HeatError::WorkerCountMismatch { workers: 3, .. })
        ));
    }
}
