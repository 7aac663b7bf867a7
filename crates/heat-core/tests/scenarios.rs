// ─────────────────────────────────────────────────────────────────────
// SCPN Heat Diffusion — End-to-End Scenarios
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────

use heat_core::driver::{run_serial, run_threaded};
use heat_core::output::{read_field, write_field};
use heat_math::norms::{l2_norm_delta, max_abs_delta};
use heat_types::config::{DecompositionConfig, HeatConfig, Scheme};
use heat_types::error::HeatError;
use heat_types::state::Termination;

fn decomposed(size_x: usize, size_y: usize, steps: usize, nx: usize, ny: usize) -> HeatConfig {
    let mut cfg = HeatConfig::new(size_x, size_y, steps);
    cfg.decomposition = DecompositionConfig {
        nx_domains: nx,
        ny_domains: ny,
    };
    cfg
}

#[test]
fn single_worker_one_sweep_4x4() {
    let result = run_serial(&HeatConfig::new(4, 4, 1)).expect("run");
    let f = &result.field;
    assert_eq!(f.dim(), (6, 6));

    // Interior corners touch two hot boundary cells, edges one, centre none.
    for &(i, j) in &[(1, 1), (1, 4), (4, 1), (4, 4)] {
        assert_eq!(f[[i, j]], 5.0, "corner ({i},{j})");
    }
    for &(i, j) in &[(1, 2), (1, 3), (2, 1), (3, 1), (2, 4), (3, 4), (4, 2), (4, 3)] {
        assert_eq!(f[[i, j]], 2.5, "edge ({i},{j})");
    }
    for &(i, j) in &[(2, 2), (2, 3), (3, 2), (3, 3)] {
        assert_eq!(f[[i, j]], 0.0, "centre ({i},{j})");
    }
    for k in 0..6 {
        assert_eq!(f[[0, k]], 10.0);
        assert_eq!(f[[5, k]], 10.0);
        assert_eq!(f[[k, 0]], 10.0);
        assert_eq!(f[[k, 5]], 10.0);
    }
}

#[test]
fn four_workers_match_single_worker_8x8() {
    for steps in [1, 2, 7, 40] {
        let cfg = decomposed(8, 8, steps, 2, 2);
        let serial = run_serial(&cfg).expect("serial");
        let parallel = run_threaded(&cfg, 4).expect("threaded");
        assert_eq!(parallel.steps, steps);
        assert_eq!(serial.field, parallel.field, "steps={steps}");
    }
}

#[test]
fn decomposed_run_is_bitwise_serial_for_any_boundary_value() {
    for (high, low) in [(94.52965074427149, 0.1 + 0.2), (1.0 / 3.0, -2.0 / 7.0)] {
        for scheme in [Scheme::Relaxation, Scheme::Diffusion] {
            let mut cfg = decomposed(8, 6, 17, 2, 3);
            cfg.physics.temp_high = high;
            cfg.physics.temp_low = low;
            cfg.solver.scheme = scheme;
            let serial = run_serial(&cfg).expect("serial");
            let parallel = run_threaded(&cfg, 6).expect("threaded");
            let mismatched = serial
                .field
                .iter()
                .zip(parallel.field.iter())
                .filter(|(a, b)| a.to_bits() != b.to_bits())
                .count();
            assert_eq!(mismatched, 0, "high={high}, low={low}, {scheme:?}");
        }
    }
}

#[test]
fn two_row_split_keeps_long_decimal_boundary_exact() {
    let mut cfg = decomposed(4, 4, 3, 2, 1);
    cfg.physics.temp_high = 94.52965074427149;
    let serial = run_serial(&cfg).expect("serial");
    let parallel = run_threaded(&cfg, 2).expect("threaded");
    assert_eq!(
        serial.field[[3, 1]].to_bits(),
        parallel.field[[3, 1]].to_bits()
    );
    assert_eq!(serial.field, parallel.field);
}

#[test]
fn decomposition_shape_does_not_change_result() {
    let reference = run_serial(&decomposed(12, 6, 30, 1, 1)).expect("serial");
    for (nx, ny) in [(1, 2), (2, 1), (3, 2), (4, 3), (12, 1)] {
        let cfg = decomposed(12, 6, 30, nx, ny);
        let got = run_threaded(&cfg, nx * ny).expect("threaded");
        assert_eq!(reference.field, got.field, "{nx}x{ny}");
    }
}

#[test]
fn decomposed_diffusion_with_tolerance_matches_serial() {
    let mut cfg = decomposed(8, 8, 5_000, 2, 2);
    cfg.solver.scheme = Scheme::Diffusion;
    cfg.solver.tolerance = Some(1e-4);
    let serial = run_serial(&cfg).expect("serial");
    let parallel = run_threaded(&cfg, 4).expect("threaded");
    assert_eq!(serial.termination, Termination::Converged);
    assert_eq!(parallel.termination, Termination::Converged);
    // The all-reduce sums owned-cell residuals in rank order; a single tile
    // sums row by row, so the stop step may differ by at most one.
    assert!(serial.steps.abs_diff(parallel.steps) <= 1);
}

#[test]
fn mismatched_worker_count_rejected_before_iterating() {
    let cfg = decomposed(8, 8, 100, 2, 2);
    match run_threaded(&cfg, 3) {
        Err(HeatError::WorkerCountMismatch {
            workers,
            nx_domains,
            ny_domains,
        }) => {
            assert_eq!((workers, nx_domains, ny_domains), (3, 2, 2));
        }
        other => panic!("expected worker mismatch, got {other:?}"),
    }
}

#[test]
fn non_dividing_decomposition_rejected() {
    let cfg = decomposed(10, 9, 100, 3, 1);
    let err = run_threaded(&cfg, 3).expect_err("10 rows over 3 domains");
    assert!(matches!(
        err,
        HeatError::UnevenDecomposition {
            axis: 'x',
            size: 10,
            domains: 3
        }
    ));
    assert!(err.is_configuration());
}

#[test]
fn converged_run_is_idempotent() {
    let mut cfg = HeatConfig::new(10, 10, 50_000);
    cfg.solver.tolerance = Some(1e-8);
    let first = run_serial(&cfg).expect("first");
    assert!(first.converged());

    // One more sweep barely moves the field.
    let mut extra = cfg.clone();
    extra.solver.tolerance = None;
    extra.solver.max_steps = first.steps + 1;
    let second = run_serial(&extra).expect("second");
    let delta = l2_norm_delta(&first.field, &second.field).expect("delta");
    assert!(delta <= 1e-8, "extra sweep moved field by {delta}");
}

#[test]
fn assembled_output_round_trips_through_text() {
    let result = run_threaded(&decomposed(6, 6, 12, 3, 3), 9).expect("run");
    let mut text = Vec::new();
    write_field(&mut text, &result.field).expect("write");
    let lines = String::from_utf8(text.clone()).expect("utf8");
    assert_eq!(lines.lines().count(), 8);
    assert!(lines.lines().all(|l| l.split('\t').count() == 8));

    let back = read_field(text.as_slice()).expect("read");
    let max = max_abs_delta(&result.field, &back).expect("max");
    assert!(max <= 1e-11, "round-trip error {max}");
}

#[test]
fn shipped_configs_validate_and_run() {
    let laplace = HeatConfig::from_json_str(include_str!("../../../configs/laplace_8x8_2x2.json"))
        .expect("laplace config");
    laplace.validate(4).expect("valid for 4 workers");
    let result = run_threaded(&laplace, laplace.workers()).expect("run");
    assert!(result.converged());

    let diffusion = HeatConfig::from_json_str(include_str!("../../../configs/diffusion_256.json"))
        .expect("diffusion config");
    assert_eq!(diffusion.solver.scheme, Scheme::Diffusion);
    diffusion.validate(diffusion.workers()).expect("valid");
}
