// ─────────────────────────────────────────────────────────────────────
// SCPN Heat Diffusion — MPI Transport
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Requires `--features mpi`. MPI can be initialized once per process, so
//! everything runs inside a single test. Works as a singleton
//! (`cargo test`) or under `mpirun -n N`; with several ranks the run uses
//! an `N x 1` process grid and must match the single-tile result bitwise.

use heat_core::comm::{broadcast_serializing, Communicator};
use heat_core::decomposition::Direction;
use heat_core::driver::{run_distributed, run_serial};
use heat_core::exchange::exchange_tag;
use heat_core::mpi_comm::MpiComm;
use heat_types::config::{DecompositionConfig, HeatConfig, Scheme};

#[test]
fn mpi_world_collectives_and_run() {
    let comm = MpiComm::initialize().expect("MPI init");
    let (rank, size) = (comm.rank(), comm.size());

    // Point to point around a ring, including a send to self when size == 1.
    let next = (rank + 1) % size;
    let prev = (rank + size - 1) % size;
    let tag = exchange_tag(rank, Direction::East);
    let recv = comm
        .irecv(prev, exchange_tag(prev, Direction::East))
        .expect("irecv");
    let send = comm.isend(next, tag, vec![rank as u8; 3]).expect("isend");
    let out = comm.wait_all(vec![recv, send]).expect("wait_all");
    assert_eq!(out, vec![Some(vec![prev as u8; 3]), None]);
    assert!(comm.isend(size, 0, vec![]).is_err());

    let total = comm.all_reduce_sum(rank as f64 + 0.5).expect("reduce");
    assert_eq!(total, (0..size).map(|r| r as f64 + 0.5).sum::<f64>());

    let mine = (rank == 0).then(|| vec![94.52965074427149f64, 0.1 + 0.2]);
    let got = broadcast_serializing(&comm, 0, mine).expect("broadcast");
    assert_eq!(got[0].to_bits(), 94.52965074427149f64.to_bits());
    assert_eq!(got[1].to_bits(), (0.1f64 + 0.2).to_bits());

    let gathered = comm.gather_f64(0, &[rank as f64]).expect("gather");
    if rank == 0 {
        let expected: Vec<Vec<f64>> = (0..size).map(|r| vec![r as f64]).collect();
        assert_eq!(gathered, Some(expected));
    } else {
        assert_eq!(gathered, None);
    }
    comm.barrier();

    let mut cfg = HeatConfig::new(4 * size, 6, 25);
    cfg.solver.scheme = Scheme::Diffusion;
    cfg.physics.temp_high = 94.52965074427149;
    cfg.decomposition = DecompositionConfig {
        nx_domains: size,
        ny_domains: 1,
    };
    let result = run_distributed(&comm, (rank == 0).then(|| cfg.clone())).expect("run");
    match result {
        Some(result) => {
            assert_eq!(rank, 0);
            assert_eq!(result.field, run_serial(&cfg).expect("serial").field);
        }
        None => assert_ne!(rank, 0),
    }
}
