// ─────────────────────────────────────────────────────────────────────
// SCPN Heat Diffusion — MPI Communicator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! [`Communicator`] over `MPI_COMM_WORLD` via rsmpi.
//!
//! Launch one process per rank (`mpirun -n 4 heat run --mpi ...`). Sends
//! posted with `isend` are buffered until the `wait_all` that names them.
//! That call posts every send of the batch as an MPI immediate send inside
//! one request scope, completes the batch's receives, then waits on the
//! sends. Every rank has its sends in flight before it blocks on a
//! receive, so the four-way ghost exchange cannot deadlock.
//!
//! Broadcast and the sum all-reduce use the native MPI collectives. The
//! MPI reduction order is up to the library, so the residual may differ
//! in the last bit from the rank-ordered sum of the in-process transports.

use crate::comm::{Communicator, Request, Tag};
use heat_types::error::{HeatError, HeatResult};
use log::{debug, trace};
use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as _, CommunicatorCollectives, Destination, Root, Source};
use std::cell::RefCell;

#[derive(Debug)]
struct PendingSend {
    dest: usize,
    tag: Tag,
    payload: Vec<u8>,
}

/// One MPI process of the job.
///
/// Dropping it finalizes MPI, after which the process cannot initialize
/// it again.
pub struct MpiComm {
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
    outbox: RefCell<Vec<PendingSend>>,
    _universe: Universe,
}

impl MpiComm {
    /// Initialize MPI and attach to the world communicator.
    pub fn initialize() -> HeatResult<Self> {
        let universe = mpi::initialize().ok_or_else(|| HeatError::Communication {
            rank: 0,
            message: "MPI is already initialized in this process".to_string(),
        })?;
        let world = universe.world();
        let rank = usize::try_from(world.rank()).map_err(|_| HeatError::Communication {
            rank: 0,
            message: format!("MPI reported negative rank {}", world.rank()),
        })?;
        let size = usize::try_from(world.size()).map_err(|_| HeatError::Communication {
            rank,
            message: format!("MPI reported invalid world size {}", world.size()),
        })?;
        debug!("MPI rank {rank} of {size} initialized");
        Ok(MpiComm {
            world,
            rank,
            size,
            outbox: RefCell::new(Vec::new()),
            _universe: universe,
        })
    }

    fn peer(&self, rank: usize) -> HeatResult<mpi::Rank> {
        if rank >= self.size {
            return Err(self.failure(format!(
                "peer rank {rank} outside world of size {}",
                self.size
            )));
        }
        mpi::Rank::try_from(rank).map_err(|_| self.failure(format!("rank {rank} overflows MPI")))
    }

    fn mpi_tag(&self, tag: Tag) -> HeatResult<mpi::Tag> {
        mpi::Tag::try_from(tag).map_err(|_| self.failure(format!("tag {tag} overflows MPI")))
    }

    /// Take the buffered payload for each send request, in request order.
    fn claim_sends(&self, requests: &[Request]) -> HeatResult<Vec<PendingSend>> {
        let mut outbox = self.outbox.borrow_mut();
        let mut claimed = Vec::new();
        for request in requests {
            if let Request::Send { dest, tag } = *request {
                let pos = outbox
                    .iter()
                    .position(|p| p.dest == dest && p.tag == tag)
                    .ok_or_else(|| {
                        self.failure(format!("send to {dest} (tag {tag}) was never posted"))
                    })?;
                claimed.push(outbox.remove(pos));
            }
        }
        Ok(claimed)
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> HeatResult<Request> {
        self.peer(dest)?;
        self.mpi_tag(tag)?;
        trace!(
            "rank {} -> {dest} tag {tag}: {} bytes queued",
            self.rank,
            payload.len()
        );
        self.outbox
            .borrow_mut()
            .push(PendingSend { dest, tag, payload });
        Ok(Request::Send { dest, tag })
    }

    fn irecv(&self, source: usize, tag: Tag) -> HeatResult<Request> {
        self.peer(source)?;
        self.mpi_tag(tag)?;
        Ok(Request::Recv { source, tag })
    }

    fn wait_all(&self, requests: Vec<Request>) -> HeatResult<Vec<Option<Vec<u8>>>> {
        let sends = self.claim_sends(&requests)?;
        let send_targets = sends
            .iter()
            .map(|p| Ok((self.peer(p.dest)?, self.mpi_tag(p.tag)?)))
            .collect::<HeatResult<Vec<_>>>()?;
        let recv_sources = requests
            .iter()
            .filter_map(|r| match *r {
                Request::Recv { source, tag } => Some((source, tag)),
                Request::Send { .. } => None,
            })
            .map(|(source, tag)| Ok((self.peer(source)?, self.mpi_tag(tag)?)))
            .collect::<HeatResult<Vec<_>>>()?;

        let world = &self.world;
        let received: Vec<Vec<u8>> = mpi::request::scope(|scope| {
            let in_flight: Vec<_> = sends
                .iter()
                .zip(&send_targets)
                .map(|(p, &(dest, tag))| {
                    world
                        .process_at_rank(dest)
                        .immediate_send_with_tag(scope, &p.payload[..], tag)
                })
                .collect();
            let payloads = recv_sources
                .iter()
                .map(|&(source, tag)| {
                    let (payload, _status) =
                        world.process_at_rank(source).receive_vec_with_tag::<u8>(tag);
                    payload
                })
                .collect();
            for request in in_flight {
                request.wait_without_status();
            }
            payloads
        });

        let mut received = received.into_iter();
        Ok(requests
            .iter()
            .map(|r| match r {
                Request::Send { .. } => None,
                Request::Recv { .. } => received.next(),
            })
            .collect())
    }

    fn barrier(&self) {
        self.world.barrier();
    }

    /// Length first, then the bytes.
    fn broadcast_bytes(&self, root: usize, data: &mut Vec<u8>) -> HeatResult<()> {
        let root_process = self.world.process_at_rank(self.peer(root)?);
        let mut len = data.len() as u64;
        root_process.broadcast_into(&mut len);
        if self.rank != root {
            let len = usize::try_from(len)
                .map_err(|_| self.failure(format!("broadcast of {len} bytes overflows usize")))?;
            data.resize(len, 0);
        }
        root_process.broadcast_into(&mut data[..]);
        Ok(())
    }

    fn all_reduce_sum(&self, local: f64) -> HeatResult<f64> {
        let mut total = 0.0f64;
        self.world
            .all_reduce_into(&local, &mut total, &SystemOperation::sum());
        Ok(total)
    }
}
