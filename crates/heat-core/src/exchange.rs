// ─────────────────────────────────────────────────────────────────────
// SCPN Heat Diffusion — Ghost-Cell Exchange
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Non-blocking halo exchange between neighbouring tiles.
//!
//! Every receive is posted first, then every send, then a single wait-all.
//! Sends never wait on the peer, so two neighbours exchanging in the same
//! order cannot deadlock.

use crate::comm::{decode_f64, encode_f64, Communicator, Request, Tag, COLLECTIVE_TAG_BASE};
use crate::decomposition::{Direction, SubDomain};
use heat_types::error::{HeatError, HeatResult};
use log::trace;
use ndarray::{s, Array2};

/// Tag of the message `sender` sends out of its `face` side.
pub fn exchange_tag(sender: usize, face: Direction) -> Tag {
    (sender * 4 + face.index()) as Tag
}

/// Owned edge cells on `face`, in increasing index order.
pub fn pack_face(field: &Array2<f64>, face: Direction) -> Vec<f64> {
    let (nx, ny) = field.dim();
    let edge = match face {
        Direction::North => field.slice(s![1, 1..ny - 1]),
        Direction::South => field.slice(s![nx - 2, 1..ny - 1]),
        Direction::West => field.slice(s![1..nx - 1, 1]),
        Direction::East => field.slice(s![1..nx - 1, ny - 2]),
    };
    edge.to_vec()
}

/// Write a neighbour's edge into the ghost cells on `face`.
pub fn apply_ghost(field: &mut Array2<f64>, face: Direction, values: &[f64]) -> HeatResult<()> {
    let (nx, ny) = field.dim();
    let mut ghost = match face {
        Direction::North => field.slice_mut(s![0, 1..ny - 1]),
        Direction::South => field.slice_mut(s![nx - 1, 1..ny - 1]),
        Direction::West => field.slice_mut(s![1..nx - 1, 0]),
        Direction::East => field.slice_mut(s![1..nx - 1, ny - 1]),
    };
    if ghost.len() != values.len() {
        return Err(HeatError::GeometryViolation(format!(
            "{face:?} ghost holds {} cells, received {}",
            ghost.len(),
            values.len()
        )));
    }
    for (g, &v) in ghost.iter_mut().zip(values) {
        *g = v;
    }
    Ok(())
}

/// Refresh every ghost side of `field` that faces a neighbour.
pub fn exchange_ghosts<C: Communicator + ?Sized>(
    comm: &C,
    field: &mut Array2<f64>,
    sub: &SubDomain,
) -> HeatResult<()> {
    if field.dim() != sub.local_shape() {
        return Err(HeatError::GeometryViolation(format!(
            "Rank {} field {:?} does not match tile shape {:?}",
            sub.rank,
            field.dim(),
            sub.local_shape()
        )));
    }
    if comm.size() * 4 > COLLECTIVE_TAG_BASE as usize {
        return Err(comm.failure(format!(
            "{} ranks exceed the exchange tag space",
            comm.size()
        )));
    }

    let neighbors: Vec<(Direction, usize)> = sub.neighbors.present().collect();
    if neighbors.is_empty() {
        return Ok(());
    }

    let mut requests: Vec<Request> = Vec::with_capacity(2 * neighbors.len());
    // The neighbour on my North side sends from its South face, and so on.
    for &(dir, peer) in &neighbors {
        requests.push(comm.irecv(peer, exchange_tag(peer, dir.opposite()))?);
    }
    for &(dir, peer) in &neighbors {
        let edge = pack_face(field, dir);
        trace!(
            "rank {} -> {} {:?} face, {} cells",
            sub.rank,
            peer,
            dir,
            edge.len()
        );
        requests.push(comm.isend(peer, exchange_tag(sub.rank, dir), encode_f64(&edge))?);
    }

    let completed = comm.wait_all(requests)?;
    for (&(dir, peer), payload) in neighbors.iter().zip(completed) {
        let bytes = payload
            .ok_or_else(|| comm.failure(format!("no {dir:?} halo from rank {peer}")))?;
        apply_ghost(field, dir, &decode_f64(&bytes)?)?;
    }
    Ok(())
}
