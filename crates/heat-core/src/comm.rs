// ─────────────────────────────────────────────────────────────────────
// SCPN Heat Diffusion — Communicators
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Message-passing abstraction used by the distributed driver.
//!
//! A transport only has to provide tagged non-blocking point-to-point
//! messages, a wait-all and a barrier; broadcast, gather and the sum
//! all-reduce are provided on top of those. Two transports ship here:
//!
//! - [`SingleProcessComm`]: one rank, collectives are identities.
//! - [`ThreadComm`]: one OS thread per rank, mailboxes over
//!   `std::sync::mpsc` and a shared `std::sync::Barrier`.
//!
//! Payloads are raw bytes; `f64` buffers travel through `bytemuck` casts.

use heat_types::error::{HeatError, HeatResult};
use log::trace;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Barrier};

/// Message tag.
pub type Tag = u32;

/// Tags at or above this value are reserved for the provided collectives.
pub const COLLECTIVE_TAG_BASE: Tag = 1 << 30;

const TAG_REDUCE: Tag = COLLECTIVE_TAG_BASE;
const TAG_REDUCE_RESULT: Tag = COLLECTIVE_TAG_BASE + 1;
const TAG_BROADCAST: Tag = COLLECTIVE_TAG_BASE + 2;
const TAG_GATHER: Tag = COLLECTIVE_TAG_BASE + 3;

/// Handle for an outstanding non-blocking operation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "requests must be completed with wait_all"]
pub enum Request {
    Send { dest: usize, tag: Tag },
    Recv { source: usize, tag: Tag },
}

/// Tagged message as it sits in a mailbox.
#[derive(Debug)]
struct Envelope {
    source: usize,
    tag: Tag,
    payload: Vec<u8>,
}

pub fn encode_f64(values: &[f64]) -> Vec<u8> {
    bytemuck::cast_slice::<f64, u8>(values).to_vec()
}

pub fn decode_f64(bytes: &[u8]) -> HeatResult<Vec<f64>> {
    if bytes.len() % std::mem::size_of::<f64>() != 0 {
        return Err(HeatError::GeometryViolation(format!(
            "Payload of {} bytes is not a whole number of f64 values",
            bytes.len()
        )));
    }
    Ok(bytemuck::pod_collect_to_vec::<u8, f64>(bytes))
}

pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Post a send. Never blocks.
    fn isend(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> HeatResult<Request>;

    /// Post a receive for the next message from `source` carrying `tag`.
    fn irecv(&self, source: usize, tag: Tag) -> HeatResult<Request>;

    /// Block until every request completes. The output is aligned with
    /// `requests`: received payloads for receives, `None` for sends.
    fn wait_all(&self, requests: Vec<Request>) -> HeatResult<Vec<Option<Vec<u8>>>>;

    /// Block until every rank reaches the barrier.
    fn barrier(&self);

    fn send(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> HeatResult<()> {
        let req = self.isend(dest, tag, payload)?;
        self.wait_all(vec![req])?;
        Ok(())
    }

    fn recv(&self, source: usize, tag: Tag) -> HeatResult<Vec<u8>> {
        let req = self.irecv(source, tag)?;
        self.wait_all(vec![req])?
            .pop()
            .flatten()
            .ok_or_else(|| self.failure(format!("receive from {source} (tag {tag}) yielded nothing")))
    }

    /// Replace `data` on every rank with root's copy.
    fn broadcast_bytes(&self, root: usize, data: &mut Vec<u8>) -> HeatResult<()> {
        if self.rank() == root {
            let sends = (0..self.size())
                .filter(|&r| r != root)
                .map(|r| self.isend(r, TAG_BROADCAST, data.clone()))
                .collect::<HeatResult<Vec<_>>>()?;
            self.wait_all(sends)?;
        } else {
            *data = self.recv(root, TAG_BROADCAST)?;
        }
        Ok(())
    }

    /// Sum of `local` over all ranks, identical on every rank.
    ///
    /// Root adds contributions in rank order, so the result does not depend
    /// on message arrival order.
    fn all_reduce_sum(&self, local: f64) -> HeatResult<f64> {
        if self.size() == 1 {
            return Ok(local);
        }
        if self.rank() == 0 {
            let recvs = (1..self.size())
                .map(|r| self.irecv(r, TAG_REDUCE))
                .collect::<HeatResult<Vec<_>>>()?;
            let mut total = local;
            for payload in self.wait_all(recvs)?.into_iter().flatten() {
                total += decode_scalar(&payload, self)?;
            }
            let sends = (1..self.size())
                .map(|r| self.isend(r, TAG_REDUCE_RESULT, encode_f64(&[total])))
                .collect::<HeatResult<Vec<_>>>()?;
            self.wait_all(sends)?;
            Ok(total)
        } else {
            self.send(0, TAG_REDUCE, encode_f64(&[local]))?;
            let payload = self.recv(0, TAG_REDUCE_RESULT)?;
            decode_scalar(&payload, self)
        }
    }

    /// Collect every rank's buffer at `root`, ordered by rank.
    /// Non-root ranks get `None`.
    fn gather_f64(&self, root: usize, local: &[f64]) -> HeatResult<Option<Vec<Vec<f64>>>> {
        if self.rank() != root {
            self.send(root, TAG_GATHER, encode_f64(local))?;
            return Ok(None);
        }
        let recvs = (0..self.size())
            .filter(|&r| r != root)
            .map(|r| self.irecv(r, TAG_GATHER))
            .collect::<HeatResult<Vec<_>>>()?;
        let mut received = self.wait_all(recvs)?.into_iter();
        let mut out = Vec::with_capacity(self.size());
        for r in 0..self.size() {
            if r == root {
                out.push(local.to_vec());
            } else {
                let payload = received
                    .next()
                    .flatten()
                    .ok_or_else(|| self.failure(format!("missing gather payload from {r}")))?;
                out.push(decode_f64(&payload)?);
            }
        }
        Ok(Some(out))
    }

    fn failure(&self, message: String) -> HeatError {
        HeatError::Communication {
            rank: self.rank(),
            message,
        }
    }
}

fn decode_scalar<C: Communicator + ?Sized>(payload: &[u8], comm: &C) -> HeatResult<f64> {
    match decode_f64(payload)?.as_slice() {
        [v] => Ok(*v),
        other => Err(comm.failure(format!(
            "expected one f64 in reduction payload, got {}",
            other.len()
        ))),
    }
}

/// Broadcast a serde value from `root`. Root passes `Some(value)`, the
/// other ranks pass `None`; every rank gets root's value back.
pub fn broadcast_serializing<C, T>(comm: &C, root: usize, value: Option<T>) -> HeatResult<T>
where
    C: Communicator + ?Sized,
    T: Serialize + DeserializeOwned,
{
    let mut raw = if comm.rank() == root {
        let v = value
            .as_ref()
            .ok_or_else(|| comm.failure("broadcast root has no value".to_string()))?;
        serde_json::to_vec(v)?
    } else {
        Vec::new()
    };
    comm.broadcast_bytes(root, &mut raw)?;
    match value {
        Some(v) if comm.rank() == root => Ok(v),
        _ => Ok(serde_json::from_slice(&raw)?),
    }
}

// ── Single process ───────────────────────────────────────────────────

/// Size-one communicator. Messages to self are queued locally.
#[derive(Debug, Default)]
pub struct SingleProcessComm {
    queue: RefCell<VecDeque<Envelope>>,
}

impl SingleProcessComm {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SingleProcessComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn isend(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> HeatResult<Request> {
        if dest != 0 {
            return Err(self.failure(format!("no rank {dest} in a single-process run")));
        }
        self.queue.borrow_mut().push_back(Envelope {
            source: 0,
            tag,
            payload,
        });
        Ok(Request::Send { dest, tag })
    }

    fn irecv(&self, source: usize, tag: Tag) -> HeatResult<Request> {
        if source != 0 {
            return Err(self.failure(format!("no rank {source} in a single-process run")));
        }
        Ok(Request::Recv { source, tag })
    }

    fn wait_all(&self, requests: Vec<Request>) -> HeatResult<Vec<Option<Vec<u8>>>> {
        requests
            .into_iter()
            .map(|req| match req {
                Request::Send { .. } => Ok(None),
                Request::Recv { source, tag } => take_matching(&self.queue, source, tag)
                    .map(|env| Some(env.payload))
                    .ok_or_else(|| {
                        self.failure(format!("receive (tag {tag}) would block forever"))
                    }),
            })
            .collect()
    }

    fn barrier(&self) {}
}

fn take_matching(queue: &RefCell<VecDeque<Envelope>>, source: usize, tag: Tag) -> Option<Envelope> {
    let mut q = queue.borrow_mut();
    let pos = q.iter().position(|e| e.source == source && e.tag == tag)?;
    q.remove(pos)
}

// ── Thread-per-rank ──────────────────────────────────────────────────

/// One rank of an in-process universe. Owned by exactly one thread.
#[derive(Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    outboxes: Vec<Sender<Envelope>>,
    mailbox: Receiver<Envelope>,
    /// Arrived but not yet matched messages, in arrival order.
    unmatched: RefCell<VecDeque<Envelope>>,
    barrier: Arc<Barrier>,
}

/// Build `size` connected ranks; hand one to each worker thread.
pub fn thread_universe(size: usize) -> Vec<ThreadComm> {
    let barrier = Arc::new(Barrier::new(size.max(1)));
    let (outboxes, mailboxes): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
        (0..size).map(|_| mpsc::channel()).unzip();
    mailboxes
        .into_iter()
        .enumerate()
        .map(|(rank, mailbox)| ThreadComm {
            rank,
            size,
            outboxes: outboxes.clone(),
            mailbox,
            unmatched: RefCell::new(VecDeque::new()),
            barrier: Arc::clone(&barrier),
        })
        .collect()
}

impl ThreadComm {
    fn check_peer(&self, peer: usize) -> HeatResult<()> {
        if peer >= self.size {
            return Err(self.failure(format!(
                "peer rank {peer} outside universe of {}",
                self.size
            )));
        }
        Ok(())
    }

    /// Block until the next `(source, tag)` message is available.
    fn match_message(&self, source: usize, tag: Tag) -> HeatResult<Vec<u8>> {
        if let Some(env) = take_matching(&self.unmatched, source, tag) {
            return Ok(env.payload);
        }
        loop {
            let env = self.mailbox.recv().map_err(|_| {
                self.failure(format!("mailbox closed while waiting for {source} (tag {tag})"))
            })?;
            if env.source == source && env.tag == tag {
                return Ok(env.payload);
            }
            self.unmatched.borrow_mut().push_back(env);
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> HeatResult<Request> {
        self.check_peer(dest)?;
        trace!(
            "rank {} isend -> {} tag={} bytes={}",
            self.rank,
            dest,
            tag,
            payload.len()
        );
        self.outboxes[dest]
            .send(Envelope {
                source: self.rank,
                tag,
                payload,
            })
            .map_err(|_| self.failure(format!("rank {dest} hung up")))?;
        Ok(Request::Send { dest, tag })
    }

    fn irecv(&self, source: usize, tag: Tag) -> HeatResult<Request> {
        self.check_peer(source)?;
        Ok(Request::Recv { source, tag })
    }

    fn wait_all(&self, requests: Vec<Request>) -> HeatResult<Vec<Option<Vec<u8>>>> {
        requests
            .into_iter()
            .map(|req| match req {
                Request::Send { .. } => Ok(None),
                Request::Recv { source, tag } => self.match_message(source, tag).map(Some),
            })
            .collect()
    }

    fn barrier(&self) {
        self.barrier.wait();
    }
}
