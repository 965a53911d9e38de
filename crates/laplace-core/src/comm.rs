// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Rank Messaging
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Point-to-point messaging between ranks.
//!
//! The solver talks to peers only through [`RankLink`], so the transport
//! is swappable: the in-process [`ThreadFabric`] backs each ordered
//! (sender, receiver, tag) triple with its own `std::sync::mpsc` channel,
//! and wiring the same trait to rsmpi is a 1:1 swap. Tags separate the
//! iteration, reduction and setup message streams exactly as MPI tags do
//! in the reference transport, so late reads of one stream can never
//! consume messages of another.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Duration;

use num_complex::Complex64;

use laplace_types::error::{LaplaceError, LaplaceResult};

/// Message stream used during solver setup (guess construction, level
/// builds, final halo synchronization).
pub const TAG_SETUP: usize = 0;
/// Per-iteration neighbour exchange.
pub const TAG_ITER: usize = 1;
/// Chain reductions (convergence verification, failure classification).
pub const TAG_REDUCE: usize = 2;

const NTAGS: usize = 3;

/// Receive timeout. Every receive in the solver is paired with a prior
/// matching send, so hitting this means a protocol bug, not load.
const RECV_TIMEOUT: Duration = Duration::from_secs(60);

/// One batched message: per-mode complex values plus a completion flag.
#[derive(Debug, Clone)]
pub struct Packet {
    pub values: Vec<Complex64>,
    pub done: bool,
}

impl Packet {
    pub fn new(values: Vec<Complex64>) -> Self {
        Packet {
            values,
            done: false,
        }
    }

    pub fn with_done(values: Vec<Complex64>, done: bool) -> Self {
        Packet { values, done }
    }
}

/// Messaging endpoint owned by one rank.
pub trait RankLink: Send {
    fn rank(&self) -> usize;
    fn nranks(&self) -> usize;
    fn send(&self, to: usize, tag: usize, packet: Packet) -> LaplaceResult<()>;
    fn recv(&self, from: usize, tag: usize) -> LaplaceResult<Packet>;
}

/// In-process fabric: one mpsc channel per ordered rank pair and tag.
pub struct ThreadFabric;

pub struct ThreadLink {
    rank: usize,
    nranks: usize,
    // Indexed by peer * NTAGS + tag; None on the diagonal.
    tx: Vec<Option<Sender<Packet>>>,
    rx: Vec<Option<Receiver<Packet>>>,
}

impl ThreadFabric {
    /// Wire up `nranks` fully-connected endpoints.
    pub fn connect(nranks: usize) -> Vec<ThreadLink> {
        let mut links: Vec<ThreadLink> = (0..nranks)
            .map(|rank| ThreadLink {
                rank,
                nranks,
                tx: (0..nranks * NTAGS).map(|_| None).collect(),
                rx: (0..nranks * NTAGS).map(|_| None).collect(),
            })
            .collect();

        for from in 0..nranks {
            for to in 0..nranks {
                if from == to {
                    continue;
                }
                for tag in 0..NTAGS {
                    let (tx, rx) = channel();
                    links[from].tx[to * NTAGS + tag] = Some(tx);
                    links[to].rx[from * NTAGS + tag] = Some(rx);
                }
            }
        }
        links
    }
}

impl RankLink for ThreadLink {
    fn rank(&self) -> usize {
        self.rank
    }

    fn nranks(&self) -> usize {
        self.nranks
    }

    fn send(&self, to: usize, tag: usize, packet: Packet) -> LaplaceResult<()> {
        let slot = self
            .tx
            .get(to * NTAGS + tag)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| LaplaceError::CommError {
                rank: self.rank,
                message: format!("no channel to rank {to} (tag {tag})"),
            })?;
        slot.send(packet).map_err(|_| LaplaceError::CommError {
            rank: self.rank,
            message: format!("peer rank {to} disconnected (tag {tag})"),
        })
    }

    fn recv(&self, from: usize, tag: usize) -> LaplaceResult<Packet> {
        let slot = self
            .rx
            .get(from * NTAGS + tag)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| LaplaceError::CommError {
                rank: self.rank,
                message: format!("no channel from rank {from} (tag {tag})"),
            })?;
        slot.recv_timeout(RECV_TIMEOUT)
            .map_err(|_| LaplaceError::CommError {
                rank: self.rank,
                message: format!("timed out waiting for rank {from} (tag {tag})"),
            })
    }
}

/// Chain all-reduce of an elementwise maximum: sweep up the rank chain
/// accumulating, then broadcast the result back down. Uses only
/// nearest-neighbour messages.
pub fn chain_reduce_max(link: &dyn RankLink, local: &[f64]) -> LaplaceResult<Vec<f64>> {
    let rank = link.rank();
    let nranks = link.nranks();
    let mut acc: Vec<f64> = local.to_vec();

    if nranks == 1 {
        return Ok(acc);
    }

    if rank > 0 {
        let packet = link.recv(rank - 1, TAG_REDUCE)?;
        for (a, v) in acc.iter_mut().zip(packet.values.iter()) {
            *a = a.max(v.re);
        }
    }
    if rank + 1 < nranks {
        link.send(
            rank + 1,
            TAG_REDUCE,
            Packet::new(acc.iter().map(|&v| Complex64::new(v, 0.0)).collect()),
        )?;
        let packet = link.recv(rank + 1, TAG_REDUCE)?;
        for (a, v) in acc.iter_mut().zip(packet.values.iter()) {
            *a = v.re;
        }
    }
    if rank > 0 {
        link.send(
            rank - 1,
            TAG_REDUCE,
            Packet::new(acc.iter().map(|&v| Complex64::new(v, 0.0)).collect()),
        )?;
    }
    Ok(acc)
}

/// Chain all-reduce of an elementwise logical AND, encoded as 0/1.
pub fn chain_reduce_and(link: &dyn RankLink, local: &[bool]) -> LaplaceResult<Vec<bool>> {
    let encoded: Vec<f64> = local.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect();
    // AND of {0,1} flags is their minimum; reuse the max reduction on
    // negated values.
    let negated: Vec<f64> = encoded.iter().map(|v| 1.0 - v).collect();
    let reduced = chain_reduce_max(link, &negated)?;
    Ok(reduced.iter().map(|&v| v < 0.5).collect())
}
