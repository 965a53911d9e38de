// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Reduced Solver Strategies
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Interchangeable solvers for the reduced interface system.
//!
//! All three strategies consume the same per-rank affine interface
//! relation and produce the same converged (or round-bounded) edge-value
//! pair per rank and mode; they differ only in communication pattern and
//! convergence behaviour. The engine drives them through [`ReducedSolver`]
//! and never needs to know which one is running.

pub mod multigrid;
pub mod pcr;
pub mod relax;

use ndarray::Array2;
use num_complex::Complex64;

use laplace_types::error::LaplaceResult;

use crate::comm::{Packet, RankLink, TAG_SETUP};
use crate::partition::XSlice;

/// Row indices into [`InterfaceState::xloc`].
pub const XLOW: usize = 0; // x[xs-1]: lower neighbour's upper edge
pub const XS: usize = 1; // x[xs]: own lower interface unknown
pub const XE: usize = 2; // x[xe]: own upper interface unknown
pub const XUP: usize = 3; // x[xe+1]: upper neighbour's lower edge

/// The rank's current estimate of the solution at its interfaces, plus
/// the neighbour images of the adjacent edges, mutated every iteration.
#[derive(Debug, Clone)]
pub struct InterfaceState {
    /// `(4, nmode)`: rows ordered `[x(xs-1), x(xs), x(xe), x(xe+1)]`.
    pub xloc: Array2<Complex64>,
    pub xloclast: Array2<Complex64>,
}

impl InterfaceState {
    pub fn new(nmode: usize) -> Self {
        InterfaceState {
            xloc: Array2::zeros((4, nmode)),
            xloclast: Array2::zeros((4, nmode)),
        }
    }

    pub fn nmode(&self) -> usize {
        self.xloc.ncols()
    }

    pub fn save_last(&mut self) {
        self.xloclast.assign(&self.xloc);
    }
}

/// Outcome of the post-iteration collective pass.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeReport {
    /// Every rank and mode met tolerance (always true for PCR).
    pub globally_converged: bool,
    /// Reduced system diagonally dominant on every participating rank;
    /// drives the §7 failure classification.
    pub diagonally_dominant: bool,
    /// Maximum iteration count over all ranks.
    pub max_iterations: usize,
}

/// One reduced-system solver strategy.
pub trait ReducedSolver {
    /// One iteration (relaxation sweep, V-cycle, or the complete set of
    /// PCR rounds): update edge estimates and exchange with neighbours.
    fn iterate(&mut self, state: &mut InterfaceState, link: &dyn RankLink)
        -> LaplaceResult<()>;

    /// Whether iteration may stop. Collective checks inside are
    /// amortized by the convergence predictor.
    fn has_converged(
        &mut self,
        state: &mut InterfaceState,
        link: &dyn RankLink,
    ) -> LaplaceResult<bool>;

    /// Synchronize final halo values and verify global state. Called
    /// exactly once per solve, on every rank, after iteration stops for
    /// any reason.
    fn finalize(
        &mut self,
        state: &mut InterfaceState,
        link: &dyn RankLink,
    ) -> LaplaceResult<FinalizeReport>;

    /// Globally-checked residual per checked cycle, for diagnostics.
    fn residual_history(&self) -> Vec<f64>;
}

/// Final halo synchronization: every rank sends its converged edge values
/// and reads the neighbours' edges into the halo rows. Runs on the setup
/// stream so stale iteration messages can never be consumed here.
pub fn synchronize_halo(
    state: &mut InterfaceState,
    slice: &XSlice,
    link: &dyn RankLink,
) -> LaplaceResult<()> {
    let nmode = state.nmode();
    if let Some(down) = slice.proc_in() {
        let values: Vec<Complex64> = (0..nmode).map(|kz| state.xloc[[XS, kz]]).collect();
        link.send(down, TAG_SETUP, Packet::new(values))?;
    }
    if let Some(up) = slice.proc_out() {
        let values: Vec<Complex64> = (0..nmode).map(|kz| state.xloc[[XE, kz]]).collect();
        link.send(up, TAG_SETUP, Packet::new(values))?;
    }
    if let Some(down) = slice.proc_in() {
        let packet = link.recv(down, TAG_SETUP)?;
        for kz in 0..nmode {
            state.xloc[[XLOW, kz]] = packet.values[kz];
        }
    }
    if let Some(up) = slice.proc_out() {
        let packet = link.recv(up, TAG_SETUP)?;
        for kz in 0..nmode {
            state.xloc[[XUP, kz]] = packet.values[kz];
        }
    }
    Ok(())
}
