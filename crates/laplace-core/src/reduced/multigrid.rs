// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Interface Multigrid
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Multilevel coarsening of the interface system across ranks.
//!
//! Level l keeps every 2^l-th rank active. Building level l+1 pairs each
//! surviving rank with its upper neighbour and eliminates the two
//! interior pair unknowns algebraically; the reduced system is linear, so
//! the coarse 2x2 relation is exact, not a discretization. The coarse
//! operator coefficients depend only on the fine operator and are cached
//! in a [`LevelArena`] indexed by level number until the operator
//! changes. An odd rank at any level carries its relation up unpaired.
//!
//! A V-cycle relaxes at the finest level, restricts the interface
//! residual through the same pair elimination, recurses, solves the fully
//! reduced system directly at the coarsest level, prolongs the exact pair
//! corrections back, and relaxes again. Per-cycle convergence checks are
//! collective and therefore gated by the convergence predictor.

use num_complex::Complex64;

use laplace_math::linalg::DET_FLOOR;
use laplace_types::error::{LaplaceError, LaplaceResult};

use crate::comm::{chain_reduce_and, chain_reduce_max, Packet, RankLink, TAG_ITER, TAG_SETUP};
use crate::interface::InterfaceCoeffs;
use crate::monitor::ConvergenceMonitor;
use crate::partition::XSlice;
use crate::reduced::{
    synchronize_halo, FinalizeReport, InterfaceState, ReducedSolver, XE, XLOW, XS, XUP,
};

/// Sweep multiplier on a coarsest level that still holds several active
/// ranks (the level cap cut coarsening short).
const COARSE_SWEEP_FACTOR: usize = 10;

/// One level of the coarsening chain, as seen by one rank.
#[derive(Debug, Clone)]
pub struct Level {
    pub stride: usize,
    pub active: bool,
    /// Active neighbours at this level's stride.
    pub lower: Option<usize>,
    pub upper: Option<usize>,
    /// Rank whose relation this rank absorbs when building the next
    /// level (hosts only).
    pub partner: Option<usize>,
    /// Rank absorbing this rank's relation at the next level (ranks that
    /// drop out there).
    pub host: Option<usize>,
    pub al: Vec<Complex64>,
    pub bl: Vec<Complex64>,
    pub au: Vec<Complex64>,
    pub bu: Vec<Complex64>,
    /// Partner coefficients and the pair determinant, stored on hosts
    /// for residual restriction and correction prolongation.
    pub p_al: Vec<Complex64>,
    pub p_bl: Vec<Complex64>,
    pub p_au: Vec<Complex64>,
    pub p_bu: Vec<Complex64>,
    pub det: Vec<Complex64>,
}

/// The whole chain, finest (index 0) to coarsest, strictly increasing
/// strides, no back-references.
#[derive(Debug, Clone)]
pub struct LevelArena {
    pub levels: Vec<Level>,
    pub nmode: usize,
}

impl LevelArena {
    pub fn nlevels(&self) -> usize {
        self.levels.len()
    }

    pub fn coarsest(&self) -> &Level {
        &self.levels[self.levels.len() - 1]
    }

    /// Diagonal dominance of the coarsest level this rank participates
    /// in, for failure classification. Ranks inactive at the coarsest
    /// level report true and the chain reduction combines the rest.
    pub fn coarsest_diagonally_dominant(&self) -> bool {
        let coarsest = self.coarsest();
        if !coarsest.active {
            return true;
        }
        InterfaceCoeffs {
            al: coarsest.al.clone(),
            bl: coarsest.bl.clone(),
            au: coarsest.au.clone(),
            bu: coarsest.bu.clone(),
        }
        .diagonally_dominant()
    }
}

fn active_neighbours(rank: usize, nranks: usize, stride: usize) -> (Option<usize>, Option<usize>) {
    let lower = if rank >= stride { Some(rank - stride) } else { None };
    let upper = if rank + stride < nranks {
        Some(rank + stride)
    } else {
        None
    };
    (lower, upper)
}

/// Build the level chain. Collective: every rank must call this with the
/// same operator generation.
pub fn build_levels(
    coeffs: &InterfaceCoeffs,
    slice: &XSlice,
    link: &dyn RankLink,
    max_levels: usize,
) -> LaplaceResult<LevelArena> {
    let nmode = coeffs.nmode();
    let nranks = slice.nranks;
    let rank = slice.rank;

    let (lower0, upper0) = active_neighbours(rank, nranks, 1);
    let mut levels = vec![Level {
        stride: 1,
        active: true,
        lower: lower0,
        upper: upper0,
        partner: None,
        host: None,
        al: coeffs.al.clone(),
        bl: coeffs.bl.clone(),
        au: coeffs.au.clone(),
        bu: coeffs.bu.clone(),
        p_al: Vec::new(),
        p_bl: Vec::new(),
        p_au: Vec::new(),
        p_bu: Vec::new(),
        det: Vec::new(),
    }];

    while levels[levels.len() - 1].stride < nranks && levels.len() <= max_levels {
        let fine_idx = levels.len() - 1;
        let stride = levels[fine_idx].stride;
        let stride2 = stride * 2;
        let fine_active = levels[fine_idx].active;

        // Transition roles at the fine level.
        let hosting = fine_active && rank % stride2 == 0;
        let partner = if hosting && rank + stride < nranks {
            Some(rank + stride)
        } else {
            None
        };
        let host = if fine_active && !hosting {
            Some(rank - stride)
        } else {
            None
        };
        levels[fine_idx].partner = partner;
        levels[fine_idx].host = host;

        // Ranks dropping out ship their relation to the host.
        if let Some(host_rank) = host {
            let fine = &levels[fine_idx];
            let mut values = Vec::with_capacity(4 * nmode);
            values.extend_from_slice(&fine.al);
            values.extend_from_slice(&fine.bl);
            values.extend_from_slice(&fine.au);
            values.extend_from_slice(&fine.bu);
            link.send(host_rank, TAG_SETUP, Packet::new(values))?;
        }

        let coarse_active = hosting;
        let (lower, upper) = active_neighbours(rank, nranks, stride2);
        let zeros = vec![Complex64::new(0.0, 0.0); if coarse_active { nmode } else { 0 }];
        let mut coarse = Level {
            stride: stride2,
            active: coarse_active,
            lower: if coarse_active { lower } else { None },
            upper: if coarse_active { upper } else { None },
            partner: None,
            host: None,
            al: zeros.clone(),
            bl: zeros.clone(),
            au: zeros.clone(),
            bu: zeros,
            p_al: Vec::new(),
            p_bl: Vec::new(),
            p_au: Vec::new(),
            p_bu: Vec::new(),
            det: Vec::new(),
        };

        if hosting {
            if let Some(partner_rank) = partner {
                let packet = link.recv(partner_rank, TAG_SETUP)?;
                let fine = &mut levels[fine_idx];
                fine.p_al = packet.values[..nmode].to_vec();
                fine.p_bl = packet.values[nmode..2 * nmode].to_vec();
                fine.p_au = packet.values[2 * nmode..3 * nmode].to_vec();
                fine.p_bu = packet.values[3 * nmode..4 * nmode].to_vec();
                fine.det = Vec::with_capacity(nmode);
                for kz in 0..nmode {
                    let det = Complex64::new(1.0, 0.0) - fine.p_al[kz] * fine.bu[kz];
                    if det.norm() < DET_FLOOR {
                        return Err(LaplaceError::ReducedBreakdown { rank, mode: kz });
                    }
                    fine.det.push(det);
                    // Exact elimination of the pair unknowns (own upper
                    // edge, partner lower edge).
                    coarse.al[kz] =
                        fine.al[kz] + fine.bl[kz] * fine.p_al[kz] * fine.au[kz] / det;
                    coarse.bl[kz] = fine.bl[kz] * fine.p_bl[kz] / det;
                    coarse.au[kz] = fine.p_au[kz] * fine.au[kz] / det;
                    coarse.bu[kz] =
                        fine.p_bu[kz] + fine.p_au[kz] * fine.bu[kz] * fine.p_bl[kz] / det;
                }
            } else {
                // Odd rank count at this level: carry the relation up
                // unchanged.
                coarse.al = levels[fine_idx].al.clone();
                coarse.bl = levels[fine_idx].bl.clone();
                coarse.au = levels[fine_idx].au.clone();
                coarse.bu = levels[fine_idx].bu.clone();
            }
        }

        levels.push(coarse);
    }

    Ok(LevelArena { levels, nmode })
}

/// Per-solve state on one level.
#[derive(Debug, Clone)]
struct LevelState {
    x_l: Vec<Complex64>,
    x_u: Vec<Complex64>,
    r_l: Vec<Complex64>,
    r_u: Vec<Complex64>,
    /// Lower active neighbour's x_u and upper active neighbour's x_l.
    h_low: Vec<Complex64>,
    h_up: Vec<Complex64>,
    res_l: Vec<Complex64>,
    res_u: Vec<Complex64>,
    /// Partner residuals received during restriction (hosts only),
    /// reused by the prolongation of the same cycle.
    p_res_l: Vec<Complex64>,
    p_res_u: Vec<Complex64>,
}

impl LevelState {
    fn zeros(nmode: usize) -> Self {
        let z = vec![Complex64::new(0.0, 0.0); nmode];
        LevelState {
            x_l: z.clone(),
            x_u: z.clone(),
            r_l: z.clone(),
            r_u: z.clone(),
            h_low: z.clone(),
            h_up: z.clone(),
            res_l: z.clone(),
            res_u: z.clone(),
            p_res_l: z.clone(),
            p_res_u: z,
        }
    }
}

pub struct MultigridSolver {
    slice: XSlice,
    arena: LevelArena,
    states: Vec<LevelState>,
    monitor: ConvergenceMonitor,
    sweeps: usize,
    cycle: usize,
    rtol: f64,
    atol: f64,
}

impl MultigridSolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        slice: &XSlice,
        arena: LevelArena,
        rl: Vec<Complex64>,
        ru: Vec<Complex64>,
        rtol: f64,
        atol: f64,
        sweeps: usize,
        predict: bool,
    ) -> Self {
        let nmode = arena.nmode;
        let mut states: Vec<LevelState> =
            (0..arena.nlevels()).map(|_| LevelState::zeros(nmode)).collect();
        states[0].r_l = rl;
        states[0].r_u = ru;
        MultigridSolver {
            slice: slice.clone(),
            arena,
            states,
            monitor: ConvergenceMonitor::new(nmode, rtol, atol, predict),
            sweeps,
            cycle: 0,
            rtol,
            atol,
        }
    }

    /// Exchange current unknowns with the active neighbours at level `l`.
    fn exchange(&mut self, l: usize, link: &dyn RankLink) -> LaplaceResult<()> {
        let level = &self.arena.levels[l];
        if !level.active {
            return Ok(());
        }
        let lower = level.lower;
        let upper = level.upper;
        if let Some(down) = lower {
            link.send(down, TAG_ITER, Packet::new(self.states[l].x_l.clone()))?;
        }
        if let Some(up) = upper {
            link.send(up, TAG_ITER, Packet::new(self.states[l].x_u.clone()))?;
        }
        if let Some(down) = lower {
            let packet = link.recv(down, TAG_ITER)?;
            self.states[l].h_low = packet.values;
        }
        if let Some(up) = upper {
            let packet = link.recv(up, TAG_ITER)?;
            self.states[l].h_up = packet.values;
        }
        Ok(())
    }

    /// One Jacobi sweep over the interface unknowns at level `l`,
    /// followed by a neighbour exchange so halos track the update.
    fn sweep(&mut self, l: usize, link: &dyn RankLink) -> LaplaceResult<()> {
        let level = &self.arena.levels[l];
        if level.active {
            let nmode = self.arena.nmode;
            for kz in 0..nmode {
                if self.monitor.converged[kz] {
                    continue;
                }
                let state = &self.states[l];
                let new_l =
                    state.r_l[kz] + level.al[kz] * state.h_low[kz] + level.bl[kz] * state.h_up[kz];
                let new_u =
                    state.r_u[kz] + level.au[kz] * state.h_low[kz] + level.bu[kz] * state.h_up[kz];
                let state = &mut self.states[l];
                state.x_l[kz] = new_l;
                state.x_u[kz] = new_u;
            }
        }
        self.exchange(l, link)
    }

    /// Interface residual at level `l` against the current halos.
    fn compute_residual(&mut self, l: usize) {
        let level = &self.arena.levels[l];
        if !level.active {
            return;
        }
        let nmode = self.arena.nmode;
        for kz in 0..nmode {
            let state = &self.states[l];
            let (res_l, res_u) = if self.monitor.converged[kz] {
                (Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0))
            } else {
                (
                    state.r_l[kz] + level.al[kz] * state.h_low[kz] + level.bl[kz] * state.h_up[kz]
                        - state.x_l[kz],
                    state.r_u[kz] + level.au[kz] * state.h_low[kz] + level.bu[kz] * state.h_up[kz]
                        - state.x_u[kz],
                )
            };
            let state = &mut self.states[l];
            state.res_l[kz] = res_l;
            state.res_u[kz] = res_u;
        }
    }

    /// Move the fine residual into the coarse right-hand side through the
    /// cached pair elimination.
    fn restrict(&mut self, l: usize, link: &dyn RankLink) -> LaplaceResult<()> {
        let nmode = self.arena.nmode;
        let level = &self.arena.levels[l];
        if !level.active {
            return Ok(());
        }

        if let Some(host) = level.host {
            let mut values = Vec::with_capacity(2 * nmode);
            values.extend_from_slice(&self.states[l].res_l);
            values.extend_from_slice(&self.states[l].res_u);
            link.send(host, TAG_ITER, Packet::new(values))?;
            return Ok(());
        }

        let (coarse_rl, coarse_ru) = if let Some(partner) = level.partner {
            let packet = link.recv(partner, TAG_ITER)?;
            {
                let state = &mut self.states[l];
                state.p_res_l = packet.values[..nmode].to_vec();
                state.p_res_u = packet.values[nmode..2 * nmode].to_vec();
            }
            let level = &self.arena.levels[l];
            let state = &self.states[l];
            let mut rl = vec![Complex64::new(0.0, 0.0); nmode];
            let mut ru = vec![Complex64::new(0.0, 0.0); nmode];
            for kz in 0..nmode {
                if self.monitor.converged[kz] {
                    continue;
                }
                let det = level.det[kz];
                rl[kz] = state.res_l[kz]
                    + level.bl[kz] * (state.p_res_l[kz] + level.p_al[kz] * state.res_u[kz]) / det;
                ru[kz] = state.p_res_u[kz]
                    + level.p_au[kz] * (state.res_u[kz] + level.bu[kz] * state.p_res_l[kz]) / det;
            }
            (rl, ru)
        } else {
            (self.states[l].res_l.clone(), self.states[l].res_u.clone())
        };

        let nmode = self.arena.nmode;
        let coarse = &mut self.states[l + 1];
        coarse.r_l = coarse_rl;
        coarse.r_u = coarse_ru;
        let zero = vec![Complex64::new(0.0, 0.0); nmode];
        coarse.x_l = zero.clone();
        coarse.x_u = zero.clone();
        coarse.h_low = zero.clone();
        coarse.h_up = zero;
        Ok(())
    }

    /// Bring the coarse correction back down: recover the pair unknowns
    /// eliminated during coarsening, hand the partner its share, add, and
    /// refresh halos.
    fn prolong(&mut self, l: usize, link: &dyn RankLink) -> LaplaceResult<()> {
        let nmode = self.arena.nmode;
        let level = &self.arena.levels[l];
        if !level.active {
            return Ok(());
        }

        if let Some(host) = level.host {
            let packet = link.recv(host, TAG_ITER)?;
            let state = &mut self.states[l];
            for kz in 0..nmode {
                state.x_l[kz] += packet.values[kz];
                state.x_u[kz] += packet.values[nmode + kz];
            }
        } else if let Some(partner) = level.partner {
            // Coarse unknowns: Xl corrects own x_l, Xu corrects the
            // partner's x_u. The eliminated pair unknowns follow from the
            // cached elimination applied to this cycle's residuals and
            // the coarse neighbour corrections.
            let mut own_xu = vec![Complex64::new(0.0, 0.0); nmode];
            let mut partner_xl = vec![Complex64::new(0.0, 0.0); nmode];
            {
                let coarse = &self.states[l + 1];
                let state = &self.states[l];
                for kz in 0..nmode {
                    if self.monitor.converged[kz] {
                        continue;
                    }
                    let det = level.det[kz];
                    let u = coarse.h_low[kz];
                    let v = coarse.h_up[kz];
                    own_xu[kz] = (state.res_u[kz]
                        + level.bu[kz] * state.p_res_l[kz]
                        + level.au[kz] * u
                        + level.bu[kz] * level.p_bl[kz] * v)
                        / det;
                    partner_xl[kz] = (state.p_res_l[kz]
                        + level.p_al[kz] * state.res_u[kz]
                        + level.p_al[kz] * level.au[kz] * u
                        + level.p_bl[kz] * v)
                        / det;
                }
            }
            let mut values = Vec::with_capacity(2 * nmode);
            values.extend_from_slice(&partner_xl);
            values.extend_from_slice(&self.states[l + 1].x_u);
            link.send(partner, TAG_ITER, Packet::new(values))?;

            let coarse_xl = self.states[l + 1].x_l.clone();
            let state = &mut self.states[l];
            for kz in 0..nmode {
                state.x_l[kz] += coarse_xl[kz];
                state.x_u[kz] += own_xu[kz];
            }
        } else {
            let coarse_xl = self.states[l + 1].x_l.clone();
            let coarse_xu = self.states[l + 1].x_u.clone();
            let state = &mut self.states[l];
            for kz in 0..nmode {
                state.x_l[kz] += coarse_xl[kz];
                state.x_u[kz] += coarse_xu[kz];
            }
        }

        // Refresh halos so post-smoothing sees the corrected neighbours.
        self.exchange(l, link)
    }

    fn vcycle(&mut self, l: usize, link: &dyn RankLink) -> LaplaceResult<()> {
        let last = self.arena.nlevels() - 1;

        if l == last {
            let (active, fully_reduced) = {
                let level = &self.arena.levels[l];
                (
                    level.active,
                    level.lower.is_none() && level.upper.is_none(),
                )
            };
            if active {
                if fully_reduced {
                    // The relation no longer couples to anything, so the
                    // right-hand side is the answer.
                    let nmode = self.arena.nmode;
                    let state = &mut self.states[l];
                    for kz in 0..nmode {
                        if self.monitor.converged[kz] {
                            continue;
                        }
                        state.x_l[kz] = state.r_l[kz];
                        state.x_u[kz] = state.r_u[kz];
                    }
                } else {
                    // Level cap stopped coarsening early: iterate harder
                    // on the capped chain instead.
                    for _ in 0..self.sweeps * COARSE_SWEEP_FACTOR {
                        self.sweep(l, link)?;
                    }
                }
            }
            return Ok(());
        }

        for _ in 0..self.sweeps {
            self.sweep(l, link)?;
        }
        self.compute_residual(l);
        self.restrict(l, link)?;
        self.vcycle(l + 1, link)?;
        self.prolong(l, link)?;
        for _ in 0..self.sweeps {
            self.sweep(l, link)?;
        }
        Ok(())
    }
}

impl ReducedSolver for MultigridSolver {
    fn iterate(&mut self, state: &mut InterfaceState, link: &dyn RankLink) -> LaplaceResult<()> {
        let nmode = self.arena.nmode;

        // Adopt the engine's current interface estimate on the first
        // cycle (warm start or preconditioned guess).
        if self.cycle == 0 {
            let fine = &mut self.states[0];
            for kz in 0..nmode {
                fine.x_l[kz] = state.xloc[[XS, kz]];
                fine.x_u[kz] = state.xloc[[XE, kz]];
                fine.h_low[kz] = state.xloc[[XLOW, kz]];
                fine.h_up[kz] = state.xloc[[XUP, kz]];
            }
        }

        self.vcycle(0, link)?;
        self.cycle += 1;

        let fine = &self.states[0];
        for kz in 0..nmode {
            state.xloc[[XS, kz]] = fine.x_l[kz];
            state.xloc[[XE, kz]] = fine.x_u[kz];
            state.xloc[[XLOW, kz]] = fine.h_low[kz];
            state.xloc[[XUP, kz]] = fine.h_up[kz];
        }
        state.save_last();
        Ok(())
    }

    fn has_converged(
        &mut self,
        _state: &mut InterfaceState,
        link: &dyn RankLink,
    ) -> LaplaceResult<bool> {
        if !self.monitor.should_check(self.cycle) {
            return Ok(false);
        }

        self.compute_residual(0);
        let nmode = self.arena.nmode;
        let fine = &self.states[0];
        let mut local_abs = vec![0.0; nmode];
        let mut local_sol = vec![0.0; nmode];
        for kz in 0..nmode {
            if self.monitor.converged[kz] {
                continue;
            }
            local_abs[kz] = fine.res_l[kz].norm() + fine.res_u[kz].norm();
            local_sol[kz] = fine.x_l[kz].norm().max(fine.x_u[kz].norm());
        }

        let global_abs = chain_reduce_max(link, &local_abs)?;
        let global_sol = chain_reduce_max(link, &local_sol)?;
        let residual = global_abs.iter().fold(0.0_f64, |a, &b| a.max(b));
        let max_sol = global_sol.iter().fold(0.0_f64, |a, &b| a.max(b));
        let target = self.atol.max(self.rtol * max_sol);

        self.monitor.mark_from_global(&global_abs, &global_sol);
        self.monitor.record_checked_cycle(self.cycle, residual, target);
        Ok(self.monitor.all_converged())
    }

    fn finalize(
        &mut self,
        state: &mut InterfaceState,
        link: &dyn RankLink,
    ) -> LaplaceResult<FinalizeReport> {
        synchronize_halo(state, &self.slice, link)?;
        let flags = chain_reduce_and(
            link,
            &[
                self.monitor.all_converged(),
                self.arena.coarsest_diagonally_dominant(),
            ],
        )?;
        let counts = chain_reduce_max(link, &[self.cycle as f64])?;
        Ok(FinalizeReport {
            globally_converged: flags[0],
            diagonally_dominant: flags[1],
            max_iterations: counts[0] as usize,
        })
    }

    fn residual_history(&self) -> Vec<f64> {
        self.monitor.history()
    }
}
