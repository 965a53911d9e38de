// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Interface Relaxation
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Jacobi relaxation on the reduced interface system.
//!
//! Each iteration recomputes the two edge unknowns from the current
//! neighbour images and exchanges the new values with both neighbours in
//! one batched message per direction. Convergence bookkeeping follows the
//! four-flag protocol:
//!
//! - a mode freezes once its own tolerance is met, but its frozen value
//!   keeps being relayed so neighbours always see a consistent image;
//! - a direction closes when the neighbour announces that all of its
//!   modes are done; after that neither side sends or receives on it;
//! - a rank leaves the iteration only after its own modes are done and
//!   it has announced that in every direction still open.
//!
//! Both neighbours of a closed direction stop at the same message count,
//! so sends and receives always pair up.

use num_complex::Complex64;

use laplace_math::linalg::DET_FLOOR;
use laplace_types::error::LaplaceResult;

use crate::comm::{chain_reduce_and, chain_reduce_max, Packet, RankLink, TAG_ITER};
use crate::interface::InterfaceCoeffs;
use crate::local::GuardVectors;
use crate::monitor::ConvergenceMonitor;
use crate::partition::XSlice;
use crate::reduced::{
    synchronize_halo, FinalizeReport, InterfaceState, ReducedSolver, XE, XLOW, XS, XUP,
};

pub struct RelaxationSolver {
    slice: XSlice,
    al: Vec<Complex64>,
    bl: Vec<Complex64>,
    au: Vec<Complex64>,
    bu: Vec<Complex64>,
    rl: Vec<Complex64>,
    ru: Vec<Complex64>,
    // Boundary-row update terms: the particular solution and guard
    // vectors evaluated at the halo rows xs-1 and xe+1.
    minvb_low: Vec<Complex64>,
    lg_low: Vec<Complex64>,
    ug_low: Vec<Complex64>,
    minvb_up: Vec<Complex64>,
    lg_up: Vec<Complex64>,
    ug_up: Vec<Complex64>,
    monitor: ConvergenceMonitor,
    lower_open: bool,
    upper_open: bool,
    announced_down: bool,
    announced_up: bool,
    count: usize,
    history: Vec<f64>,
}

impl RelaxationSolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        slice: &XSlice,
        coeffs: &InterfaceCoeffs,
        rl: Vec<Complex64>,
        ru: Vec<Complex64>,
        minvb: &ndarray::Array2<Complex64>,
        guards: &GuardVectors,
        rtol: f64,
        atol: f64,
    ) -> Self {
        let nmode = coeffs.nmode();
        let low = slice.xs - 1;
        let up = slice.xe + 1;
        RelaxationSolver {
            slice: slice.clone(),
            al: coeffs.al.clone(),
            bl: coeffs.bl.clone(),
            au: coeffs.au.clone(),
            bu: coeffs.bu.clone(),
            rl,
            ru,
            minvb_low: (0..nmode).map(|kz| minvb[[kz, low]]).collect(),
            lg_low: (0..nmode).map(|kz| guards.lower[[kz, low]]).collect(),
            ug_low: (0..nmode).map(|kz| guards.upper[[kz, low]]).collect(),
            minvb_up: (0..nmode).map(|kz| minvb[[kz, up]]).collect(),
            lg_up: (0..nmode).map(|kz| guards.lower[[kz, up]]).collect(),
            ug_up: (0..nmode).map(|kz| guards.upper[[kz, up]]).collect(),
            // Relaxation converges per mode from local errors; the
            // predictor only gates collective checks, which this
            // strategy performs once, in finalize.
            monitor: ConvergenceMonitor::new(nmode, rtol, atol, false),
            lower_open: !slice.first_x(),
            upper_open: !slice.last_x(),
            announced_down: false,
            announced_up: false,
            count: 0,
            history: Vec::new(),
        }
    }

    fn update_modes(&mut self, state: &mut InterfaceState) {
        let nmode = state.nmode();
        for kz in 0..nmode {
            if self.monitor.converged[kz] {
                continue;
            }
            let xlow_last = state.xloclast[[XLOW, kz]];
            let xup_last = state.xloclast[[XUP, kz]];

            if self.slice.first_x() {
                // The physical boundary rows were part of the local
                // elimination, so the halo row solves to a fixed point of
                // its own reconstruction relation.
                let den = Complex64::new(1.0, 0.0) - self.lg_low[kz];
                if den.norm() > DET_FLOOR {
                    state.xloc[[XLOW, kz]] =
                        (self.minvb_low[kz] + self.ug_low[kz] * xup_last) / den;
                }
            }
            state.xloc[[XS, kz]] =
                self.rl[kz] + self.al[kz] * xlow_last + self.bl[kz] * xup_last;
            state.xloc[[XE, kz]] =
                self.ru[kz] + self.au[kz] * xlow_last + self.bu[kz] * xup_last;
            if self.slice.last_x() {
                let den = Complex64::new(1.0, 0.0) - self.ug_up[kz];
                if den.norm() > DET_FLOOR {
                    state.xloc[[XUP, kz]] =
                        (self.minvb_up[kz] + self.lg_up[kz] * xlow_last) / den;
                }
            }

            self.monitor.update_mode(
                kz,
                state.xloc[[XS, kz]],
                state.xloc[[XE, kz]],
                state.xloclast[[XS, kz]],
                state.xloclast[[XE, kz]],
            );
        }
    }
}

impl ReducedSolver for RelaxationSolver {
    fn iterate(&mut self, state: &mut InterfaceState, link: &dyn RankLink) -> LaplaceResult<()> {
        self.update_modes(state);
        self.count += 1;
        self.history.push(self.monitor.max_error_abs());
        let self_done = self.monitor.all_converged();
        let nmode = state.nmode();

        // Send both directions as soon as the values are ready, then
        // receive; the fixed ordering keeps every receive paired with a
        // prior matching send.
        if self.lower_open {
            if let Some(down) = self.slice.proc_in() {
                let values: Vec<Complex64> =
                    (0..nmode).map(|kz| state.xloc[[XS, kz]]).collect();
                link.send(down, TAG_ITER, Packet::with_done(values, self_done))?;
                if self_done {
                    self.announced_down = true;
                }
            }
        }
        if self.upper_open {
            if let Some(up) = self.slice.proc_out() {
                let values: Vec<Complex64> =
                    (0..nmode).map(|kz| state.xloc[[XE, kz]]).collect();
                link.send(up, TAG_ITER, Packet::with_done(values, self_done))?;
                if self_done {
                    self.announced_up = true;
                }
            }
        }
        if self.lower_open {
            if let Some(down) = self.slice.proc_in() {
                let packet = link.recv(down, TAG_ITER)?;
                for kz in 0..nmode {
                    state.xloc[[XLOW, kz]] = packet.values[kz];
                }
                if packet.done {
                    self.lower_open = false;
                }
            }
        }
        if self.upper_open {
            if let Some(up) = self.slice.proc_out() {
                let packet = link.recv(up, TAG_ITER)?;
                for kz in 0..nmode {
                    state.xloc[[XUP, kz]] = packet.values[kz];
                }
                if packet.done {
                    self.upper_open = false;
                }
            }
        }

        state.save_last();
        Ok(())
    }

    fn has_converged(
        &mut self,
        _state: &mut InterfaceState,
        _link: &dyn RankLink,
    ) -> LaplaceResult<bool> {
        let settled_down =
            self.slice.first_x() || !self.lower_open || self.announced_down;
        let settled_up = self.slice.last_x() || !self.upper_open || self.announced_up;
        Ok(self.monitor.all_converged() && settled_down && settled_up)
    }

    fn finalize(
        &mut self,
        state: &mut InterfaceState,
        link: &dyn RankLink,
    ) -> LaplaceResult<FinalizeReport> {
        synchronize_halo(state, &self.slice, link)?;

        let local_dominant = InterfaceCoeffs {
            al: self.al.clone(),
            bl: self.bl.clone(),
            au: self.au.clone(),
            bu: self.bu.clone(),
        }
        .diagonally_dominant();
        let flags = chain_reduce_and(
            link,
            &[self.monitor.all_converged(), local_dominant],
        )?;
        let counts = chain_reduce_max(link, &[self.count as f64])?;

        Ok(FinalizeReport {
            globally_converged: flags[0],
            diagonally_dominant: flags[1],
            max_iterations: counts[0] as usize,
        })
    }

    fn residual_history(&self) -> Vec<f64> {
        self.history.clone()
    }
}
