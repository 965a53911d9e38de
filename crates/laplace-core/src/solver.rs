// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Inversion Engine
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Rank-local front end of the distributed inversion.
//!
//! One engine instance runs on each rank. A call sequence is
//! `set_operator` (whenever the operator coefficients change), then
//! `solve` once per right-hand side. The engine factorizes the local
//! block, builds the reduced interface relation, drives the configured
//! reduced-system strategy against the peers, reconstructs the local
//! solution, and keeps the operator-derived state cached between calls.
//!
//! All `solve`/`set_operator` calls are collective: every rank of the
//! communicator must make the same sequence of calls with the same
//! configuration, or neighbours end up waiting on messages that never
//! come.

use ndarray::Array2;
use num_complex::Complex64;

use laplace_math::linalg::DET_FLOOR;
use laplace_types::config::{PostprocessFlags, SolverConfig, Strategy};
use laplace_types::error::{BudgetFailure, LaplaceError, LaplaceResult};

use crate::cache::SolverCache;
use crate::comm::{Packet, RankLink, TAG_SETUP};
use crate::interface::{build_coeffs, edge_rhs, InterfaceCoeffs};
use crate::local::{
    guard_vectors, particular_solution, patch_guard_rhs, patch_guard_rows, GuardVectors,
    Operator,
};
use crate::partition::XSlice;
use crate::reconstruct::{apply_postprocess, reconstruct_full};
use crate::reduced::multigrid::{build_levels, MultigridSolver};
use crate::reduced::pcr::CyclicReductionSolver;
use crate::reduced::relax::RelaxationSolver;
use crate::reduced::{InterfaceState, ReducedSolver, XE, XLOW, XS, XUP};

/// Monitorable per-engine counters and last-solve data.
#[derive(Debug, Clone, Default)]
pub struct SolveDiagnostics {
    pub ncalls: usize,
    /// Running mean of the iteration count across calls.
    pub mean_iterations: f64,
    pub last_iterations: usize,
    /// Globally-checked residual per checked cycle of the last solve.
    pub residual_history: Vec<f64>,
    /// Diagonal dominance of the reduced system, from the last solve.
    pub diagonally_dominant: Option<bool>,
}

pub struct ParallelLaplace {
    config: SolverConfig,
    flags: PostprocessFlags,
    slice: XSlice,
    link: Box<dyn RankLink>,
    op: Option<Operator>,
    cache: SolverCache,
    diag: SolveDiagnostics,
}

impl ParallelLaplace {
    /// Construction validates configuration against the partition;
    /// inconsistent setups are rejected here, never at solve time.
    pub fn new(
        config: SolverConfig,
        flags: PostprocessFlags,
        slice: XSlice,
        link: Box<dyn RankLink>,
    ) -> LaplaceResult<Self> {
        config.validate()?;
        if slice.rank != link.rank() || slice.nranks != link.nranks() {
            return Err(LaplaceError::ConfigError(format!(
                "partition rank {}/{} does not match link rank {}/{}",
                slice.rank,
                slice.nranks,
                link.rank(),
                link.nranks()
            )));
        }
        if config.strategy == Strategy::CyclicReduction && !slice.nranks.is_power_of_two() {
            return Err(LaplaceError::ConfigError(format!(
                "cyclic reduction requires a power-of-two rank count, got {}",
                slice.nranks
            )));
        }
        Ok(ParallelLaplace {
            config,
            flags,
            slice,
            link,
            op: None,
            cache: SolverCache::new(),
            diag: SolveDiagnostics::default(),
        })
    }

    /// Install new operator coefficients (mode-major `(nmode, ncx)`).
    /// Invalidates every cached operator-derived quantity.
    pub fn set_operator(
        &mut self,
        avec: Array2<Complex64>,
        bvec: Array2<Complex64>,
        cvec: Array2<Complex64>,
    ) -> LaplaceResult<()> {
        if avec.dim() != bvec.dim() || bvec.dim() != cvec.dim() {
            return Err(LaplaceError::ShapeMismatch(format!(
                "operator diagonals disagree: {:?} / {:?} / {:?}",
                avec.dim(),
                bvec.dim(),
                cvec.dim()
            )));
        }
        if avec.ncols() != self.slice.ncx {
            return Err(LaplaceError::ShapeMismatch(format!(
                "operator has {} rows per mode, partition expects {}",
                avec.ncols(),
                self.slice.ncx
            )));
        }
        let mut op = Operator { avec, bvec, cvec };
        patch_guard_rows(&mut op, &self.slice);
        self.op = Some(op);
        self.cache.invalidate();
        Ok(())
    }

    /// Invalidate cached guard vectors, the level arena and warm-start
    /// state. Call whenever the underlying operator changed in a way not
    /// captured by `set_operator`.
    pub fn reset(&mut self) {
        self.cache.invalidate();
    }

    pub fn mean_iterations(&self) -> f64 {
        self.diag.mean_iterations
    }

    pub fn diagnostics(&self) -> SolveDiagnostics {
        self.diag.clone()
    }

    fn ensure_cache(&mut self) -> LaplaceResult<()> {
        let op = self
            .op
            .as_ref()
            .ok_or_else(|| LaplaceError::ConfigError("solve before set_operator".to_string()))?;
        if self.cache.guards.is_none() {
            let guards = guard_vectors(op, &self.slice)?;
            self.cache.iface = Some(build_coeffs(&guards, &self.slice));
            self.cache.guards = Some(guards);
        }
        if self.config.strategy == Strategy::Multigrid
            && self.cache.arena.is_none()
            && self.slice.nranks > 1
        {
            let iface = self
                .cache
                .iface
                .as_ref()
                .ok_or_else(|| LaplaceError::ConfigError("interface cache missing".to_string()))?;
            let arena =
                build_levels(iface, &self.slice, self.link.as_ref(), self.config.max_levels)?;
            self.cache.arena = Some(arena);
        }
        Ok(())
    }

    /// Coupling-neglected preconditioned guess: each rank solves its
    /// local system ignoring the neighbours, then a single exchange fixes
    /// up the halo estimates. Exact for two ranks.
    fn preconditioned_guess(
        &self,
        minvb: &Array2<Complex64>,
        guards: &GuardVectors,
        iface: &InterfaceCoeffs,
    ) -> LaplaceResult<Array2<Complex64>> {
        let nmode = minvb.nrows();
        let zero = Complex64::new(0.0, 0.0);
        let one = Complex64::new(1.0, 0.0);
        let xs = self.slice.xs;
        let xe = self.slice.xe;

        if let Some(down) = self.slice.proc_in() {
            let mut values = Vec::with_capacity(2 * nmode);
            values.extend((0..nmode).map(|kz| iface.al[kz]));
            values.extend((0..nmode).map(|kz| minvb[[kz, xs]]));
            self.link.send(down, TAG_SETUP, Packet::new(values))?;
        }
        if let Some(up) = self.slice.proc_out() {
            let mut values = Vec::with_capacity(2 * nmode);
            values.extend((0..nmode).map(|kz| iface.bu[kz]));
            values.extend((0..nmode).map(|kz| minvb[[kz, xe]]));
            self.link.send(up, TAG_SETUP, Packet::new(values))?;
        }

        let mut xlow = vec![zero; nmode];
        let mut xup = vec![zero; nmode];
        if let Some(down) = self.slice.proc_in() {
            let packet = self.link.recv(down, TAG_SETUP)?;
            for kz in 0..nmode {
                let bu_dn = packet.values[kz];
                let ru_dn = packet.values[nmode + kz];
                let den = one - iface.al[kz] * bu_dn;
                if den.norm() > DET_FLOOR {
                    xlow[kz] = (ru_dn + bu_dn * minvb[[kz, xs]]) / den;
                }
            }
        }
        if let Some(up) = self.slice.proc_out() {
            let packet = self.link.recv(up, TAG_SETUP)?;
            for kz in 0..nmode {
                let al_up = packet.values[kz];
                let rl_up = packet.values[nmode + kz];
                let den = one - iface.bu[kz] * al_up;
                if den.norm() > DET_FLOOR {
                    xup[kz] = (rl_up + al_up * minvb[[kz, xe]]) / den;
                }
            }
        }

        let mut xloc = Array2::zeros((4, nmode));
        for kz in 0..nmode {
            xloc[[XLOW, kz]] = minvb[[kz, xs - 1]]
                + guards.lower[[kz, xs - 1]] * xlow[kz]
                + guards.upper[[kz, xs - 1]] * xup[kz];
            xloc[[XS, kz]] =
                minvb[[kz, xs]] + iface.al[kz] * xlow[kz] + iface.bl[kz] * xup[kz];
            xloc[[XE, kz]] =
                minvb[[kz, xe]] + iface.au[kz] * xlow[kz] + iface.bu[kz] * xup[kz];
            xloc[[XUP, kz]] = minvb[[kz, xe + 1]]
                + guards.lower[[kz, xe + 1]] * xlow[kz]
                + guards.upper[[kz, xe + 1]] * xup[kz];
        }
        Ok(xloc)
    }

    fn extract_interface(&self, field: &Array2<Complex64>) -> Array2<Complex64> {
        let nmode = field.nrows();
        let mut xloc = Array2::zeros((4, nmode));
        for kz in 0..nmode {
            xloc[[XLOW, kz]] = field[[kz, self.slice.xs - 1]];
            xloc[[XS, kz]] = field[[kz, self.slice.xs]];
            xloc[[XE, kz]] = field[[kz, self.slice.xe]];
            xloc[[XUP, kz]] = field[[kz, self.slice.xe + 1]];
        }
        xloc
    }

    fn build_strategy(
        &self,
        minvb: &Array2<Complex64>,
        guards: &GuardVectors,
        iface: &InterfaceCoeffs,
        rl: Vec<Complex64>,
        ru: Vec<Complex64>,
    ) -> LaplaceResult<Box<dyn ReducedSolver>> {
        match self.config.strategy {
            Strategy::Relaxation => Ok(Box::new(RelaxationSolver::new(
                &self.slice,
                iface,
                rl,
                ru,
                minvb,
                guards,
                self.config.rtol,
                self.config.atol,
            ))),
            Strategy::Multigrid => {
                let arena = self.cache.arena.clone().ok_or_else(|| {
                    LaplaceError::ConfigError("multigrid level arena missing".to_string())
                })?;
                Ok(Box::new(MultigridSolver::new(
                    &self.slice,
                    arena,
                    rl,
                    ru,
                    self.config.rtol,
                    self.config.atol,
                    self.config.sweeps_per_level,
                    self.config.predict_convergence,
                )))
            }
            Strategy::CyclicReduction => Ok(Box::new(CyclicReductionSolver::new(
                &self.slice,
                iface,
                rl,
                ru,
            ))),
        }
    }

    fn record_call(&mut self, iterations: usize, history: Vec<f64>, dominant: Option<bool>) {
        self.diag.ncalls += 1;
        self.diag.mean_iterations = (self.diag.mean_iterations * (self.diag.ncalls - 1) as f64
            + iterations as f64)
            / self.diag.ncalls as f64;
        self.diag.last_iterations = iterations;
        self.diag.residual_history = history;
        self.diag.diagonally_dominant = dominant;
    }

    /// Invert the operator against `rvec` (mode-major `(nmode, ncx)`).
    /// `x0`, when given on every rank, seeds the interface estimates;
    /// with `reuse_solution` enabled the previous call's solution takes
    /// precedence. Returns the full local spectral solution.
    pub fn solve(
        &mut self,
        rvec: &Array2<Complex64>,
        x0: Option<&Array2<Complex64>>,
    ) -> LaplaceResult<Array2<Complex64>> {
        self.ensure_cache()?;
        let op = self
            .op
            .as_ref()
            .ok_or_else(|| LaplaceError::ConfigError("solve before set_operator".to_string()))?;
        if rvec.dim() != (op.nmode(), op.ncx()) {
            return Err(LaplaceError::ShapeMismatch(format!(
                "rhs shape {:?} does not match operator {:?}",
                rvec.dim(),
                (op.nmode(), op.ncx())
            )));
        }
        if let Some(guess) = x0 {
            if guess.dim() != rvec.dim() {
                return Err(LaplaceError::ShapeMismatch(format!(
                    "initial guess shape {:?} does not match rhs {:?}",
                    guess.dim(),
                    rvec.dim()
                )));
            }
        }
        let nmode = op.nmode();

        let mut rhs = rvec.clone();
        patch_guard_rhs(&mut rhs, &self.slice);
        let minvb = particular_solution(op, &rhs, &self.slice)?;

        // A single rank holds the whole system: the local elimination,
        // boundary rows included, already is the solution.
        if self.slice.nranks == 1 {
            let mut xk = minvb;
            apply_postprocess(&mut xk, &self.flags, &self.slice);
            self.cache.x0saved = Some(xk.clone());
            self.record_call(0, Vec::new(), None);
            return Ok(xk);
        }

        let guards = self
            .cache
            .guards
            .clone()
            .ok_or_else(|| LaplaceError::ConfigError("guard cache missing".to_string()))?;
        let iface = self
            .cache
            .iface
            .clone()
            .ok_or_else(|| LaplaceError::ConfigError("interface cache missing".to_string()))?;
        let (rl, ru) = edge_rhs(&minvb, &self.slice);

        let mut state = InterfaceState::new(nmode);
        let warm = if self.config.reuse_solution {
            self.cache.x0saved.as_ref()
        } else {
            None
        };
        state.xloc = if let Some(saved) = warm {
            self.extract_interface(saved)
        } else if let Some(guess) = x0 {
            self.extract_interface(guess)
        } else {
            self.preconditioned_guess(&minvb, &guards, &iface)?
        };
        state.save_last();

        let mut strategy = self.build_strategy(&minvb, &guards, &iface, rl, ru)?;
        let mut count = 0usize;
        loop {
            strategy.iterate(&mut state, self.link.as_ref())?;
            count += 1;
            if strategy.has_converged(&mut state, self.link.as_ref())? {
                break;
            }
            if count >= self.config.maxits {
                break;
            }
        }
        let report = strategy.finalize(&mut state, self.link.as_ref())?;
        self.record_call(
            report.max_iterations,
            strategy.residual_history(),
            Some(report.diagonally_dominant),
        );

        if !report.globally_converged {
            let classification = if report.diagonally_dominant {
                BudgetFailure::BudgetTooLow
            } else {
                BudgetFailure::NotGuaranteed
            };
            let message = match classification {
                BudgetFailure::BudgetTooLow => {
                    "reduced system is diagonally dominant, convergence was guaranteed; \
                     increase maxits"
                        .to_string()
                }
                BudgetFailure::NotGuaranteed => {
                    "reduced system is not diagonally dominant, convergence was never \
                     guaranteed; consider another strategy or more levels"
                        .to_string()
                }
            };
            return Err(LaplaceError::IterationBudgetExceeded {
                rank: self.slice.rank,
                maxits: self.config.maxits,
                classification,
                message,
            });
        }

        let xlow: Vec<Complex64> = (0..nmode).map(|kz| state.xloc[[XLOW, kz]]).collect();
        let xup: Vec<Complex64> = (0..nmode).map(|kz| state.xloc[[XUP, kz]]).collect();
        let mut xk = reconstruct_full(&minvb, &guards, &self.slice, &xlow, &xup);
        apply_postprocess(&mut xk, &self.flags, &self.slice);
        self.cache.x0saved = Some(xk.clone());
        Ok(xk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ThreadFabric;
    use crate::partition::decompose_x;

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    fn laplacian_rows(nmode: usize, ncx: usize) -> (Array2<Complex64>, Array2<Complex64>, Array2<Complex64>) {
        let mut avec = Array2::zeros((nmode, ncx));
        let mut bvec = Array2::zeros((nmode, ncx));
        let mut cvec = Array2::zeros((nmode, ncx));
        for kz in 0..nmode {
            for ix in 0..ncx {
                if ix == 0 || ix == ncx - 1 {
                    bvec[[kz, ix]] = c(1.0);
                } else {
                    avec[[kz, ix]] = c(1.0);
                    bvec[[kz, ix]] = c(-2.0 - kz as f64);
                    cvec[[kz, ix]] = c(1.0);
                }
            }
        }
        (avec, bvec, cvec)
    }

    fn single_rank_engine(strategy: Strategy) -> ParallelLaplace {
        let slices = decompose_x(4, 1, 1).expect("decompose");
        let mut links = ThreadFabric::connect(1);
        let link = links.pop().expect("link");
        ParallelLaplace::new(
            SolverConfig {
                strategy,
                ..SolverConfig::default()
            },
            PostprocessFlags::default(),
            slices[0].clone(),
            Box::new(link),
        )
        .expect("engine")
    }

    #[test]
    fn test_single_rank_zero_rhs_gives_zero_solution() {
        // P=1, n=4, a=[0,1,1,1], b=[1,-2,-2,-2], c=[0,1,1,0], r=0 with
        // Dirichlet 0 on both edges: the solution is identically zero.
        let mut engine = single_rank_engine(Strategy::Relaxation);
        let ncx = 6;
        let mut avec = Array2::zeros((1, ncx));
        let mut bvec = Array2::zeros((1, ncx));
        let mut cvec = Array2::zeros((1, ncx));
        for ix in 1..ncx - 1 {
            avec[[0, ix]] = c(1.0);
            bvec[[0, ix]] = c(-2.0);
            cvec[[0, ix]] = c(1.0);
        }
        bvec[[0, 0]] = c(1.0);
        bvec[[0, ncx - 1]] = c(1.0);
        engine.set_operator(avec, bvec, cvec).expect("operator");

        let rvec = Array2::zeros((1, ncx));
        let xk = engine.solve(&rvec, None).expect("solve");
        assert!(
            xk.iter().all(|v| v.norm() < 1e-14),
            "zero RHS with zero Dirichlet boundaries must give zero"
        );
        assert_eq!(engine.diagnostics().ncalls, 1);
        assert_eq!(engine.diagnostics().last_iterations, 0);
    }

    #[test]
    fn test_solve_requires_operator() {
        let mut engine = single_rank_engine(Strategy::Relaxation);
        let rvec = Array2::zeros((1, 6));
        assert!(matches!(
            engine.solve(&rvec, None),
            Err(LaplaceError::ConfigError(_))
        ));
    }

    #[test]
    fn test_pcr_rejects_non_power_of_two_ranks() {
        let slices = decompose_x(9, 3, 1).expect("decompose");
        let mut links = ThreadFabric::connect(3);
        let link = links.pop().expect("link");
        let result = ParallelLaplace::new(
            SolverConfig {
                strategy: Strategy::CyclicReduction,
                ..SolverConfig::default()
            },
            PostprocessFlags::default(),
            slices[2].clone(),
            Box::new(link),
        );
        assert!(matches!(result, Err(LaplaceError::ConfigError(_))));
    }

    #[test]
    fn test_operator_shape_validation() {
        let mut engine = single_rank_engine(Strategy::Relaxation);
        let bad = engine.set_operator(
            Array2::zeros((1, 5)),
            Array2::zeros((1, 6)),
            Array2::zeros((1, 6)),
        );
        assert!(matches!(bad, Err(LaplaceError::ShapeMismatch(_))));

        let wrong_ncx = engine.set_operator(
            Array2::zeros((1, 9)),
            Array2::zeros((1, 9)),
            Array2::zeros((1, 9)),
        );
        assert!(matches!(wrong_ncx, Err(LaplaceError::ShapeMismatch(_))));
    }

    #[test]
    fn test_mean_iterations_accumulates() {
        let mut engine = single_rank_engine(Strategy::Multigrid);
        let (avec, bvec, cvec) = laplacian_rows(2, 6);
        engine.set_operator(avec, bvec, cvec).expect("operator");
        let rvec = Array2::from_elem((2, 6), c(1.0));
        engine.solve(&rvec, None).expect("solve");
        engine.solve(&rvec, None).expect("solve");
        let diag = engine.diagnostics();
        assert_eq!(diag.ncalls, 2);
        assert!(diag.mean_iterations.abs() < 1e-12, "P=1 takes 0 iterations");
    }
}
