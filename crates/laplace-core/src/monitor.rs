// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Convergence Monitor
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Per-mode convergence tracking with exit-cycle prediction.
//!
//! A mode is converged once `error_abs < atol || error_rel < rtol` at
//! both edges. Full convergence checks at large rank counts involve a
//! chain reduction over all ranks, so the monitor extrapolates the
//! observed convergence ratio of the last two checked cycles to the
//! cycle at which the slowest mode will meet tolerance, and suppresses
//! collective checks until then. The first cycles are always checked to
//! calibrate, a check always runs at the cycle before the predicted one
//! and on every cycle after it, and prediction can be disabled entirely.

/// Cycles that are always checked before prediction kicks in.
const CALIBRATION_CYCLES: usize = 3;

/// Hard cap on how many cycles a prediction may skip.
const MAX_SKIP: usize = 16;

#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    rtol: f64,
    atol: f64,
    predict: bool,
    pub converged: Vec<bool>,
    error_abs: Vec<f64>,
    error_rel: Vec<f64>,
    /// Globally-reduced residual at each checked cycle.
    history: Vec<(usize, f64)>,
    next_check: usize,
}

impl ConvergenceMonitor {
    pub fn new(nmode: usize, rtol: f64, atol: f64, predict: bool) -> Self {
        ConvergenceMonitor {
            rtol,
            atol,
            predict,
            converged: vec![false; nmode],
            error_abs: vec![f64::MAX; nmode],
            error_rel: vec![f64::MAX; nmode],
            history: Vec::new(),
            next_check: 0,
        }
    }

    pub fn nmode(&self) -> usize {
        self.converged.len()
    }

    pub fn all_converged(&self) -> bool {
        self.converged.iter().all(|&c| c)
    }

    /// Record the edge errors of one mode from local edge values.
    /// `new_low/new_up` are the updated estimates, `old_*` the previous
    /// iterate. Marks the mode converged when tolerance is met.
    pub fn update_mode(
        &mut self,
        kz: usize,
        new_low: num_complex::Complex64,
        new_up: num_complex::Complex64,
        old_low: num_complex::Complex64,
        old_up: num_complex::Complex64,
    ) {
        let error_abs = (new_low - old_low).norm() + (new_up - old_up).norm();
        let xabs = new_low.norm().min(new_up.norm());
        let error_rel = if xabs > 0.0 { error_abs / xabs } else { error_abs };
        self.error_abs[kz] = error_abs;
        self.error_rel[kz] = error_rel;
        if error_abs < self.atol || error_rel < self.rtol {
            self.converged[kz] = true;
        }
    }

    /// Mark modes from globally-reduced per-mode residuals and solution
    /// magnitudes.
    pub fn mark_from_global(&mut self, error_abs: &[f64], max_sol: &[f64]) {
        for kz in 0..self.converged.len() {
            let rel = if max_sol[kz] > 0.0 {
                error_abs[kz] / max_sol[kz]
            } else {
                error_abs[kz]
            };
            self.error_abs[kz] = error_abs[kz];
            self.error_rel[kz] = rel;
            if error_abs[kz] < self.atol || rel < self.rtol {
                self.converged[kz] = true;
            }
        }
    }

    /// Whether the collective convergence check should run this cycle.
    pub fn should_check(&self, cycle: usize) -> bool {
        if !self.predict {
            return true;
        }
        if cycle <= CALIBRATION_CYCLES {
            return true;
        }
        cycle >= self.next_check
    }

    /// Feed the globally-reduced residual of a checked (and not yet
    /// converged) cycle, and schedule the next check from the observed
    /// convergence ratio. A non-contracting ratio forces a check on the
    /// very next cycle so stagnation is never masked.
    pub fn record_checked_cycle(&mut self, cycle: usize, residual: f64, target: f64) {
        let prediction = match self.history.last() {
            Some(&(prev_cycle, prev_residual))
                if residual > 0.0
                    && prev_residual > residual
                    && cycle > prev_cycle =>
            {
                let per_cycle =
                    (residual / prev_residual).powf(1.0 / (cycle - prev_cycle) as f64);
                let remaining = (target.max(f64::MIN_POSITIVE) / residual).ln() / per_cycle.ln();
                if remaining.is_finite() && remaining > 1.0 {
                    Some(cycle + (remaining.ceil() as usize))
                } else {
                    None
                }
            }
            _ => None,
        };
        self.history.push((cycle, residual));
        self.next_check = match prediction {
            // Check once just before the predicted exit cycle; failed
            // checks after that fall through to every-cycle checking.
            Some(predicted) => (predicted - 1).clamp(cycle + 1, cycle + MAX_SKIP),
            None => cycle + 1,
        };
    }

    pub fn history(&self) -> Vec<f64> {
        self.history.iter().map(|&(_, r)| r).collect()
    }

    pub fn max_error_abs(&self) -> f64 {
        self.error_abs
            .iter()
            .zip(self.converged.iter())
            .map(|(&e, &done)| if done { 0.0 } else { e })
            .fold(0.0_f64, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    #[test]
    fn test_mode_converges_on_absolute_tolerance() {
        let mut m = ConvergenceMonitor::new(1, 1e-10, 1e-12, true);
        m.update_mode(0, c(5.0), c(5.0), c(5.0 + 1e-13), c(5.0));
        assert!(m.converged[0]);
        assert!(m.all_converged());
    }

    #[test]
    fn test_mode_converges_on_relative_tolerance() {
        let mut m = ConvergenceMonitor::new(1, 1e-4, 1e-30, true);
        // Absolute change 1e-3 but magnitude 1e2: relative 1e-5 < rtol.
        m.update_mode(0, c(100.0), c(100.0), c(100.0 + 1e-3), c(100.0));
        assert!(m.converged[0]);
    }

    #[test]
    fn test_unconverged_mode_stays_open() {
        let mut m = ConvergenceMonitor::new(2, 1e-8, 1e-20, true);
        m.update_mode(0, c(1.0), c(1.0), c(2.0), c(1.0));
        assert!(!m.converged[0]);
        assert!(!m.all_converged());
        assert!(m.max_error_abs() > 0.9);
    }

    #[test]
    fn test_calibration_cycles_always_checked() {
        let m = ConvergenceMonitor::new(1, 1e-8, 1e-20, true);
        for cycle in 0..=CALIBRATION_CYCLES {
            assert!(m.should_check(cycle), "cycle {cycle} must be checked");
        }
    }

    #[test]
    fn test_prediction_skips_intermediate_cycles() {
        let mut m = ConvergenceMonitor::new(1, 1e-8, 1e-20, true);
        // Residual contracts by 10x per cycle; from 1e-2 the target 1e-8
        // is ~6 cycles away, so checks at 5..6 should be scheduled, not 4.
        m.record_checked_cycle(2, 1e-1, 1e-8);
        m.record_checked_cycle(3, 1e-2, 1e-8);
        assert!(!m.should_check(4));
        assert!(!m.should_check(7));
        assert!(m.should_check(8));
    }

    #[test]
    fn test_stagnation_forces_next_cycle_check() {
        let mut m = ConvergenceMonitor::new(1, 1e-8, 1e-20, true);
        m.record_checked_cycle(2, 1e-3, 1e-8);
        // No contraction: the monitor must not skip anything.
        m.record_checked_cycle(4, 2e-3, 1e-8);
        assert!(m.should_check(5));
    }

    #[test]
    fn test_prediction_disabled_checks_every_cycle() {
        let mut m = ConvergenceMonitor::new(1, 1e-8, 1e-20, false);
        m.record_checked_cycle(2, 1e-1, 1e-8);
        m.record_checked_cycle(3, 1e-2, 1e-8);
        for cycle in 0..40 {
            assert!(m.should_check(cycle));
        }
    }

    #[test]
    fn test_skip_is_bounded() {
        let mut m = ConvergenceMonitor::new(1, 1e-8, 1e-20, true);
        // Contraction so slow the naive prediction is hundreds of cycles
        // out; the skip must stay within MAX_SKIP.
        m.record_checked_cycle(2, 1.0, 1e-8);
        m.record_checked_cycle(3, 0.999, 1e-8);
        assert!(m.should_check(3 + MAX_SKIP));
    }
}
