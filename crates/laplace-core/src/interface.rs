// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Interface System
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Reduced interface system.
//!
//! Reading the guard vectors and the particular solution at the two
//! interior-edge rows gives an exact affine relation per rank and mode:
//!
//! ```text
//!   x[xs] = rl + al·x[xs-1] + bl·x[xe+1]
//!   x[xe] = ru + au·x[xs-1] + bu·x[xe+1]
//! ```
//!
//! Solving this 2-unknowns-per-rank system for the edge values and then
//! reconstructing interiors from the guard vectors is equivalent to
//! solving the full distributed tridiagonal system.

use ndarray::Array2;
use num_complex::Complex64;

use crate::local::GuardVectors;
use crate::partition::XSlice;

/// Slack on the diagonal-dominance test to absorb rounding in the
/// guard-vector elimination.
pub const DOMINANCE_SLACK: f64 = 1e-12;

/// Operator part of the interface relation; per-mode, cached until the
/// operator changes.
#[derive(Debug, Clone)]
pub struct InterfaceCoeffs {
    pub al: Vec<Complex64>,
    pub bl: Vec<Complex64>,
    pub au: Vec<Complex64>,
    pub bu: Vec<Complex64>,
}

impl InterfaceCoeffs {
    pub fn nmode(&self) -> usize {
        self.al.len()
    }

    /// Both interface rows diagonally dominant for mode `kz`. The
    /// diagonal is normalized to one, so the row test reduces to the
    /// off-diagonal magnitudes summing to at most one. Sufficient (not
    /// necessary) for Jacobi-type iteration to converge.
    pub fn diagonally_dominant_mode(&self, kz: usize) -> bool {
        self.al[kz].norm() + self.bl[kz].norm() <= 1.0 + DOMINANCE_SLACK
            && self.au[kz].norm() + self.bu[kz].norm() <= 1.0 + DOMINANCE_SLACK
    }

    /// Dominance across every mode on this rank.
    pub fn diagonally_dominant(&self) -> bool {
        (0..self.nmode()).all(|kz| self.diagonally_dominant_mode(kz))
    }
}

/// Derive the interface coefficients from the guard vectors.
pub fn build_coeffs(guards: &GuardVectors, slice: &XSlice) -> InterfaceCoeffs {
    let nmode = guards.lower.nrows();
    let mut coeffs = InterfaceCoeffs {
        al: Vec::with_capacity(nmode),
        bl: Vec::with_capacity(nmode),
        au: Vec::with_capacity(nmode),
        bu: Vec::with_capacity(nmode),
    };
    for kz in 0..nmode {
        coeffs.al.push(guards.lower[[kz, slice.xs]]);
        coeffs.bl.push(guards.upper[[kz, slice.xs]]);
        coeffs.au.push(guards.lower[[kz, slice.xe]]);
        coeffs.bu.push(guards.upper[[kz, slice.xe]]);
    }
    coeffs
}

/// Right-hand side of the interface relation, re-read from the current
/// particular solution on every call.
pub fn edge_rhs(minvb: &Array2<Complex64>, slice: &XSlice) -> (Vec<Complex64>, Vec<Complex64>) {
    let nmode = minvb.nrows();
    let mut rl = Vec::with_capacity(nmode);
    let mut ru = Vec::with_capacity(nmode);
    for kz in 0..nmode {
        rl.push(minvb[[kz, slice.xs]]);
        ru.push(minvb[[kz, slice.xe]]);
    }
    (rl, ru)
}
