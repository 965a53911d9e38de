// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Solver Cache
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Operator-lifetime solver state.
//!
//! Guard vectors, interface coefficients and the multigrid level arena
//! depend only on the operator, and the warm-start field on the call
//! history; all of it lives here so a single `invalidate()` drops every
//! derived quantity when the operator changes.

use ndarray::Array2;
use num_complex::Complex64;

use crate::interface::InterfaceCoeffs;
use crate::local::GuardVectors;
use crate::reduced::multigrid::LevelArena;

#[derive(Debug, Clone, Default)]
pub struct SolverCache {
    pub guards: Option<GuardVectors>,
    pub iface: Option<InterfaceCoeffs>,
    pub arena: Option<LevelArena>,
    /// Previous call's spectral solution, used as a warm start.
    pub x0saved: Option<Array2<Complex64>>,
}

impl SolverCache {
    pub fn new() -> Self {
        SolverCache::default()
    }

    /// Drop everything derived from the operator and the call history.
    pub fn invalidate(&mut self) {
        self.guards = None;
        self.iface = None;
        self.arena = None;
        self.x0saved = None;
    }
}
