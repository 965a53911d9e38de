// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Distributed Perpendicular Laplacian Inversion
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Distributed inversion of per-mode complex tridiagonal systems whose
//! unknowns are split across ranks along x, without ever assembling the
//! full system on one rank.
//!
//! Per rank and mode, a Thomas elimination yields the particular
//! solution and two guard vectors; reading them at the interior edges
//! gives an exact 2-unknowns-per-rank interface relation which one of
//! three interchangeable strategies solves (Jacobi relaxation, multigrid
//! over rank interfaces, parallel cyclic reduction); the guard vectors
//! then rebuild the full local solution. Spectral transforms and
//! coefficient assembly live with the caller.

pub mod cache;
pub mod comm;
pub mod interface;
pub mod local;
pub mod monitor;
pub mod partition;
pub mod reconstruct;
pub mod reduced;
pub mod solver;

pub use laplace_types::config::{PostprocessFlags, SolverConfig, Strategy};
pub use laplace_types::error::{BudgetFailure, LaplaceError, LaplaceResult};

pub use crate::comm::{RankLink, ThreadFabric};
pub use crate::partition::{decompose_x, XSlice};
pub use crate::solver::{ParallelLaplace, SolveDiagnostics};
