// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Local Elimination
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Rank-local tridiagonal elimination.
//!
//! Three Thomas solves per mode: one against the right-hand side
//! (the particular solution `minvb`) and one against a unit impulse at
//! each domain edge (the guard vectors). The guard vectors describe how
//! an assumed edge value propagates into the local interior, so they
//! depend only on the operator and are cached across calls; `minvb` is
//! recomputed for every right-hand side.
//!
//! Modes are independent, so the eliminations run on the rayon pool.
//! No communication happens here.

use ndarray::Array2;
use num_complex::Complex64;
use rayon::prelude::*;

use laplace_math::tridiag::thomas_solve;
use laplace_types::error::{LaplaceError, LaplaceResult};

use crate::partition::XSlice;

/// Per-rank tridiagonal operator rows, mode-major `(nmode, ncx)`.
#[derive(Debug, Clone)]
pub struct Operator {
    pub avec: Array2<Complex64>,
    pub bvec: Array2<Complex64>,
    pub cvec: Array2<Complex64>,
}

impl Operator {
    pub fn nmode(&self) -> usize {
        self.avec.nrows()
    }

    pub fn ncx(&self) -> usize {
        self.avec.ncols()
    }
}

/// Guard vectors, mode-major `(nmode, ncx)`. `lower` is identically zero
/// on the first rank and `upper` on the last: those sides carry physical
/// boundary rows instead of neighbour coupling.
#[derive(Debug, Clone)]
pub struct GuardVectors {
    pub lower: Array2<Complex64>,
    pub upper: Array2<Complex64>,
}

/// Overwrite the guard rows on interior sides with identity rows.
/// The guard row then carries exactly the neighbour's edge value, and a
/// unit impulse placed there propagates cleanly through the elimination.
pub fn patch_guard_rows(op: &mut Operator, slice: &XSlice) {
    let zero = Complex64::new(0.0, 0.0);
    let one = Complex64::new(1.0, 0.0);
    let nmode = op.nmode();
    let ncx = op.ncx();

    if !slice.first_x() {
        for kz in 0..nmode {
            for ix in 0..slice.xs {
                op.avec[[kz, ix]] = zero;
                op.bvec[[kz, ix]] = one;
                op.cvec[[kz, ix]] = zero;
            }
        }
    }
    if !slice.last_x() {
        for kz in 0..nmode {
            for ix in slice.xe + 1..ncx {
                op.avec[[kz, ix]] = zero;
                op.bvec[[kz, ix]] = one;
                op.cvec[[kz, ix]] = zero;
            }
        }
    }
}

/// Zero the right-hand side on patched guard rows, matching
/// [`patch_guard_rows`].
pub fn patch_guard_rhs(rvec: &mut Array2<Complex64>, slice: &XSlice) {
    let zero = Complex64::new(0.0, 0.0);
    let nmode = rvec.nrows();
    let ncx = rvec.ncols();
    if !slice.first_x() {
        for kz in 0..nmode {
            for ix in 0..slice.xs {
                rvec[[kz, ix]] = zero;
            }
        }
    }
    if !slice.last_x() {
        for kz in 0..nmode {
            for ix in slice.xe + 1..ncx {
                rvec[[kz, ix]] = zero;
            }
        }
    }
}

fn mode_solve(
    op: &Operator,
    rhs: &[Complex64],
    slice: &XSlice,
    kz: usize,
) -> LaplaceResult<Vec<Complex64>> {
    let ncx = op.ncx();
    let a: Vec<Complex64> = op.avec.row(kz).to_vec();
    let b: Vec<Complex64> = op.bvec.row(kz).to_vec();
    let c: Vec<Complex64> = op.cvec.row(kz).to_vec();
    let mut x = vec![Complex64::new(0.0, 0.0); ncx];
    thomas_solve(&a, &b, &c, rhs, &mut x).map_err(|row| LaplaceError::SingularLocalBlock {
        rank: slice.rank,
        mode: kz,
        row,
    })?;
    Ok(x)
}

/// Eliminate the local block against the right-hand side alone, assuming
/// zero contribution from the neighbours.
pub fn particular_solution(
    op: &Operator,
    rvec: &Array2<Complex64>,
    slice: &XSlice,
) -> LaplaceResult<Array2<Complex64>> {
    let nmode = op.nmode();
    let ncx = op.ncx();
    let rows: Vec<Vec<Complex64>> = (0..nmode)
        .into_par_iter()
        .map(|kz| {
            let rhs: Vec<Complex64> = rvec.row(kz).to_vec();
            mode_solve(op, &rhs, slice, kz)
        })
        .collect::<LaplaceResult<Vec<_>>>()?;

    let mut minvb = Array2::zeros((nmode, ncx));
    for (kz, row) in rows.into_iter().enumerate() {
        for (ix, v) in row.into_iter().enumerate() {
            minvb[[kz, ix]] = v;
        }
    }
    Ok(minvb)
}

/// Eliminate the local block against a unit impulse at each domain edge.
/// Depends only on the operator; cached by the engine until `reset()`.
pub fn guard_vectors(op: &Operator, slice: &XSlice) -> LaplaceResult<GuardVectors> {
    let nmode = op.nmode();
    let ncx = op.ncx();
    let zero = Complex64::new(0.0, 0.0);
    let one = Complex64::new(1.0, 0.0);

    let rows: Vec<(Vec<Complex64>, Vec<Complex64>)> = (0..nmode)
        .into_par_iter()
        .map(|kz| {
            let mut evec = vec![zero; ncx];
            let lower = if slice.first_x() {
                vec![zero; ncx]
            } else {
                evec[slice.xs - 1] = one;
                let x = mode_solve(op, &evec, slice, kz)?;
                evec[slice.xs - 1] = zero;
                x
            };
            let upper = if slice.last_x() {
                vec![zero; ncx]
            } else {
                evec[slice.xe + 1] = one;
                mode_solve(op, &evec, slice, kz)?
            };
            Ok((lower, upper))
        })
        .collect::<LaplaceResult<Vec<_>>>()?;

    let mut guards = GuardVectors {
        lower: Array2::zeros((nmode, ncx)),
        upper: Array2::zeros((nmode, ncx)),
    };
    for (kz, (lower, upper)) in rows.into_iter().enumerate() {
        for ix in 0..ncx {
            guards.lower[[kz, ix]] = lower[ix];
            guards.upper[[kz, ix]] = upper[ix];
        }
    }
    Ok(guards)
}
