// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Tridiag
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Thomas algorithm for complex tridiagonal systems.
//!
//! The spectral decomposition in z makes every per-mode operator complex,
//! so unlike the real-valued heat-equation variant this solver works on
//! `Complex64` throughout and reports singular pivots instead of panicking:
//! a zero pivot aborts the whole inversion upward through the engine.

use num_complex::Complex64;

/// Pivot magnitude below which the elimination is treated as singular.
pub const PIVOT_FLOOR: f64 = 1e-300;

/// Solve the tridiagonal system Ax = d with the Thomas algorithm.
///
/// - `a`: sub-diagonal \[n\] (a\[0\] unused)
/// - `b`: main diagonal \[n\]
/// - `c`: super-diagonal \[n\] (c\[n-1\] unused)
/// - `d`: right-hand side \[n\]
/// - `x`: solution output \[n\]
///
/// Returns `Err(row)` with the offending row index when a pivot underflows
/// to zero; the caller attaches rank/mode context.
pub fn thomas_solve(
    a: &[Complex64],
    b: &[Complex64],
    c: &[Complex64],
    d: &[Complex64],
    x: &mut [Complex64],
) -> Result<(), usize> {
    let n = d.len();
    debug_assert!(n > 0);
    debug_assert_eq!(a.len(), n);
    debug_assert_eq!(b.len(), n);
    debug_assert_eq!(c.len(), n);
    debug_assert_eq!(x.len(), n);

    let mut c_prime = vec![Complex64::new(0.0, 0.0); n];
    let mut d_prime = vec![Complex64::new(0.0, 0.0); n];

    // Forward sweep
    if b[0].norm() < PIVOT_FLOOR {
        return Err(0);
    }
    c_prime[0] = c[0] / b[0];
    d_prime[0] = d[0] / b[0];

    for i in 1..n {
        let den = b[i] - a[i] * c_prime[i - 1];
        if den.norm() < PIVOT_FLOOR {
            return Err(i);
        }
        if i < n - 1 {
            c_prime[i] = c[i] / den;
        }
        d_prime[i] = (d[i] - a[i] * d_prime[i - 1]) / den;
    }

    // Back substitution
    x[n - 1] = d_prime[n - 1];
    for i in (0..n - 1).rev() {
        x[i] = d_prime[i] - c_prime[i] * x[i + 1];
    }

    Ok(())
}

/// Multiply the tridiagonal matrix by `x`, writing Ax into `out`.
/// Used by tests and the solution verifier.
pub fn tridiag_apply(
    a: &[Complex64],
    b: &[Complex64],
    c: &[Complex64],
    x: &[Complex64],
    out: &mut [Complex64],
) {
    let n = x.len();
    for i in 0..n {
        let mut acc = b[i] * x[i];
        if i > 0 {
            acc += a[i] * x[i - 1];
        }
        if i < n - 1 {
            acc += c[i] * x[i + 1];
        }
        out[i] = acc;
    }
}
