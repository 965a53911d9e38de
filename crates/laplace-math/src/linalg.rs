// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Linalg
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Small dense complex solves used by the reduced-system strategies.

use num_complex::Complex64;

/// Magnitude below which a 2x2 determinant is treated as singular.
pub const DET_FLOOR: f64 = 1e-300;

/// Solve the 2x2 system
/// ```text
///   | b0 c0 | |x0|   |r0|
///   | a1 b1 | |x1| = |r1|
/// ```
/// by Cramer's rule. Returns `None` when the determinant underflows.
pub fn solve_2x2(
    b0: Complex64,
    c0: Complex64,
    a1: Complex64,
    b1: Complex64,
    r0: Complex64,
    r1: Complex64,
) -> Option<(Complex64, Complex64)> {
    let det = b0 * b1 - c0 * a1;
    if det.norm() < DET_FLOOR {
        return None;
    }
    let x0 = (r0 * b1 - r1 * c0) / det;
    let x1 = (r1 * b0 - r0 * a1) / det;
    Some((x0, x1))
}

/// Maximum absolute value over a complex slice.
pub fn max_abs(values: &[Complex64]) -> f64 {
    values.iter().map(|v| v.norm()).fold(0.0_f64, f64::max)
}

/// Row-major complex 2x2 matrix, used for the block form of the reduced
/// interface system.
pub type Mat2 = [[Complex64; 2]; 2];

pub fn mat2_zero() -> Mat2 {
    [[Complex64::new(0.0, 0.0); 2]; 2]
}

pub fn mat2_identity() -> Mat2 {
    let mut m = mat2_zero();
    m[0][0] = Complex64::new(1.0, 0.0);
    m[1][1] = Complex64::new(1.0, 0.0);
    m
}

pub fn mat2_mul(a: &Mat2, b: &Mat2) -> Mat2 {
    let mut out = mat2_zero();
    for i in 0..2 {
        for j in 0..2 {
            out[i][j] = a[i][0] * b[0][j] + a[i][1] * b[1][j];
        }
    }
    out
}

pub fn mat2_sub(a: &Mat2, b: &Mat2) -> Mat2 {
    let mut out = mat2_zero();
    for i in 0..2 {
        for j in 0..2 {
            out[i][j] = a[i][j] - b[i][j];
        }
    }
    out
}

pub fn mat2_vec(a: &Mat2, v: &[Complex64; 2]) -> [Complex64; 2] {
    [
        a[0][0] * v[0] + a[0][1] * v[1],
        a[1][0] * v[0] + a[1][1] * v[1],
    ]
}

/// Inverse of a 2x2 matrix; `None` when the determinant underflows.
pub fn mat2_inv(a: &Mat2) -> Option<Mat2> {
    let det = a[0][0] * a[1][1] - a[0][1] * a[1][0];
    if det.norm() < DET_FLOOR {
        return None;
    }
    Some([
        [a[1][1] / det, -a[0][1] / det],
        [-a[1][0] / det, a[0][0] / det],
    ])
}
