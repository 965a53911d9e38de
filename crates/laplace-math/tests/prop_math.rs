// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Property-Based Tests (proptest) for laplace-math
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for laplace-math: complex Thomas solver and the
//! small dense 2x2 helpers.

use laplace_math::linalg::{mat2_inv, mat2_mul, mat2_vec, solve_2x2, Mat2};
use laplace_math::tridiag::{thomas_solve, tridiag_apply};
use num_complex::Complex64;
use proptest::prelude::*;

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

proptest! {
    /// For any diagonally dominant complex tridiagonal system,
    /// x = thomas_solve(a,b,c,d) satisfies Ax = d within tolerance.
    #[test]
    fn thomas_solve_ax_eq_d(
        n in 3usize..30,
        dom in 2.2f64..5.0,
        im in -1.0f64..1.0,
    ) {
        let a: Vec<Complex64> = (0..n)
            .map(|i| if i > 0 { c(-1.0, 0.1) } else { c(0.0, 0.0) })
            .collect();
        let b = vec![c(dom, im); n];
        let cv: Vec<Complex64> = (0..n)
            .map(|i| if i < n - 1 { c(-1.0, -0.2) } else { c(0.0, 0.0) })
            .collect();
        let d: Vec<Complex64> = (0..n)
            .map(|i| c((i as f64 + 1.0).sin(), (i as f64 * 0.7).cos()))
            .collect();

        let mut x = vec![c(0.0, 0.0); n];
        thomas_solve(&a, &b, &cv, &d, &mut x).expect("dominant system must solve");

        let mut ax = vec![c(0.0, 0.0); n];
        tridiag_apply(&a, &b, &cv, &x, &mut ax);
        for i in 0..n {
            prop_assert!(
                (ax[i] - d[i]).norm() < 1e-9,
                "Ax[{}] = {}, d[{}] = {}", i, ax[i], i, d[i]
            );
        }
    }

    /// Identity system (b=1, a=c=0) returns d unchanged.
    #[test]
    fn thomas_identity_system(n in 1usize..50) {
        let a = vec![c(0.0, 0.0); n];
        let b = vec![c(1.0, 0.0); n];
        let cv = vec![c(0.0, 0.0); n];
        let d: Vec<Complex64> = (0..n)
            .map(|i| c((i as f64) * 0.7 - 3.0, i as f64 * 0.1))
            .collect();

        let mut x = vec![c(0.0, 0.0); n];
        thomas_solve(&a, &b, &cv, &d, &mut x).expect("identity solves");
        for i in 0..n {
            prop_assert!((x[i] - d[i]).norm() < 1e-14);
        }
    }

    /// solve_2x2 agrees with matrix inversion where both succeed.
    #[test]
    fn solve_2x2_matches_inverse(
        b0 in 1.0f64..3.0,
        c0 in -0.9f64..0.9,
        a1 in -0.9f64..0.9,
        b1 in 1.0f64..3.0,
        r0 in -5.0f64..5.0,
        r1 in -5.0f64..5.0,
    ) {
        let m: Mat2 = [[c(b0, 0.2), c(c0, -0.1)], [c(a1, 0.3), c(b1, -0.4)]];
        let rhs = [c(r0, 1.0), c(r1, -1.0)];
        let (x0, x1) = solve_2x2(m[0][0], m[0][1], m[1][0], m[1][1], rhs[0], rhs[1])
            .expect("well-conditioned");
        let inv = mat2_inv(&m).expect("invertible");
        let via_inv = mat2_vec(&inv, &rhs);
        prop_assert!((x0 - via_inv[0]).norm() < 1e-10);
        prop_assert!((x1 - via_inv[1]).norm() < 1e-10);
    }

    /// Matrix product with the inverse is the identity.
    #[test]
    fn mat2_inverse_property(
        a00 in 1.0f64..4.0,
        a01 in -0.8f64..0.8,
        a10 in -0.8f64..0.8,
        a11 in 1.0f64..4.0,
    ) {
        let m: Mat2 = [[c(a00, 0.5), c(a01, 0.0)], [c(a10, -0.2), c(a11, 0.1)]];
        let inv = mat2_inv(&m).expect("invertible");
        let prod = mat2_mul(&m, &inv);
        for i in 0..2 {
            for j in 0..2 {
                let expect = if i == j { 1.0 } else { 0.0 };
                prop_assert!(
                    (prod[i][j] - c(expect, 0.0)).norm() < 1e-10,
                    "A·A⁻¹ at ({},{}) = {}", i, j, prod[i][j]
                );
            }
        }
    }
}
