// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Solution Reconstruction
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Full local solution from converged edge values.
//!
//! `x = minvb + lower_guard·x[xs-1] + upper_guard·x[xe+1]` per mode.
//! Exact given exact edge values; an edge error ε enters the interior as
//! ε·guard_vector, so the interior error is bounded by ε times the
//! guard-vector maximum norm. A pure function of its inputs: repeated
//! calls with the same inputs produce bit-identical output.

use ndarray::Array2;
use num_complex::Complex64;

use laplace_types::config::PostprocessFlags;

use crate::local::GuardVectors;
use crate::partition::XSlice;

/// Combine the particular solution with the guard-vector propagation of
/// the converged halo values `xlow = x[xs-1]`, `xup = x[xe+1]`.
pub fn reconstruct_full(
    minvb: &Array2<Complex64>,
    guards: &GuardVectors,
    slice: &XSlice,
    xlow: &[Complex64],
    xup: &[Complex64],
) -> Array2<Complex64> {
    let nmode = minvb.nrows();
    let ncx = minvb.ncols();
    let mut xk = minvb.clone();
    if !slice.last_x() {
        for kz in 0..nmode {
            for ix in 0..ncx {
                xk[[kz, ix]] += guards.upper[[kz, ix]] * xup[kz];
            }
        }
    }
    if !slice.first_x() {
        for kz in 0..nmode {
            for ix in 0..ncx {
                xk[[kz, ix]] += guards.lower[[kz, ix]] * xlow[kz];
            }
        }
    }
    xk
}

/// Post-processing applied to the spectral solution before the caller's
/// inverse transform.
pub fn apply_postprocess(xk: &mut Array2<Complex64>, flags: &PostprocessFlags, slice: &XSlice) {
    if xk.nrows() == 0 {
        return;
    }
    if flags.subtract_mean_kx0 {
        let mut offset = Complex64::new(0.0, 0.0);
        for ix in slice.xs..=slice.xe {
            offset += xk[[0, ix]];
        }
        offset /= slice.local_interior as f64;
        for ix in slice.xs..=slice.xe {
            xk[[0, ix]] -= offset;
        }
    }
    if flags.zero_dc {
        for ix in 0..xk.ncols() {
            xk[[0, ix]] = Complex64::new(0.0, 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::decompose_x;

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    fn setup(nmode: usize, ncx: usize) -> (Array2<Complex64>, GuardVectors) {
        let minvb = Array2::from_shape_fn((nmode, ncx), |(kz, ix)| {
            Complex64::new((kz * 10 + ix) as f64, -(ix as f64))
        });
        let guards = GuardVectors {
            lower: Array2::from_shape_fn((nmode, ncx), |(kz, ix)| {
                Complex64::new(0.1 * (kz + 1) as f64 * ix as f64, 0.02)
            }),
            upper: Array2::from_shape_fn((nmode, ncx), |(kz, ix)| {
                Complex64::new(0.0, -0.3 * (kz as f64 + ix as f64))
            }),
        };
        (minvb, guards)
    }

    #[test]
    fn test_reconstruction_is_bit_identical() {
        let slices = decompose_x(9, 3, 1).expect("decompose");
        let slice = &slices[1];
        let (minvb, guards) = setup(3, slice.ncx);
        let xlow = vec![c(0.7); 3];
        let xup = vec![c(-0.4); 3];
        let first = reconstruct_full(&minvb, &guards, slice, &xlow, &xup);
        let second = reconstruct_full(&minvb, &guards, slice, &xlow, &xup);
        assert_eq!(first, second, "reconstruction must be deterministic");
    }

    #[test]
    fn test_boundary_ranks_ignore_missing_neighbour_term() {
        let slices = decompose_x(8, 2, 1).expect("decompose");
        let (minvb, guards) = setup(1, slices[0].ncx);
        // First rank: lower edge contribution must not enter.
        let with_low = reconstruct_full(&minvb, &guards, &slices[0], &[c(99.0)], &[c(0.0)]);
        let without = reconstruct_full(&minvb, &guards, &slices[0], &[c(0.0)], &[c(0.0)]);
        assert_eq!(with_low, without);
    }

    #[test]
    fn test_zero_dc_clears_lowest_mode() {
        let slices = decompose_x(6, 1, 1).expect("decompose");
        let slice = &slices[0];
        let mut xk = Array2::from_elem((2, slice.ncx), c(3.0));
        apply_postprocess(
            &mut xk,
            &PostprocessFlags {
                zero_dc: true,
                subtract_mean_kx0: false,
            },
            slice,
        );
        assert!(xk.row(0).iter().all(|v| v.norm() == 0.0));
        assert!(xk.row(1).iter().all(|v| (v - c(3.0)).norm() < 1e-15));
    }

    #[test]
    fn test_subtract_mean_kx0_removes_interior_offset() {
        let slices = decompose_x(4, 1, 1).expect("decompose");
        let slice = &slices[0];
        let mut xk = Array2::zeros((1, slice.ncx));
        for ix in 0..slice.ncx {
            xk[[0, ix]] = c(2.0 + ix as f64);
        }
        apply_postprocess(
            &mut xk,
            &PostprocessFlags {
                zero_dc: false,
                subtract_mean_kx0: true,
            },
            slice,
        );
        let mean: Complex64 = (slice.xs..=slice.xe).map(|ix| xk[[0, ix]]).sum::<Complex64>()
            / slice.local_interior as f64;
        assert!(mean.norm() < 1e-14, "interior mean should vanish, got {mean}");
    }
}
