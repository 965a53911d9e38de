// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Test Harness
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Shared helpers: global reference systems, block extraction, and a
//! thread-backed cluster runner standing in for the rank processes.
#![allow(dead_code)]

use ndarray::Array2;
use num_complex::Complex64;

use laplace_core::{
    decompose_x, ParallelLaplace, PostprocessFlags, SolverConfig, ThreadFabric,
};
use laplace_math::tridiag::thomas_solve;
use laplace_types::error::LaplaceResult;

pub fn c(re: f64) -> Complex64 {
    Complex64::new(re, 0.0)
}

/// Assembled global tridiagonal system, mode-major `(nmode, n_global)`,
/// one Dirichlet boundary row on each end.
#[derive(Debug, Clone)]
pub struct GlobalSystem {
    pub a: Array2<Complex64>,
    pub b: Array2<Complex64>,
    pub cv: Array2<Complex64>,
    pub r: Array2<Complex64>,
}

impl GlobalSystem {
    pub fn nmode(&self) -> usize {
        self.a.nrows()
    }

    pub fn n_global(&self) -> usize {
        self.a.ncols()
    }
}

/// Helmholtz-like per-mode rows `u_{i-1} - (2 + k²(1 + 0.1i))u_i + u_{i+1}`
/// with a manufactured right-hand side and Dirichlet boundary values.
pub fn helmholtz_system(
    nmode: usize,
    n_interior: usize,
    inner_bc: Complex64,
    outer_bc: Complex64,
) -> GlobalSystem {
    let n = n_interior + 2;
    let mut sys = GlobalSystem {
        a: Array2::zeros((nmode, n)),
        b: Array2::zeros((nmode, n)),
        cv: Array2::zeros((nmode, n)),
        r: Array2::zeros((nmode, n)),
    };
    for kz in 0..nmode {
        let ksq = Complex64::new(0.4 + 0.5 * (kz * kz) as f64, 0.05 * kz as f64);
        for ix in 0..n {
            if ix == 0 {
                sys.b[[kz, ix]] = c(1.0);
                sys.r[[kz, ix]] = inner_bc;
            } else if ix == n - 1 {
                sys.b[[kz, ix]] = c(1.0);
                sys.r[[kz, ix]] = outer_bc;
            } else {
                sys.a[[kz, ix]] = c(1.0);
                sys.b[[kz, ix]] = c(-2.0) - ksq;
                sys.cv[[kz, ix]] = c(1.0);
                sys.r[[kz, ix]] = Complex64::new(
                    (0.7 * ix as f64 + kz as f64).sin(),
                    (0.3 * ix as f64).cos() * 0.5,
                );
            }
        }
    }
    sys
}

/// Diagonally dominant rows `u_{i-1} - (2 + d + iw)u_i + u_{i+1}` with a
/// manufactured right-hand side; `d > 0` controls how strongly the
/// diagonal dominates.
pub fn dominant_system(nmode: usize, n_interior: usize, d: f64, w: f64) -> GlobalSystem {
    let n = n_interior + 2;
    let mut sys = GlobalSystem {
        a: Array2::zeros((nmode, n)),
        b: Array2::zeros((nmode, n)),
        cv: Array2::zeros((nmode, n)),
        r: Array2::zeros((nmode, n)),
    };
    for kz in 0..nmode {
        for ix in 0..n {
            if ix == 0 || ix == n - 1 {
                sys.b[[kz, ix]] = c(1.0);
            } else {
                sys.a[[kz, ix]] = c(1.0);
                sys.b[[kz, ix]] = Complex64::new(-(2.0 + d), w);
                sys.cv[[kz, ix]] = c(1.0);
                sys.r[[kz, ix]] = Complex64::new(
                    ((ix + kz) as f64 * 0.9).sin(),
                    (ix as f64 * 0.4 - kz as f64).cos(),
                );
            }
        }
    }
    sys
}

/// Serial reference: full-system Thomas elimination per mode.
pub fn reference_solution(sys: &GlobalSystem) -> Array2<Complex64> {
    let nmode = sys.nmode();
    let n = sys.n_global();
    let mut x = Array2::zeros((nmode, n));
    for kz in 0..nmode {
        let a: Vec<Complex64> = sys.a.row(kz).to_vec();
        let b: Vec<Complex64> = sys.b.row(kz).to_vec();
        let cv: Vec<Complex64> = sys.cv.row(kz).to_vec();
        let r: Vec<Complex64> = sys.r.row(kz).to_vec();
        let mut row = vec![c(0.0); n];
        thomas_solve(&a, &b, &cv, &r, &mut row).expect("reference solve");
        for ix in 0..n {
            x[[kz, ix]] = row[ix];
        }
    }
    x
}

/// Local coefficient window of one rank (boundary width 1): local row ix
/// maps to global row `interior_start + ix`.
pub fn extract_block(
    sys: &GlobalSystem,
    slice: &laplace_core::XSlice,
) -> (
    Array2<Complex64>,
    Array2<Complex64>,
    Array2<Complex64>,
    Array2<Complex64>,
) {
    let nmode = sys.nmode();
    let ncx = slice.ncx;
    let mut a = Array2::zeros((nmode, ncx));
    let mut b = Array2::zeros((nmode, ncx));
    let mut cv = Array2::zeros((nmode, ncx));
    let mut r = Array2::zeros((nmode, ncx));
    for kz in 0..nmode {
        for ix in 0..ncx {
            let g = slice.interior_start + ix;
            a[[kz, ix]] = sys.a[[kz, g]];
            b[[kz, ix]] = sys.b[[kz, g]];
            cv[[kz, ix]] = sys.cv[[kz, g]];
            r[[kz, ix]] = sys.r[[kz, g]];
        }
    }
    (a, b, cv, r)
}

/// Run the distributed solve with one thread per rank and stitch the
/// per-rank solutions back into a global `(nmode, n_global)` field.
/// Stitched solution plus the per-rank diagnostics of a cluster run.
pub struct ClusterOutcome {
    pub solution: Array2<Complex64>,
    /// Per rank, the iteration count of each successive call.
    pub iterations: Vec<Vec<usize>>,
    /// Per rank, the residual history of the last call.
    pub histories: Vec<Vec<f64>>,
}

pub fn run_cluster(
    sys: &GlobalSystem,
    nranks: usize,
    config: &SolverConfig,
    flags: &PostprocessFlags,
) -> LaplaceResult<Array2<Complex64>> {
    run_cluster_repeated(sys, nranks, config, flags, 1).map(|outcome| outcome.solution)
}

/// Same as [`run_cluster`], calling `solve` `repeats` times per engine.
pub fn run_cluster_repeated(
    sys: &GlobalSystem,
    nranks: usize,
    config: &SolverConfig,
    flags: &PostprocessFlags,
    repeats: usize,
) -> LaplaceResult<ClusterOutcome> {
    let slices = decompose_x(sys.n_global() - 2, nranks, 1)?;
    let links = ThreadFabric::connect(nranks);
    let nmode = sys.nmode();
    let n_global = sys.n_global();

    type RankOutput = (laplace_core::XSlice, Array2<Complex64>, Vec<usize>, Vec<f64>);
    let results: Vec<LaplaceResult<RankOutput>> = std::thread::scope(|scope| {
        let handles: Vec<_> = links
            .into_iter()
            .zip(slices.into_iter())
            .map(|(link, slice)| {
                scope.spawn(move || {
                    let (a, b, cv, r) = extract_block(sys, &slice);
                    let mut engine = ParallelLaplace::new(
                        config.clone(),
                        *flags,
                        slice.clone(),
                        Box::new(link),
                    )?;
                    engine.set_operator(a, b, cv)?;
                    let mut xk = Array2::zeros((0, 0));
                    let mut its = Vec::with_capacity(repeats);
                    for _ in 0..repeats {
                        xk = engine.solve(&r, None)?;
                        its.push(engine.diagnostics().last_iterations);
                    }
                    let history = engine.diagnostics().residual_history;
                    Ok((slice, xk, its, history))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    });

    let mut global = Array2::zeros((nmode, n_global));
    let mut iterations = Vec::new();
    let mut histories = Vec::new();
    for result in results {
        let (slice, xk, its, history) = result?;
        iterations.push(its);
        histories.push(history);
        for kz in 0..nmode {
            for ix in slice.xs..=slice.xe {
                global[[kz, slice.interior_start + ix]] = xk[[kz, ix]];
            }
            if slice.first_x() {
                global[[kz, 0]] = xk[[kz, 0]];
            }
            if slice.last_x() {
                global[[kz, n_global - 1]] = xk[[kz, slice.ncx - 1]];
            }
        }
    }
    Ok(ClusterOutcome {
        solution: global,
        iterations,
        histories,
    })
}

/// Largest elementwise deviation between two fields.
pub fn max_deviation(a: &Array2<Complex64>, b: &Array2<Complex64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).norm())
        .fold(0.0_f64, f64::max)
}
