// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Parallel Cyclic Reduction
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Parallel cyclic reduction of the interface system.
//!
//! Written in block form, each rank's edge pair y_p = (x_l, x_u)
//! satisfies
//!
//! ```text
//!   y_p = r_p + A_p·y_{p-1} + B_p·y_{p+1}
//!   A_p = [0 al; 0 au],  B_p = [bl 0; bu 0]
//! ```
//!
//! Each round substitutes the stride-d neighbour relations into the
//! local one, which doubles the coupling distance:
//!
//! ```text
//!   M    = I − A·B_dn − B·A_up
//!   A'   = M⁻¹ A A_dn,  B' = M⁻¹ B B_up,
//!   r'   = M⁻¹ (r + A·r_dn + B·r_up)
//! ```
//!
//! Couplings that would reach past the chain ends are identically zero,
//! so after ceil(log2 P) rounds every coupling has vanished and y = r.
//! The round count is fixed up front: no residual-based stopping, no
//! failure-to-terminate mode. Accuracy on non-diagonally-dominant input
//! is not guaranteed, which is why the dominance diagnostic is reported
//! for failure classification.

use num_complex::Complex64;

use laplace_math::linalg::{
    mat2_identity, mat2_inv, mat2_mul, mat2_sub, mat2_vec, mat2_zero, Mat2,
};
use laplace_types::error::{LaplaceError, LaplaceResult};

use crate::comm::{chain_reduce_and, chain_reduce_max, Packet, RankLink, TAG_ITER};
use crate::interface::InterfaceCoeffs;
use crate::partition::XSlice;
use crate::reduced::{
    synchronize_halo, FinalizeReport, InterfaceState, ReducedSolver, XE, XS,
};

/// Per-mode block row: coupling matrices and right-hand side pair.
#[derive(Debug, Clone)]
struct BlockRow {
    a: Mat2,
    b: Mat2,
    r: [Complex64; 2],
}

pub struct CyclicReductionSolver {
    slice: XSlice,
    rows: Vec<BlockRow>,
    dominant: bool,
    rounds_done: bool,
}

impl CyclicReductionSolver {
    pub fn new(
        slice: &XSlice,
        coeffs: &InterfaceCoeffs,
        rl: Vec<Complex64>,
        ru: Vec<Complex64>,
    ) -> Self {
        let nmode = coeffs.nmode();
        let rows = (0..nmode)
            .map(|kz| {
                let mut a = mat2_zero();
                a[0][1] = coeffs.al[kz];
                a[1][1] = coeffs.au[kz];
                let mut b = mat2_zero();
                b[0][0] = coeffs.bl[kz];
                b[1][0] = coeffs.bu[kz];
                BlockRow {
                    a,
                    b,
                    r: [rl[kz], ru[kz]],
                }
            })
            .collect();
        CyclicReductionSolver {
            slice: slice.clone(),
            rows,
            dominant: coeffs.diagonally_dominant(),
            rounds_done: false,
        }
    }

    fn pack(rows: &[BlockRow]) -> Vec<Complex64> {
        let mut values = Vec::with_capacity(rows.len() * 10);
        for row in rows {
            for i in 0..2 {
                for j in 0..2 {
                    values.push(row.a[i][j]);
                }
            }
            for i in 0..2 {
                for j in 0..2 {
                    values.push(row.b[i][j]);
                }
            }
            values.push(row.r[0]);
            values.push(row.r[1]);
        }
        values
    }

    fn unpack(values: &[Complex64], nmode: usize) -> Vec<BlockRow> {
        (0..nmode)
            .map(|kz| {
                let base = kz * 10;
                let mut a = mat2_zero();
                let mut b = mat2_zero();
                for i in 0..2 {
                    for j in 0..2 {
                        a[i][j] = values[base + 2 * i + j];
                        b[i][j] = values[base + 4 + 2 * i + j];
                    }
                }
                BlockRow {
                    a,
                    b,
                    r: [values[base + 8], values[base + 9]],
                }
            })
            .collect()
    }

    fn zero_rows(nmode: usize) -> Vec<BlockRow> {
        (0..nmode)
            .map(|_| BlockRow {
                a: mat2_zero(),
                b: mat2_zero(),
                r: [Complex64::new(0.0, 0.0); 2],
            })
            .collect()
    }

    /// All ceil(log2 P) elimination rounds.
    fn reduce(&mut self, link: &dyn RankLink) -> LaplaceResult<()> {
        let nmode = self.rows.len();
        let rank = self.slice.rank;
        let nranks = self.slice.nranks;
        let mut stride = 1usize;

        while stride < nranks {
            let down = if rank >= stride { Some(rank - stride) } else { None };
            let up = if rank + stride < nranks {
                Some(rank + stride)
            } else {
                None
            };

            let payload = Self::pack(&self.rows);
            if let Some(peer) = down {
                link.send(peer, TAG_ITER, Packet::new(payload.clone()))?;
            }
            if let Some(peer) = up {
                link.send(peer, TAG_ITER, Packet::new(payload))?;
            }
            let rows_dn = match down {
                Some(peer) => Self::unpack(&link.recv(peer, TAG_ITER)?.values, nmode),
                None => Self::zero_rows(nmode),
            };
            let rows_up = match up {
                Some(peer) => Self::unpack(&link.recv(peer, TAG_ITER)?.values, nmode),
                None => Self::zero_rows(nmode),
            };

            for kz in 0..nmode {
                let row = &self.rows[kz];
                let dn = &rows_dn[kz];
                let upr = &rows_up[kz];

                let m = mat2_sub(
                    &mat2_sub(&mat2_identity(), &mat2_mul(&row.a, &dn.b)),
                    &mat2_mul(&row.b, &upr.a),
                );
                let m_inv = mat2_inv(&m).ok_or(LaplaceError::ReducedBreakdown {
                    rank,
                    mode: kz,
                })?;

                let a_new = mat2_mul(&m_inv, &mat2_mul(&row.a, &dn.a));
                let b_new = mat2_mul(&m_inv, &mat2_mul(&row.b, &upr.b));
                let mut rhs = row.r;
                let a_rdn = mat2_vec(&row.a, &dn.r);
                let b_rup = mat2_vec(&row.b, &upr.r);
                rhs[0] += a_rdn[0] + b_rup[0];
                rhs[1] += a_rdn[1] + b_rup[1];
                let r_new = mat2_vec(&m_inv, &rhs);

                self.rows[kz] = BlockRow {
                    a: a_new,
                    b: b_new,
                    r: r_new,
                };
            }

            stride *= 2;
        }
        Ok(())
    }
}

impl ReducedSolver for CyclicReductionSolver {
    fn iterate(&mut self, state: &mut InterfaceState, link: &dyn RankLink) -> LaplaceResult<()> {
        if self.rounds_done {
            return Ok(());
        }
        self.reduce(link)?;
        for (kz, row) in self.rows.iter().enumerate() {
            state.xloc[[XS, kz]] = row.r[0];
            state.xloc[[XE, kz]] = row.r[1];
        }
        state.save_last();
        self.rounds_done = true;
        Ok(())
    }

    fn has_converged(
        &mut self,
        _state: &mut InterfaceState,
        _link: &dyn RankLink,
    ) -> LaplaceResult<bool> {
        // Direct method: terminates after a fixed number of rounds.
        Ok(self.rounds_done)
    }

    fn finalize(
        &mut self,
        state: &mut InterfaceState,
        link: &dyn RankLink,
    ) -> LaplaceResult<FinalizeReport> {
        synchronize_halo(state, &self.slice, link)?;
        let flags = chain_reduce_and(link, &[true, self.dominant])?;
        let counts = chain_reduce_max(link, &[1.0])?;
        Ok(FinalizeReport {
            globally_converged: flags[0],
            diagonally_dominant: flags[1],
            max_iterations: counts[0] as usize,
        })
    }

    fn residual_history(&self) -> Vec<f64> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ThreadFabric;
    use crate::partition::decompose_x;
    use crate::reduced::{XLOW, XUP};

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    /// Two ranks, one round: the reduction must reproduce the exact
    /// solution of the 4-unknown coupled system.
    #[test]
    fn test_two_rank_block_reduction_exact() {
        // Rank 0 (first): al = au = 0; rank 1 (last): bl = bu = 0.
        let coeffs0 = InterfaceCoeffs {
            al: vec![c(0.0)],
            bl: vec![c(0.3)],
            au: vec![c(0.0)],
            bu: vec![c(0.4)],
        };
        let coeffs1 = InterfaceCoeffs {
            al: vec![c(0.2)],
            bl: vec![c(0.0)],
            au: vec![c(0.5)],
            bu: vec![c(0.0)],
        };
        let (rl0, ru0) = (c(1.0), c(2.0));
        let (rl1, ru1) = (c(-1.0), c(0.5));

        // Direct reference: unknowns (xl0, xu0, xl1, xu1) with
        //   xl0 = rl0 + bl0·xl1, xu0 = ru0 + bu0·xl1,
        //   xl1 = rl1 + al1·xu0, xu1 = ru1 + au1·xu0.
        // Solve the 2x2 inner pair (xu0, xl1) first.
        let det = c(1.0) - coeffs1.al[0] * coeffs0.bu[0];
        let xl1 = (rl1 + coeffs1.al[0] * ru0) / det;
        let xu0 = ru0 + coeffs0.bu[0] * xl1;
        let xl0 = rl0 + coeffs0.bl[0] * xl1;
        let xu1 = ru1 + coeffs1.au[0] * xu0;

        let slices = decompose_x(8, 2, 1).expect("decompose");
        let links = ThreadFabric::connect(2);
        let handles: Vec<_> = links
            .into_iter()
            .zip(slices.into_iter())
            .map(|(link, slice)| {
                let coeffs = if slice.rank == 0 {
                    coeffs0.clone()
                } else {
                    coeffs1.clone()
                };
                let (rl, ru) = if slice.rank == 0 {
                    (vec![rl0], vec![ru0])
                } else {
                    (vec![rl1], vec![ru1])
                };
                std::thread::spawn(move || {
                    let mut solver = CyclicReductionSolver::new(&slice, &coeffs, rl, ru);
                    let mut state = InterfaceState::new(1);
                    solver.iterate(&mut state, &link).expect("iterate");
                    assert!(solver.has_converged(&mut state, &link).expect("check"));
                    let report = solver.finalize(&mut state, &link).expect("finalize");
                    assert!(report.globally_converged);
                    (slice.rank, state)
                })
            })
            .collect();

        for handle in handles {
            let (rank, state) = handle.join().expect("join");
            if rank == 0 {
                assert!((state.xloc[[XS, 0]] - xl0).norm() < 1e-12);
                assert!((state.xloc[[XE, 0]] - xu0).norm() < 1e-12);
                assert!((state.xloc[[XUP, 0]] - xl1).norm() < 1e-12);
            } else {
                assert!((state.xloc[[XS, 0]] - xl1).norm() < 1e-12);
                assert!((state.xloc[[XE, 0]] - xu1).norm() < 1e-12);
                assert!((state.xloc[[XLOW, 0]] - xu0).norm() < 1e-12);
            }
        }
    }
}
