// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — X Partition
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Deterministic 1-D domain partition along x.
//!
//! Every rank owns a contiguous run of interior points plus `bndry_width`
//! rows on each side: physical boundary rows on the outermost ranks, guard
//! rows mirroring the neighbour's edge everywhere else.

use laplace_types::error::{LaplaceError, LaplaceResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XSlice {
    pub rank: usize,
    pub nranks: usize,
    /// Total interior points across all ranks.
    pub global_interior: usize,
    /// Interior points owned by this rank.
    pub local_interior: usize,
    /// Boundary/guard rows on each side.
    pub bndry_width: usize,
    /// First interior row in local indexing.
    pub xs: usize,
    /// Last interior row in local indexing.
    pub xe: usize,
    /// Local row count including both boundary/guard bands.
    pub ncx: usize,
    /// Global index of the first interior point.
    pub interior_start: usize,
}

impl XSlice {
    pub fn first_x(&self) -> bool {
        self.rank == 0
    }

    pub fn last_x(&self) -> bool {
        self.rank + 1 == self.nranks
    }

    /// Rank of the inward (lower-x) neighbour, if any.
    pub fn proc_in(&self) -> Option<usize> {
        if self.first_x() {
            None
        } else {
            Some(self.rank - 1)
        }
    }

    /// Rank of the outward (upper-x) neighbour, if any.
    pub fn proc_out(&self) -> Option<usize> {
        if self.last_x() {
            None
        } else {
            Some(self.rank + 1)
        }
    }
}

/// Split `n` items across `k` buckets as evenly as possible.
fn balanced_split(n: usize, k: usize) -> Vec<usize> {
    let base = n / k;
    let rem = n % k;
    (0..k).map(|i| base + usize::from(i < rem)).collect()
}

/// Decompose `global_interior` x-points across `nranks` ranks.
pub fn decompose_x(
    global_interior: usize,
    nranks: usize,
    bndry_width: usize,
) -> LaplaceResult<Vec<XSlice>> {
    if nranks < 1 {
        return Err(LaplaceError::ConfigError(
            "x decomposition requires nranks >= 1".to_string(),
        ));
    }
    if bndry_width < 1 {
        return Err(LaplaceError::ConfigError(
            "Boundary width must be >= 1".to_string(),
        ));
    }
    if global_interior < nranks {
        return Err(LaplaceError::ConfigError(format!(
            "Cannot split {global_interior} interior points across {nranks} ranks"
        )));
    }

    let splits = balanced_split(global_interior, nranks);
    let mut out = Vec::with_capacity(nranks);
    let mut cursor = 0usize;
    for (rank, &local_interior) in splits.iter().enumerate() {
        let xs = bndry_width;
        let xe = xs + local_interior - 1;
        out.push(XSlice {
            rank,
            nranks,
            global_interior,
            local_interior,
            bndry_width,
            xs,
            xe,
            ncx: local_interior + 2 * bndry_width,
            interior_start: cursor,
        });
        cursor += local_interior;
    }
    Ok(out)
}
