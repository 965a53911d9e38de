// ─────────────────────────────────────────────────────────────────────
// SCPN Laplace Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::error::{LaplaceError, LaplaceResult};

/// Which reduced-system strategy the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Jacobi-style relaxation on the interface system with
    /// nearest-neighbour exchange.
    Relaxation,
    /// Multilevel coarsening across ranks (V-cycle over interfaces).
    Multigrid,
    /// Parallel cyclic reduction: direct, fixed number of rounds.
    CyclicReduction,
}

/// Solver configuration. Maps 1:1 to the JSON solver block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Relative tolerance on interface values (default: 1e-7)
    #[serde(default = "default_rtol")]
    pub rtol: f64,
    /// Absolute tolerance on interface values (default: 1e-20)
    #[serde(default = "default_atol")]
    pub atol: f64,
    /// Maximum relaxation iterations / V-cycles (default: 100)
    #[serde(default = "default_maxits")]
    pub maxits: usize,
    /// Maximum number of coarse levels in the multigrid chain (default: 10)
    #[serde(default = "default_max_levels")]
    pub max_levels: usize,
    /// Relaxation sweeps per level in a V-cycle (default: 2)
    #[serde(default = "default_sweeps_per_level")]
    pub sweeps_per_level: usize,
    /// Reduced-system strategy (default: multigrid)
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,
    /// Skip convergence checks until the predicted exit cycle (default: true)
    #[serde(default = "default_predict_convergence")]
    pub predict_convergence: bool,
    /// Use the previous call's solution as the initial guess (default: false)
    #[serde(default)]
    pub reuse_solution: bool,
}

fn default_rtol() -> f64 {
    1e-7
}
fn default_atol() -> f64 {
    1e-20
}
fn default_maxits() -> usize {
    100
}
fn default_max_levels() -> usize {
    10
}
fn default_sweeps_per_level() -> usize {
    2
}
fn default_strategy() -> Strategy {
    Strategy::Multigrid
}
fn default_predict_convergence() -> bool {
    true
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            rtol: default_rtol(),
            atol: default_atol(),
            maxits: default_maxits(),
            max_levels: default_max_levels(),
            sweeps_per_level: default_sweeps_per_level(),
            strategy: default_strategy(),
            predict_convergence: default_predict_convergence(),
            reuse_solution: false,
        }
    }
}

impl SolverConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &str) -> LaplaceResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent settings at construction time, not at solve time.
    pub fn validate(&self) -> LaplaceResult<()> {
        if !self.rtol.is_finite() || self.rtol <= 0.0 {
            return Err(LaplaceError::ConfigError(format!(
                "rtol must be finite > 0, got {}",
                self.rtol
            )));
        }
        if !self.atol.is_finite() || self.atol < 0.0 {
            return Err(LaplaceError::ConfigError(format!(
                "atol must be finite >= 0, got {}",
                self.atol
            )));
        }
        if self.maxits == 0 {
            return Err(LaplaceError::ConfigError(
                "maxits must be >= 1".to_string(),
            ));
        }
        if self.sweeps_per_level == 0 {
            return Err(LaplaceError::ConfigError(
                "sweeps_per_level must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Post-processing flags applied to the spectral solution after
/// reconstruction, before the caller's inverse transform.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PostprocessFlags {
    /// Zero the DC (kz = 0) mode entirely.
    #[serde(default)]
    pub zero_dc: bool,
    /// Subtract the interior mean from the kz = 0 mode.
    #[serde(default)]
    pub subtract_mean_kx0: bool,
}
