use thiserror::Error;

/// Classification of an iteration-budget failure. The reduced interface
/// system being diagonally dominant guarantees convergence of the
/// relaxation-type strategies, so exceeding the budget on a dominant
/// system means the budget was simply set too low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetFailure {
    /// Reduced system diagonally dominant: convergence was guaranteed,
    /// the configured maximum iteration count is too small.
    BudgetTooLow,
    /// Reduced system not diagonally dominant: convergence was never
    /// guaranteed; a different strategy or more levels may help.
    NotGuaranteed,
}

#[derive(Error, Debug)]
pub enum LaplaceError {
    #[error("Singular local block on rank {rank}, mode {mode}: zero pivot at row {row}")]
    SingularLocalBlock { rank: usize, mode: usize, row: usize },

    #[error(
        "Not converged within maxits={maxits} on rank {rank} ({classification:?}): {message}"
    )]
    IterationBudgetExceeded {
        rank: usize,
        maxits: usize,
        classification: BudgetFailure,
        message: String,
    },

    #[error("Reduced-system breakdown on rank {rank}, mode {mode}: singular 2x2 pivot")]
    ReducedBreakdown { rank: usize, mode: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Communication error on rank {rank}: {message}")]
    CommError { rank: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LaplaceResult<T> = Result<T, LaplaceError>;
