// src/error.rs

use thiserror::Error;

/// All failures surfaced by this crate. These are deterministic validation
/// or precondition failures, raised eagerly before any partial computation.
#[derive(Debug, Error)]
pub enum TaxdivError {
    /// Caller supplied an invalid or contradictory option combination.
    #[error("configuration error: {0}")]
    Config(String),

    /// Fetched data is in a state incompatible with the requested metric
    /// (e.g. normalized abundances where raw counts are required).
    #[error("data state error: {0}")]
    DataState(String),

    /// A tree handed to the phylogenetic distance routines violates the
    /// single-child-root requirement.
    #[error("invalid tree: {0}")]
    InvalidTree(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TaxdivError>;
