//! Gaussian hidden Markov model: fitting, decoding and scoring.
//!
//! Observations are standardized per column before fitting. Emissions are
//! diagonal Gaussians; EM runs in log space and keeps the best-likelihood
//! parameters it has seen.

pub mod algorithms;
pub mod gaussian;
pub mod kmeans;
pub mod model;

pub use gaussian::DiagGaussian;
pub use model::{FitReport, HmmParams, RegimeModel, Standardizer, StateSequence};

use thiserror::Error;

/// Errors from fitting or applying a [`RegimeModel`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelFitError {
    #[error("too few observations: {rows} rows for {states} states")]
    TooFewObservations { rows: usize, states: usize },

    #[error("feature '{feature}' has zero variance")]
    ZeroVariance { feature: String },

    #[error("observations contain NaN or infinite values")]
    NonFiniteInput,

    #[error("unsupported number of states: {0} (expected 2 or 3)")]
    InvalidStateCount(usize),

    #[error("log-likelihood became non-finite at EM iteration {iteration}")]
    NumericalFailure { iteration: usize },

    #[error("observation width mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
