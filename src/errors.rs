//! Errors
//!
//! Custom error types used throughout the `claimboost` crate.
use thiserror::Error;

/// Errors that can occur while fitting or applying a frequency booster.
#[derive(Debug, Error)]
pub enum ClaimBoostError {
    /// Total count or total exposure is zero, the log-scale intercept is undefined.
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),
    /// A weak learner returned a non-positive or non-finite multiplicative prediction.
    #[error("Weak learner predicted {1} for row {0}, a strictly positive finite value is required.")]
    InvalidPrediction(usize, f64),
    /// Prediction was requested before any boosting round completed.
    #[error("The booster has no fitted rounds, call `run_round` or `fit` first.")]
    UnfittedModel,
    /// A boosting round was requested before the score was initialized.
    #[error("The booster score is not initialized, call `init` first.")]
    NotInitialized,
    /// First value is what was measured, second is expected, third is what was found.
    #[error("Length mismatch for {0}: expected {1} but found {2}.")]
    LengthMismatch(String, usize, usize),
    /// The dataset failed validation.
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// Unable to write model to file.
    #[error("Unable to write model to file: {0}")]
    UnableToWrite(String),
    /// Unable to read model from file.
    #[error("Unable to read model from a file {0}")]
    UnableToRead(String),
}
