//! Weak learner capability
//!
//! The booster only needs two things from a weak learner:
//! fitting on `(features, counts, offset)` under a Poisson loss with the
//! offset as the log-link baseline, and producing one non-negative
//! multiplicative prediction per row.
use crate::data::Matrix;
use crate::errors::ClaimBoostError;
use crate::utils::fast_sum;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A fitted weak learner.
pub trait FittedLearner {
    /// Multiplicative predictions, one non-negative value per row of `data`.
    ///
    /// * `data` - Feature matrix to predict on.
    /// * `parallel` - Predict in parallel.
    fn predict(&self, data: &Matrix<f64>, parallel: bool) -> Vec<f64>;
}

/// A weak learner factory, fitting a new model every boosting round.
pub trait WeakLearner {
    type Model: FittedLearner;

    /// Fit a model that allocates deviation of `y` from the working exposure `offset`.
    ///
    /// * `data` - Feature matrix.
    /// * `y` - Claim counts.
    /// * `offset` - Working exposure, non-negative. Zero offsets must be accepted.
    fn fit(&self, data: &Matrix<f64>, y: &[f64], offset: &[f64]) -> Result<Self::Model, ClaimBoostError>;
}

/// Intercept-only learner, the Poisson MLE of a single multiplier
/// `sum(y) / sum(offset)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantLearner;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ConstantModel {
    pub multiplier: f64,
}

impl WeakLearner for ConstantLearner {
    type Model = ConstantModel;

    fn fit(&self, data: &Matrix<f64>, y: &[f64], offset: &[f64]) -> Result<ConstantModel, ClaimBoostError> {
        if y.len() != data.rows || offset.len() != data.rows {
            return Err(ClaimBoostError::LengthMismatch(
                "counts and offset".to_string(),
                data.rows,
                if y.len() != data.rows { y.len() } else { offset.len() },
            ));
        }
        let offset_total = fast_sum(offset);
        if offset_total <= 0.0 {
            return Err(ClaimBoostError::DegenerateInput(
                "total working offset is zero".to_string(),
            ));
        }
        Ok(ConstantModel {
            multiplier: fast_sum(y) / offset_total,
        })
    }
}

impl FittedLearner for ConstantModel {
    fn predict(&self, data: &Matrix<f64>, parallel: bool) -> Vec<f64> {
        if parallel {
            (0..data.rows).into_par_iter().map(|_| self.multiplier).collect()
        } else {
            vec![self.multiplier; data.rows]
        }
    }
}
