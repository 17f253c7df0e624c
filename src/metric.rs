use crate::errors::ClaimBoostError;
use crate::utils::items_to_strings;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub type MetricFn = fn(&[f64], &[f64], &[f64]) -> f64;

/// Compare to metric values, determining if b is better.
/// If one of them is NaN favor the non NaN value.
/// If both are NaN, consider the first value to be better.
pub fn is_comparison_better(value: f64, comparison: f64, maximize: bool) -> bool {
    match (value.is_nan(), comparison.is_nan()) {
        (true, true) | (false, true) => false,
        (true, false) => true,
        (false, false) => {
            if maximize {
                value < comparison
            } else {
                value > comparison
            }
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub enum Metric {
    PoissonDeviance,
    RootMeanSquaredError,
}

impl FromStr for Metric {
    type Err = ClaimBoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PoissonDeviance" => Ok(Metric::PoissonDeviance),
            "RootMeanSquaredError" => Ok(Metric::RootMeanSquaredError),
            _ => Err(ClaimBoostError::ParseString(
                s.to_string(),
                "Metric".to_string(),
                items_to_strings(vec!["PoissonDeviance", "RootMeanSquaredError"]),
            )),
        }
    }
}

pub fn metric_callables(metric_type: &Metric) -> (MetricFn, bool) {
    match metric_type {
        Metric::PoissonDeviance => (PoissonDevianceMetric::calculate_metric, PoissonDevianceMetric::maximize()),
        Metric::RootMeanSquaredError => (
            RootMeanSquaredErrorMetric::calculate_metric,
            RootMeanSquaredErrorMetric::maximize(),
        ),
    }
}

pub trait EvaluationMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64], sample_weight: &[f64]) -> f64;
    fn maximize() -> bool;
}

pub struct PoissonDevianceMetric {}
impl EvaluationMetric for PoissonDevianceMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64], sample_weight: &[f64]) -> f64 {
        poisson_deviance(y, yhat, sample_weight)
    }
    fn maximize() -> bool {
        false
    }
}

pub struct RootMeanSquaredErrorMetric {}
impl EvaluationMetric for RootMeanSquaredErrorMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64], sample_weight: &[f64]) -> f64 {
        root_mean_squared_error(y, yhat, sample_weight)
    }
    fn maximize() -> bool {
        false
    }
}

/// Poisson unit deviance of a single observation.
/// `yhat` is the expected count, so it already carries the exposure.
#[inline]
pub fn poisson_unit_deviance(y: f64, yhat: f64) -> f64 {
    if y > 0.0 {
        2.0 * (y * (y / yhat).ln() - (y - yhat))
    } else {
        2.0 * yhat
    }
}

/// Weighted mean Poisson deviance.
pub fn poisson_deviance(y: &[f64], yhat: &[f64], sample_weight: &[f64]) -> f64 {
    let mut w_sum = 0.;
    let res = y
        .iter()
        .zip(yhat)
        .zip(sample_weight)
        .map(|((y_, yhat_), w_)| {
            w_sum += *w_;
            poisson_unit_deviance(*y_, *yhat_) * *w_
        })
        .sum::<f64>();
    res / w_sum
}

pub fn root_mean_squared_error(y: &[f64], yhat: &[f64], sample_weight: &[f64]) -> f64 {
    let mut w_sum = 0.;
    let res = y
        .iter()
        .zip(yhat)
        .zip(sample_weight)
        .map(|((y_, yhat_), w_)| {
            w_sum += *w_;
            (y_ - yhat_).powi(2) * *w_
        })
        .sum::<f64>();
    (res / w_sum).sqrt()
}
