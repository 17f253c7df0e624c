use crate::errors::ClaimBoostError;

/// Create a string of all available items.
pub fn items_to_strings(items: Vec<&str>) -> String {
    let mut s = String::new();
    for i in items {
        s.push_str(i);
        s.push_str(&String::from(", "));
    }
    s
}

// Validation
pub fn validate_positive_float_parameter(value: f64, parameter: &str) -> Result<(), ClaimBoostError> {
    validate_float_parameter(value, 0.0, f64::INFINITY, parameter)
}

pub fn validate_float_parameter(value: f64, min: f64, max: f64, parameter: &str) -> Result<(), ClaimBoostError> {
    if value.is_nan() || value < min || max < value {
        let ex_msg = format!("real value within range {} and {}", min, max);
        Err(ClaimBoostError::InvalidParameter(
            parameter.to_string(),
            ex_msg,
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_positive_usize_parameter(value: usize, parameter: &str) -> Result<(), ClaimBoostError> {
    if value == 0 {
        Err(ClaimBoostError::InvalidParameter(
            parameter.to_string(),
            "integer greater than 0".to_string(),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

#[inline]
pub fn is_missing(value: &f64) -> bool {
    value.is_nan()
}

/// Whether `value` is a usable categorical code, a non-negative integer.
#[inline]
pub fn is_category_code(value: &f64) -> bool {
    value.is_finite() && *value >= 0.0 && value.fract() == 0.0
}

const LANES: usize = 16;

/// Fast summation, accumulating in independent lanes so the
/// compiler can vectorize the inner loop.
#[inline]
pub fn fast_sum(values: &[f64]) -> f64 {
    let chunks = values.chunks_exact(LANES);
    let remainder = chunks.remainder();

    let sum = chunks.fold([0.0_f64; LANES], |mut acc, chunk| {
        for (a, c) in acc.iter_mut().zip(chunk) {
            *a += *c;
        }
        acc
    });

    let remainder: f64 = remainder.iter().copied().sum();
    sum.iter().sum::<f64>() + remainder
}

pub fn naive_sum(values: &[f64]) -> f64 {
    values.iter().copied().sum()
}

/// Poisson log-likelihood kernel of a node with count sum `y` and offset sum `e`,
/// evaluated at the node MLE rate `y / e`. Constant terms are dropped.
#[inline]
pub fn poisson_node_loglik(y: f64, e: f64) -> f64 {
    if y <= 0.0 || e <= 0.0 {
        0.0
    } else {
        y * (y / e).ln()
    }
}
