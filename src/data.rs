use crate::constants::INTEGRAL_TOLERANCE;
use crate::errors::ClaimBoostError;
use crate::utils::fast_sum;

/// Contiguous Column Major Matrix data container.
///
/// Holds a dense matrix of feature values in a single contiguous memory block,
/// in column-major order, so that each feature column is a contiguous slice.
/// Categorical covariates are stored as non-negative integer codes,
/// missing values are `NaN`.
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Indices into the data row-wise.
    pub index: Vec<usize>,
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
    stride1: usize,
    stride2: usize,
}

impl<'a, T> Matrix<'a, T> {
    // Defaults to column major
    /// Create a new Matrix.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix {
            data,
            index: (0..rows).collect(),
            rows,
            cols,
            stride1: rows,
            stride2: 1,
        }
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - the jth column of the data to get.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[self.item_index(i, j)]
    }

    fn item_index(&self, i: usize, j: usize) -> usize {
        let mut idx = self.stride2 * i;
        idx += j * self.stride1;
        idx
    }

    /// Get access to a row of the data, as an iterator.
    pub fn get_row_iter(&self, row: usize) -> std::iter::StepBy<std::iter::Skip<std::slice::Iter<'a, T>>> {
        self.data.iter().skip(row).step_by(self.rows)
    }

    /// Get an entire column in the matrix.
    ///
    /// * `col` - The index of the column to get.
    pub fn get_col(&self, col: usize) -> &[T] {
        let i = self.item_index(0, col);
        let j = self.item_index(self.rows, col);
        &self.data[i..j]
    }
}

impl<'a, T> Matrix<'a, T>
where
    T: Copy,
{
    /// Get a row of the data as a vector.
    pub fn get_row(&self, row: usize) -> Vec<T> {
        self.get_row_iter(row).copied().collect()
    }
}

/// A claims dataset: features, exposure (time at risk) and observed claim counts.
///
/// The dataset is a read-only view, it is shared by every boosting round
/// and never mutated.
pub struct ClaimsData<'a> {
    /// Feature matrix, one row per observation.
    pub features: Matrix<'a, f64>,
    /// Exposure of every observation, finite and non-negative.
    pub exposure: &'a [f64],
    /// Observed claim counts, non-negative integers stored as floats.
    pub counts: &'a [f64],
}

impl<'a> ClaimsData<'a> {
    /// Build a dataset, validating it.
    ///
    /// * `features` - Feature matrix, one row per observation.
    /// * `exposure` - Exposure per observation, must be finite and `>= 0`.
    /// * `counts` - Claim count per observation, must be a non-negative integer,
    ///   and zero where the exposure is zero.
    pub fn new(features: Matrix<'a, f64>, exposure: &'a [f64], counts: &'a [f64]) -> Result<Self, ClaimBoostError> {
        if features.data.len() != features.rows * features.cols {
            return Err(ClaimBoostError::LengthMismatch(
                "feature data".to_string(),
                features.rows * features.cols,
                features.data.len(),
            ));
        }
        if exposure.len() != features.rows {
            return Err(ClaimBoostError::LengthMismatch(
                "exposure".to_string(),
                features.rows,
                exposure.len(),
            ));
        }
        if counts.len() != features.rows {
            return Err(ClaimBoostError::LengthMismatch(
                "counts".to_string(),
                features.rows,
                counts.len(),
            ));
        }
        if let Some((i, e)) = exposure.iter().enumerate().find(|(_, e)| !e.is_finite() || **e < 0.0) {
            return Err(ClaimBoostError::InvalidData(format!(
                "exposure of row {} is {}, exposures must be finite and non-negative",
                i, e
            )));
        }
        if let Some((i, y)) = counts
            .iter()
            .enumerate()
            .find(|(_, y)| !y.is_finite() || **y < 0.0 || (**y - y.round()).abs() > INTEGRAL_TOLERANCE)
        {
            return Err(ClaimBoostError::InvalidData(format!(
                "count of row {} is {}, counts must be non-negative integers",
                i, y
            )));
        }
        if let Some(i) = (0..counts.len()).find(|i| exposure[*i] == 0.0 && counts[*i] > 0.0) {
            return Err(ClaimBoostError::InvalidData(format!(
                "row {} has {} claims with zero exposure",
                i, counts[i]
            )));
        }
        Ok(ClaimsData {
            features,
            exposure,
            counts,
        })
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.features.rows
    }

    pub fn is_empty(&self) -> bool {
        self.features.rows == 0
    }

    pub fn total_count(&self) -> f64 {
        fast_sum(self.counts)
    }

    pub fn total_exposure(&self) -> f64 {
        fast_sum(self.exposure)
    }
}
