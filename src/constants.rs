pub const DEFAULT_MAX_DEPTH: usize = 3;
pub const DEFAULT_MIN_LEAF_SIZE: usize = 10;
pub const DEFAULT_COMPLEXITY: f64 = 0.0;
pub const DEFAULT_SHRINKAGE: f64 = 1.0;
pub const DEFAULT_LOG_ITERATIONS: usize = 0;
/// Relative tolerance used when checking that counts are integral.
pub const INTEGRAL_TOLERANCE: f64 = 1e-9;
/// Splits with a smaller deviance reduction are treated as noise.
pub const MIN_SPLIT_GAIN: f64 = 1e-10;
