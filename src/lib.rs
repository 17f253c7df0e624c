mod splitter;

// Modules
pub mod booster;
pub mod constants;
pub mod data;
pub mod errors;
pub mod learner;
pub mod metric;
pub mod node;
pub mod simulation;
pub mod tree;
pub mod utils;

// Individual classes, and functions
pub use booster::FrequencyBooster;
pub use data::{ClaimsData, Matrix};
pub use errors::ClaimBoostError;
pub use learner::{ConstantLearner, FittedLearner, WeakLearner};
pub use tree::{PoissonTree, PoissonTreeLearner};
