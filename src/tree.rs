use crate::constants::{
    DEFAULT_COMPLEXITY, DEFAULT_MAX_DEPTH, DEFAULT_MIN_LEAF_SIZE, DEFAULT_SHRINKAGE, MIN_SPLIT_GAIN,
};
use crate::data::Matrix;
use crate::errors::ClaimBoostError;
use crate::learner::{FittedLearner, WeakLearner};
use crate::node::{Node, SplittableNode};
use crate::splitter::{find_best_split, NodeStats, SplitInfo};
use crate::utils::{validate_float_parameter, validate_positive_float_parameter, validate_positive_usize_parameter};
use hashbrown::HashSet;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BinaryHeap;
use std::fmt::{self, Display};

/// Poisson regression tree with an offset.
///
/// Leaves hold multiplicative rates relative to the offset, shrunk towards
/// the root rate by a gamma prior.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PoissonTree {
    pub nodes: Vec<Node>,
    pub depth: usize,
    pub n_leaves: usize,
}

/// Rate estimator for the leaves of a tree, a gamma prior centered on the root rate.
#[derive(Debug, Clone, Copy)]
struct LeafRate {
    alpha: f64,
    beta: f64,
}

impl LeafRate {
    /// * `shrinkage` - Coefficient of variation of the prior, 0 disables it.
    /// * `root_rate` - Count sum over offset sum of the whole sample.
    fn new(shrinkage: f64, root_rate: f64) -> Self {
        if shrinkage > 0.0 {
            let alpha = 1.0 / (shrinkage * shrinkage);
            LeafRate {
                alpha,
                beta: alpha / root_rate,
            }
        } else {
            LeafRate { alpha: 0.0, beta: 0.0 }
        }
    }

    fn rate(&self, count: f64, offset: f64, fallback: f64) -> f64 {
        let denominator = self.beta + offset;
        if denominator > 0.0 {
            (self.alpha + count) / denominator
        } else {
            fallback
        }
    }
}

/// Weak learner growing a [`PoissonTree`] every round.
#[derive(Debug, Clone)]
pub struct PoissonTreeLearner {
    /// Maximum depth of a tree, the root has depth 0.
    pub max_depth: usize,
    /// Minimum number of rows in a leaf.
    pub min_leaf_size: usize,
    /// A split is only kept when its deviance reduction exceeds
    /// `complexity` times the deviance of the root.
    pub complexity: f64,
    /// Coefficient of variation of the gamma prior on leaf rates.
    pub shrinkage: f64,
    /// Columns holding categorical codes.
    pub categorical_features: HashSet<usize>,
}

impl Default for PoissonTreeLearner {
    fn default() -> Self {
        PoissonTreeLearner {
            max_depth: DEFAULT_MAX_DEPTH,
            min_leaf_size: DEFAULT_MIN_LEAF_SIZE,
            complexity: DEFAULT_COMPLEXITY,
            shrinkage: DEFAULT_SHRINKAGE,
            categorical_features: HashSet::new(),
        }
    }
}

impl PoissonTreeLearner {
    pub fn validate_parameters(&self) -> Result<(), ClaimBoostError> {
        validate_positive_usize_parameter(self.max_depth, "max_depth")?;
        validate_positive_usize_parameter(self.min_leaf_size, "min_leaf_size")?;
        validate_float_parameter(self.complexity, 0.0, 1.0, "complexity")?;
        validate_positive_float_parameter(self.shrinkage, "shrinkage")?;
        Ok(())
    }

    // Set methods for parameters

    /// Set the maximum depth of the trees.
    pub fn set_max_depth(mut self, max_depth: usize) -> Result<Self, ClaimBoostError> {
        validate_positive_usize_parameter(max_depth, "max_depth")?;
        self.max_depth = max_depth;
        Ok(self)
    }

    /// Set the minimum number of rows in each leaf.
    pub fn set_min_leaf_size(mut self, min_leaf_size: usize) -> Result<Self, ClaimBoostError> {
        validate_positive_usize_parameter(min_leaf_size, "min_leaf_size")?;
        self.min_leaf_size = min_leaf_size;
        Ok(self)
    }

    /// Set the complexity threshold, a value in `[0, 1]`.
    pub fn set_complexity(mut self, complexity: f64) -> Result<Self, ClaimBoostError> {
        validate_float_parameter(complexity, 0.0, 1.0, "complexity")?;
        self.complexity = complexity;
        Ok(self)
    }

    /// Set the coefficient of variation of the leaf rate prior.
    pub fn set_shrinkage(mut self, shrinkage: f64) -> Result<Self, ClaimBoostError> {
        validate_positive_float_parameter(shrinkage, "shrinkage")?;
        self.shrinkage = shrinkage;
        Ok(self)
    }

    /// Set the columns that hold categorical codes.
    pub fn set_categorical_features(mut self, categorical_features: HashSet<usize>) -> Self {
        self.categorical_features = categorical_features;
        self
    }
}

impl PoissonTreeLearner {
    /// Categorical columns must exist and hold integer codes.
    /// Missing and negative codes are allowed and are routed as missing.
    fn validate_categorical_codes(&self, data: &Matrix<f64>) -> Result<(), ClaimBoostError> {
        for feature in &self.categorical_features {
            if *feature >= data.cols {
                return Err(ClaimBoostError::InvalidParameter(
                    "categorical_features".to_string(),
                    format!("column index below {}", data.cols),
                    feature.to_string(),
                ));
            }
            let col = data.get_col(*feature);
            if let Some((i, v)) = col
                .iter()
                .enumerate()
                .find(|(_, v)| v.is_finite() && **v >= 0.0 && v.fract() != 0.0)
            {
                return Err(ClaimBoostError::InvalidData(format!(
                    "categorical column {} has non-integer code {} in row {}",
                    feature, v, i
                )));
            }
        }
        Ok(())
    }
}

impl WeakLearner for PoissonTreeLearner {
    type Model = PoissonTree;

    fn fit(&self, data: &Matrix<f64>, y: &[f64], offset: &[f64]) -> Result<PoissonTree, ClaimBoostError> {
        self.validate_parameters()?;
        if y.len() != data.rows {
            return Err(ClaimBoostError::LengthMismatch("counts".to_string(), data.rows, y.len()));
        }
        if offset.len() != data.rows {
            return Err(ClaimBoostError::LengthMismatch(
                "offset".to_string(),
                data.rows,
                offset.len(),
            ));
        }
        self.validate_categorical_codes(data)?;
        let mut tree = PoissonTree::new();
        tree.fit(data, data.index.to_owned(), y, offset, self)?;
        debug!(
            "fitted tree with {} leaves and depth {}",
            tree.n_leaves, tree.depth
        );
        Ok(tree)
    }
}

impl FittedLearner for PoissonTree {
    fn predict(&self, data: &Matrix<f64>, parallel: bool) -> Vec<f64> {
        PoissonTree::predict(self, data, parallel)
    }
}

impl Default for PoissonTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PoissonTree {
    pub fn new() -> Self {
        PoissonTree {
            nodes: Vec::new(),
            depth: 0,
            n_leaves: 0,
        }
    }

    /// Grow the tree best-first, always splitting the growable node with the
    /// largest deviance reduction.
    pub fn fit(
        &mut self,
        data: &Matrix<f64>,
        mut index: Vec<usize>,
        y: &[f64],
        offset: &[f64],
        params: &PoissonTreeLearner,
    ) -> Result<(), ClaimBoostError> {
        let root = NodeStats::from_index(&index, y, offset);
        if root.offset <= 0.0 {
            return Err(ClaimBoostError::DegenerateInput(
                "total working offset is zero".to_string(),
            ));
        }
        if root.count <= 0.0 {
            return Err(ClaimBoostError::DegenerateInput("total count is zero".to_string()));
        }
        let root_rate = root.count / root.offset;
        let leaf_rate = LeafRate::new(params.shrinkage, root_rate);

        // Deviance of the intercept-only fit, the scale for the complexity threshold.
        let root_deviance = 2.0
            * index
                .iter()
                .filter(|i| y[**i] > 0.0 && offset[**i] > 0.0)
                .map(|i| y[*i] * (y[*i] / (offset[*i] * root_rate)).ln())
                .sum::<f64>();
        let min_gain = f64::max(params.complexity * root_deviance, MIN_SPLIT_GAIN);

        self.nodes = vec![Node::new_leaf(
            0,
            0,
            leaf_rate.rate(root.count, root.offset, root_rate),
            root.count,
            root.offset,
            root.rows,
        )];
        self.depth = 0;
        self.n_leaves = 1;

        let mut growable = BinaryHeap::<SplittableNode>::new();
        if let Some(node) = self.splittable(data, &index, y, offset, params, 0, 0, index.len()) {
            growable.push(node);
        }

        while let Some(node) = growable.pop() {
            if node.split_info.split_gain <= min_gain {
                // Everything left in the heap has a smaller gain.
                break;
            }
            let split_idx = partition(data, &mut index[node.start_idx..node.stop_idx], &node.split_info);
            let mid = node.start_idx + split_idx;
            let depth = node.depth + 1;

            let left_num = self.nodes.len();
            let right_num = left_num + 1;
            let info = node.split_info;
            self.nodes.push(Node::new_leaf(
                left_num,
                depth,
                leaf_rate.rate(info.left_count, info.left_offset, root_rate),
                info.left_count,
                info.left_offset,
                info.left_rows,
            ));
            self.nodes.push(Node::new_leaf(
                right_num,
                depth,
                leaf_rate.rate(info.right_count, info.right_offset, root_rate),
                info.right_count,
                info.right_offset,
                info.right_rows,
            ));
            self.nodes[node.num].make_parent_node(info, left_num, right_num);
            self.n_leaves += 1;
            self.depth = usize::max(self.depth, depth);

            for (num, start, stop) in [(left_num, node.start_idx, mid), (right_num, mid, node.stop_idx)] {
                if let Some(child) = self.splittable(data, &index, y, offset, params, num, start, stop) {
                    growable.push(child);
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn splittable(
        &self,
        data: &Matrix<f64>,
        index: &[usize],
        y: &[f64],
        offset: &[f64],
        params: &PoissonTreeLearner,
        num: usize,
        start_idx: usize,
        stop_idx: usize,
    ) -> Option<SplittableNode> {
        let depth = self.nodes[num].depth;
        if depth >= params.max_depth {
            return None;
        }
        find_best_split(
            data,
            &index[start_idx..stop_idx],
            y,
            offset,
            &params.categorical_features,
            params.min_leaf_size,
        )
        .map(|split_info| SplittableNode {
            num,
            depth,
            start_idx,
            stop_idx,
            split_info,
        })
    }

    fn predict_row(&self, data: &Matrix<f64>, row: usize) -> f64 {
        let mut node_idx = 0;
        loop {
            let node = &self.nodes[node_idx];
            if node.is_leaf {
                return node.rate;
            } else {
                node_idx = node.get_child_idx(data.get(row, node.split_feature));
            }
        }
    }

    /// Multiplicative predictions for every row of `data`.
    ///
    /// * `data` - Feature matrix.
    /// * `parallel` - Predict in parallel.
    pub fn predict(&self, data: &Matrix<f64>, parallel: bool) -> Vec<f64> {
        if parallel {
            data.index.par_iter().map(|i| self.predict_row(data, *i)).collect()
        } else {
            data.index.iter().map(|i| self.predict_row(data, *i)).collect()
        }
    }
}

/// Reorder `index` so rows going left come first, returning the number of left rows.
fn partition(data: &Matrix<f64>, index: &mut [usize], split_info: &SplitInfo) -> usize {
    let col = data.get_col(split_info.split_feature);
    let probe = Node {
        split_feature: split_info.split_feature,
        split_value: split_info.split_value,
        missing_left: split_info.missing_left,
        left_cats: split_info.left_cats.clone(),
        left_child: 0,
        right_child: 1,
        is_leaf: false,
        ..Node::new_leaf(0, 0, 0.0, 0.0, 0.0, 0)
    };
    let (left, right): (Vec<usize>, Vec<usize>) = index.iter().partition(|i| probe.get_child_idx(&col[**i]) == 0);
    let n_left = left.len();
    for (slot, i) in index.iter_mut().zip(left.into_iter().chain(right)) {
        *slot = i;
    }
    n_left
}

impl Display for PoissonTree {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut print_buffer: Vec<usize> = vec![0];
        let mut r = String::new();
        while let Some(idx) = print_buffer.pop() {
            let Some(node) = self.nodes.get(idx) else {
                continue;
            };
            r += format!("{}{}\n", "      ".repeat(node.depth).as_str(), node).as_str();
            if !node.is_leaf {
                print_buffer.push(node.right_child);
                print_buffer.push(node.left_child);
            }
        }
        write!(f, "{}", r)
    }
}
