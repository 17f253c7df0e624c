use crate::data::Matrix;
use crate::utils::{is_category_code, is_missing, poisson_node_loglik};
use hashbrown::{HashMap, HashSet};

/// Best split found for a node.
#[derive(Debug, Clone)]
pub struct SplitInfo {
    pub split_feature: usize,
    /// Threshold for numeric splits, `NaN` for categorical ones.
    pub split_value: f64,
    /// Poisson deviance reduction of the split.
    pub split_gain: f64,
    pub missing_left: bool,
    pub left_cats: HashSet<usize>,
    pub left_count: f64,
    pub left_offset: f64,
    pub left_rows: usize,
    pub right_count: f64,
    pub right_offset: f64,
    pub right_rows: usize,
}

/// Count, offset and row totals of a set of rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeStats {
    pub count: f64,
    pub offset: f64,
    pub rows: usize,
}

impl NodeStats {
    pub fn from_index(index: &[usize], y: &[f64], offset: &[f64]) -> Self {
        index.iter().fold(NodeStats::default(), |acc, i| acc.add(y[*i], offset[*i], 1))
    }

    fn add(self, count: f64, offset: f64, rows: usize) -> Self {
        NodeStats {
            count: self.count + count,
            offset: self.offset + offset,
            rows: self.rows + rows,
        }
    }

    fn merge(self, other: NodeStats) -> Self {
        self.add(other.count, other.offset, other.rows)
    }

    fn minus(self, other: NodeStats) -> Self {
        NodeStats {
            count: self.count - other.count,
            offset: self.offset - other.offset,
            rows: self.rows - other.rows,
        }
    }

    fn loglik(&self) -> f64 {
        poisson_node_loglik(self.count, self.offset)
    }

    /// Empirical rate, used to order categories.
    fn rate(&self) -> f64 {
        if self.offset > 0.0 {
            self.count / self.offset
        } else if self.count > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

/// Gain of a candidate partition, missing rows are sent to the side with the larger offset.
/// Returns `None` when a side ends up with fewer than `min_leaf_size` rows.
fn evaluate_candidate(
    left: NodeStats,
    right: NodeStats,
    missing: NodeStats,
    parent_loglik: f64,
    min_leaf_size: usize,
) -> Option<(f64, bool, NodeStats, NodeStats)> {
    let missing_left = left.offset >= right.offset;
    let (left, right) = if missing_left {
        (left.merge(missing), right)
    } else {
        (left, right.merge(missing))
    };
    if left.rows < min_leaf_size || right.rows < min_leaf_size {
        return None;
    }
    let gain = 2.0 * (left.loglik() + right.loglik() - parent_loglik);
    Some((gain, missing_left, left, right))
}

/// Search every feature for the split with the largest Poisson deviance reduction.
///
/// * `data` - Feature matrix.
/// * `index` - Rows belonging to the node.
/// * `y` - Claim counts.
/// * `offset` - Working exposure.
/// * `cat_index` - Columns holding categorical codes.
/// * `min_leaf_size` - Minimum number of rows in each child.
pub fn find_best_split(
    data: &Matrix<f64>,
    index: &[usize],
    y: &[f64],
    offset: &[f64],
    cat_index: &HashSet<usize>,
    min_leaf_size: usize,
) -> Option<SplitInfo> {
    let parent = NodeStats::from_index(index, y, offset);
    if parent.offset <= 0.0 || parent.rows < 2 * min_leaf_size.max(1) {
        return None;
    }
    (0..data.cols)
        .filter_map(|feature| {
            if cat_index.contains(&feature) {
                best_categorical_split(data.get_col(feature), feature, index, y, offset, parent, min_leaf_size)
            } else {
                best_numeric_split(data.get_col(feature), feature, index, y, offset, parent, min_leaf_size)
            }
        })
        .max_by(|a, b| a.split_gain.total_cmp(&b.split_gain))
}

fn best_numeric_split(
    col: &[f64],
    feature: usize,
    index: &[usize],
    y: &[f64],
    offset: &[f64],
    parent: NodeStats,
    min_leaf_size: usize,
) -> Option<SplitInfo> {
    let mut present: Vec<(f64, f64, f64)> = index
        .iter()
        .filter(|i| !is_missing(&col[**i]))
        .map(|i| (col[*i], y[*i], offset[*i]))
        .collect();
    if present.len() < 2 {
        return None;
    }
    present.sort_by(|a, b| a.0.total_cmp(&b.0));

    let present_stats = present
        .iter()
        .fold(NodeStats::default(), |acc, (_, y_, e_)| acc.add(*y_, *e_, 1));
    let missing = parent.minus(present_stats);
    let parent_loglik = parent.loglik();

    let mut best: Option<SplitInfo> = None;
    let mut left = NodeStats::default();
    for k in 1..present.len() {
        let (v_prev, y_prev, e_prev) = present[k - 1];
        left = left.add(y_prev, e_prev, 1);
        let v = present[k].0;
        if v_prev >= v {
            continue;
        }
        let right = present_stats.minus(left);
        if let Some((gain, missing_left, l, r)) = evaluate_candidate(left, right, missing, parent_loglik, min_leaf_size)
        {
            if best.as_ref().map_or(true, |b| gain > b.split_gain) {
                best = Some(SplitInfo {
                    split_feature: feature,
                    split_value: v_prev + (v - v_prev) / 2.0,
                    split_gain: gain,
                    missing_left,
                    left_cats: HashSet::new(),
                    left_count: l.count,
                    left_offset: l.offset,
                    left_rows: l.rows,
                    right_count: r.count,
                    right_offset: r.offset,
                    right_rows: r.rows,
                });
            }
        }
    }
    best
}

fn best_categorical_split(
    col: &[f64],
    feature: usize,
    index: &[usize],
    y: &[f64],
    offset: &[f64],
    parent: NodeStats,
    min_leaf_size: usize,
) -> Option<SplitInfo> {
    let mut by_cat: HashMap<usize, NodeStats> = HashMap::new();
    for i in index {
        let v = col[*i];
        if !is_category_code(&v) {
            continue;
        }
        let stats = by_cat.entry(v as usize).or_default();
        *stats = stats.add(y[*i], offset[*i], 1);
    }
    if by_cat.len() < 2 {
        return None;
    }

    // Ordering categories by rate reduces the search to prefix splits.
    let mut cats: Vec<(usize, NodeStats)> = by_cat.into_iter().collect();
    cats.sort_by(|a, b| a.1.rate().total_cmp(&b.1.rate()).then(a.0.cmp(&b.0)));

    let present_stats = cats
        .iter()
        .fold(NodeStats::default(), |acc, (_, s)| acc.merge(*s));
    let missing = parent.minus(present_stats);
    let parent_loglik = parent.loglik();

    let mut best: Option<(usize, f64, bool, NodeStats, NodeStats)> = None;
    let mut left = NodeStats::default();
    for k in 1..cats.len() {
        left = left.merge(cats[k - 1].1);
        let right = present_stats.minus(left);
        if let Some((gain, missing_left, l, r)) = evaluate_candidate(left, right, missing, parent_loglik, min_leaf_size)
        {
            if best.as_ref().map_or(true, |b| gain > b.1) {
                best = Some((k, gain, missing_left, l, r));
            }
        }
    }

    best.map(|(k, gain, missing_left, l, r)| SplitInfo {
        split_feature: feature,
        split_value: f64::NAN,
        split_gain: gain,
        missing_left,
        left_cats: cats[..k].iter().map(|(c, _)| *c).collect(),
        left_count: l.count,
        left_offset: l.offset,
        left_rows: l.rows,
        right_count: r.count,
        right_offset: r.offset,
        right_rows: r.rows,
    })
}
