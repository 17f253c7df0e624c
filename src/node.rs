use crate::splitter::SplitInfo;
use crate::utils::{is_category_code, is_missing};
use hashbrown::HashSet;
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A node that is still growable, ordered by the gain of its best split.
#[derive(Debug)]
pub struct SplittableNode {
    pub num: usize,
    pub depth: usize,
    pub start_idx: usize,
    pub stop_idx: usize,
    pub split_info: SplitInfo,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Node {
    pub num: usize,
    /// Multiplicative prediction of the node.
    pub rate: f64,
    pub count_sum: f64,
    pub offset_sum: f64,
    pub n_rows: usize,
    pub depth: usize,
    #[serde(deserialize_with = "parse_missing")]
    pub split_value: f64,
    pub split_feature: usize,
    pub split_gain: f64,
    pub left_child: usize,
    pub right_child: usize,
    pub missing_left: bool,
    pub is_leaf: bool,
    pub left_cats: HashSet<usize>,
}

// JSON has no NaN, undefined thresholds are written as null.
fn parse_missing<'de, D>(d: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Deserialize::deserialize(d).map(|x: Option<_>| x.unwrap_or(f64::NAN))
}

impl Ord for SplittableNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.split_info.split_gain.total_cmp(&other.split_info.split_gain)
    }
}

impl PartialOrd for SplittableNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SplittableNode {
    fn eq(&self, other: &Self) -> bool {
        self.split_info.split_gain == other.split_info.split_gain
    }
}

impl Eq for SplittableNode {}

impl Node {
    pub fn new_leaf(num: usize, depth: usize, rate: f64, count_sum: f64, offset_sum: f64, n_rows: usize) -> Self {
        Node {
            num,
            rate,
            count_sum,
            offset_sum,
            n_rows,
            depth,
            split_value: f64::NAN,
            split_feature: 0,
            split_gain: 0.0,
            left_child: 0,
            right_child: 0,
            missing_left: false,
            is_leaf: true,
            left_cats: HashSet::new(),
        }
    }

    /// Turn a leaf into a parent node, using the split found for it.
    pub fn make_parent_node(&mut self, split_info: SplitInfo, left_child: usize, right_child: usize) {
        self.is_leaf = false;
        self.split_feature = split_info.split_feature;
        self.split_value = split_info.split_value;
        self.split_gain = split_info.split_gain;
        self.missing_left = split_info.missing_left;
        self.left_cats = split_info.left_cats;
        self.left_child = left_child;
        self.right_child = right_child;
    }

    pub fn is_categorical(&self) -> bool {
        !self.left_cats.is_empty()
    }

    /// Get the path that should be traveled down, given a value.
    /// Negative or non-integer codes on a categorical split are treated as missing.
    pub fn get_child_idx(&self, v: &f64) -> usize {
        if is_missing(v) || (self.is_categorical() && !is_category_code(v)) {
            if self.missing_left {
                self.left_child
            } else {
                self.right_child
            }
        } else if self.is_categorical() {
            if self.left_cats.contains(&(*v as usize)) {
                self.left_child
            } else {
                self.right_child
            }
        } else if *v < self.split_value {
            self.left_child
        } else {
            self.right_child
        }
    }
}

impl fmt::Display for Node {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_leaf {
            write!(f, "{}:leaf={},cover={}", self.num, self.rate, self.offset_sum)
        } else if self.is_categorical() {
            let mut cats: Vec<_> = self.left_cats.iter().collect();
            cats.sort();
            write!(
                f,
                "{}:[{} in {:?}] yes={},no={},missing_left={},gain={},cover={}",
                self.num,
                self.split_feature,
                cats,
                self.left_child,
                self.right_child,
                self.missing_left,
                self.split_gain,
                self.offset_sum
            )
        } else {
            write!(
                f,
                "{}:[{} < {}] yes={},no={},missing_left={},gain={},cover={}",
                self.num,
                self.split_feature,
                self.split_value,
                self.left_child,
                self.right_child,
                self.missing_left,
                self.split_gain,
                self.offset_sum
            )
        }
    }
}
