//! CART trees: Gini trees for the forest, variance trees for boosting

use crate::error::{HorizonError, Result};
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node; samples with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// What a tree predicts, and therefore which impurity it minimizes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TreeTask {
    /// Class labels by Gini impurity
    Classify,
    /// Real targets by variance
    Regress,
}

/// Sufficient statistics of a node, updated incrementally during the sweep
#[derive(Debug, Clone)]
enum NodeStats {
    Classes(Vec<usize>),
    Moments { sum: f64, sq_sum: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub task: TreeTask,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn at random per split (all when `None`)
    pub max_features: Option<usize>,
    /// Seed for the per-split feature draw
    pub random_state: Option<u64>,
    root: Option<TreeNode>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
    classes: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    pub fn new(task: TreeTask) -> Self {
        Self {
            task,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: None,
            root: None,
            n_features: 0,
            feature_importances: None,
            classes: Vec::new(),
        }
    }

    pub fn new_classifier() -> Self {
        Self::new(TreeTask::Classify)
    }

    pub fn new_regressor() -> Self {
        Self::new(TreeTask::Regress)
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(HorizonError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(HorizonError::ValidationError(
                "cannot fit a tree on zero samples".to_string(),
            ));
        }

        self.n_features = n_features;

        // Class index per sample, so the sweep can use count vectors
        let y_idx: Vec<usize> = if self.task == TreeTask::Classify {
            self.classes = super::models::unique_classes(y);
            y.iter()
                .map(|v| self.classes.partition_point(|c| c < v))
                .collect()
        } else {
            Vec::new()
        };

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let mut importances = vec![0.0; n_features];
        let indices: Vec<usize> = (0..n_samples).collect();
        let root = self.build_tree(x, y, &y_idx, &indices, 0, &mut importances, &mut rng);
        self.root = Some(root);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        y_idx: &[usize],
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let stats = self.node_stats(y, y_idx, indices);
        let impurity = self.impurity(&stats, n_samples);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;

        if should_stop {
            return self.leaf(&stats, n_samples);
        }

        let features = self.draw_features(rng);
        match self.find_best_split(x, y, y_idx, indices, &features, impurity) {
            Some((feature_idx, threshold, gain)) => {
                let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[[i, feature_idx]] <= threshold);

                importances[feature_idx] += n_samples as f64 * gain;

                let left = Box::new(self.build_tree(x, y, y_idx, &left_indices, depth + 1, importances, rng));
                let right = Box::new(self.build_tree(x, y, y_idx, &right_indices, depth + 1, importances, rng));

                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    n_samples,
                    impurity,
                }
            }
            None => self.leaf(&stats, n_samples),
        }
    }

    fn draw_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < self.n_features => {
                let mut drawn = rand::seq::index::sample(rng, self.n_features, k).into_vec();
                drawn.sort_unstable();
                drawn
            }
            _ => (0..self.n_features).collect(),
        }
    }

    /// Best (feature, threshold, gain) over the candidate features.
    /// Ties keep the lowest feature index.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        y_idx: &[usize],
        indices: &[usize],
        features: &[usize],
        parent_impurity: f64,
    ) -> Option<(usize, f64, f64)> {
        let per_feature: Vec<Option<(usize, f64, f64)>> = features
            .par_iter()
            .map(|&f| self.best_split_for_feature(x, y, y_idx, indices, f, parent_impurity))
            .collect();

        per_feature
            .into_iter()
            .flatten()
            .fold(None, |best: Option<(usize, f64, f64)>, cand| match best {
                Some(b) if b.2 >= cand.2 => Some(b),
                _ => Some(cand),
            })
    }

    /// Sort the node's samples on one feature and sweep every boundary
    /// between distinct values, updating left/right statistics in O(1).
    fn best_split_for_feature(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        y_idx: &[usize],
        indices: &[usize],
        feature: usize,
        parent_impurity: f64,
    ) -> Option<(usize, f64, f64)> {
        let n = indices.len();
        let mut order = indices.to_vec();
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut right = self.node_stats(y, y_idx, &order);
        let mut left = match &right {
            NodeStats::Classes(counts) => NodeStats::Classes(vec![0; counts.len()]),
            NodeStats::Moments { .. } => NodeStats::Moments { sum: 0.0, sq_sum: 0.0 },
        };

        let mut best_gain = 1e-12;
        let mut best_threshold = None;

        for pos in 0..n - 1 {
            let i = order[pos];
            match (&mut left, &mut right) {
                (NodeStats::Classes(l), NodeStats::Classes(r)) => {
                    l[y_idx[i]] += 1;
                    r[y_idx[i]] -= 1;
                }
                (NodeStats::Moments { sum: ls, sq_sum: lq }, NodeStats::Moments { sum: rs, sq_sum: rq }) => {
                    let yi = y[i];
                    *ls += yi;
                    *lq += yi * yi;
                    *rs -= yi;
                    *rq -= yi * yi;
                }
                _ => return None,
            }

            let current = x[[i, feature]];
            let next = x[[order[pos + 1], feature]];
            if next <= current {
                continue;
            }

            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                continue;
            }

            let weighted = (n_left as f64 * self.impurity(&left, n_left)
                + n_right as f64 * self.impurity(&right, n_right))
                / n as f64;
            let gain = parent_impurity - weighted;

            if gain > best_gain {
                best_gain = gain;
                let mid = current + (next - current) / 2.0;
                best_threshold = Some(if mid < next { mid } else { current });
            }
        }

        best_threshold.map(|t| (feature, t, best_gain))
    }

    fn node_stats(&self, y: &Array1<f64>, y_idx: &[usize], indices: &[usize]) -> NodeStats {
        if self.task == TreeTask::Classify {
            let mut counts = vec![0usize; self.classes.len()];
            for &i in indices {
                counts[y_idx[i]] += 1;
            }
            NodeStats::Classes(counts)
        } else {
            let (sum, sq_sum) = indices
                .iter()
                .fold((0.0, 0.0), |(s, q), &i| (s + y[i], q + y[i] * y[i]));
            NodeStats::Moments { sum, sq_sum }
        }
    }

    fn impurity(&self, stats: &NodeStats, count: usize) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let n = count as f64;
        match stats {
            NodeStats::Classes(counts) => 1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>(),
            NodeStats::Moments { sum, sq_sum } => {
                let mean = sum / n;
                (sq_sum / n - mean * mean).max(0.0)
            }
        }
    }

    fn leaf(&self, stats: &NodeStats, n_samples: usize) -> TreeNode {
        let value = match stats {
            // ties go to the lowest class
            NodeStats::Classes(counts) => {
                let best = counts
                    .iter()
                    .enumerate()
                    .fold((0, 0), |acc, (k, &c)| if c > acc.1 { (k, c) } else { acc })
                    .0;
                self.classes.get(best).copied().unwrap_or(0.0)
            }
            NodeStats::Moments { sum, .. } => {
                if n_samples == 0 {
                    0.0
                } else {
                    sum / n_samples as f64
                }
            }
        };
        TreeNode::Leaf { value, n_samples }
    }

    /// Replace every leaf value with `leaf_value(rows)`, where `rows` are
    /// the training rows of `x` routed to that leaf.
    pub fn refit_leaves<F>(&mut self, x: &Array2<f64>, leaf_value: F) -> Result<()>
    where
        F: Fn(&[usize]) -> f64,
    {
        let root = self.root.as_mut().ok_or(HorizonError::ModelNotFitted)?;
        let indices: Vec<usize> = (0..x.nrows()).collect();
        Self::refit_node(root, x, &indices, &leaf_value);
        Ok(())
    }

    fn refit_node<F>(node: &mut TreeNode, x: &Array2<f64>, indices: &[usize], leaf_value: &F)
    where
        F: Fn(&[usize]) -> f64,
    {
        match node {
            TreeNode::Leaf { value, .. } => *value = leaf_value(indices),
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
                ..
            } => {
                let (l, r): (Vec<usize>, Vec<usize>) =
                    indices.iter().partition(|&&i| x[[i, *feature_idx]] <= *threshold);
                Self::refit_node(left, x, &l, leaf_value);
                Self::refit_node(right, x, &r, leaf_value);
            }
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(HorizonError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(HorizonError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x
            .rows()
            .into_iter()
            .map(|row| Self::predict_sample(root, &row.to_vec()))
            .collect())
    }

    fn predict_sample(node: &TreeNode, sample: &[f64]) -> f64 {
        let mut current = node;
        loop {
            match current {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    current = if sample[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Impurity decrease per feature, weighted by node size and summing to one
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Depth of the fitted tree
    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    /// Number of leaves in the fitted tree
    pub fn get_n_leaves(&self) -> usize {
        fn leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        self.root.as_ref().map_or(0, leaves)
    }
}
