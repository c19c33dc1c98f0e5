//! Isolation forest

use super::OutlierDetector;
use crate::error::{HorizonError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful BST search over `n` keys
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Cell {
    Split { feature: usize, value: f64, below: usize, above: usize },
    Leaf { size: usize },
}

/// One isolation tree, stored as a flat arena rooted at index 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    cells: Vec<Cell>,
}

impl IsolationTree {
    /// Grow a tree over `rows` of `x` until `depth_limit` or single-row leaves
    pub fn grow(x: &Array2<f64>, rows: Vec<usize>, depth_limit: usize, rng: &mut impl Rng) -> Self {
        let mut tree = Self { cells: Vec::new() };
        tree.grow_cell(x, rows, 0, depth_limit, rng);
        tree
    }

    fn grow_cell(
        &mut self,
        x: &Array2<f64>,
        rows: Vec<usize>,
        depth: usize,
        depth_limit: usize,
        rng: &mut impl Rng,
    ) -> usize {
        let id = self.cells.len();
        self.cells.push(Cell::Leaf { size: rows.len() });

        if depth >= depth_limit || rows.len() <= 1 || x.ncols() == 0 {
            return id;
        }

        let feature = rng.gen_range(0..x.ncols());
        let column = x.column(feature);
        let (lo, hi) = rows
            .iter()
            .map(|&r| column[r])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if hi - lo < 1e-10 {
            return id;
        }

        let value = rng.gen_range(lo..hi);
        let (below_rows, above_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| column[r] < value);
        if below_rows.is_empty() || above_rows.is_empty() {
            return id;
        }

        let below = self.grow_cell(x, below_rows, depth + 1, depth_limit, rng);
        let above = self.grow_cell(x, above_rows, depth + 1, depth_limit, rng);
        self.cells[id] = Cell::Split { feature, value, below, above };
        id
    }

    /// Depth at which `sample` lands, plus the expected depth of the
    /// unbuilt subtree below its leaf
    pub fn depth_of(&self, sample: ArrayView1<'_, f64>) -> f64 {
        let mut id = 0;
        let mut depth = 0.0;
        loop {
            match &self.cells[id] {
                Cell::Leaf { size } => return depth + average_path_length(*size),
                Cell::Split { feature, value, below, above } => {
                    id = if sample[*feature] < *value { *below } else { *above };
                    depth += 1.0;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Ensemble of isolation trees scoring rows by how quickly they separate.
///
/// Defaults: 100 trees, at most 256 rows per tree, 10% expected outliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
    /// Expected share of outliers, used only to place the cutoff
    contamination: f64,
    seed: Option<u64>,
    trees: Option<Vec<IsolationTree>>,
    threshold: Option<f64>,
    /// Rows actually drawn per tree
    n_samples: Option<usize>,
}

impl IsolationForest {
    pub fn new() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: None,
            trees: None,
            threshold: None,
            n_samples: None,
        }
    }

    pub fn with_n_estimators(mut self, trees: usize) -> Self {
        self.n_estimators = trees.max(1);
        self
    }

    pub fn with_max_samples(mut self, rows: usize) -> Self {
        self.max_samples = rows.max(1);
        self
    }

    /// Clamped to [0, 0.5]
    pub fn with_contamination(mut self, share: f64) -> Self {
        self.contamination = share.clamp(0.0, 0.5);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Anomaly score in (0, 1]: s(x, n) = 2^(-E[h(x)] / c(n)), higher is more anomalous
    fn compute_scores(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let trees = self.trees.as_ref().ok_or(HorizonError::ModelNotFitted)?;

        let norm = average_path_length(self.n_samples.unwrap_or(self.max_samples)).max(f64::EPSILON);

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mean_depth =
                    trees.iter().map(|tree| tree.depth_of(row)).sum::<f64>() / trees.len() as f64;
                2.0_f64.powf(-mean_depth / norm)
            })
            .collect())
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new()
    }
}

impl OutlierDetector for IsolationForest {
    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(HorizonError::ValidationError(
                "isolation forest needs at least one sample".to_string(),
            ));
        }
        let samples_per_tree = self.max_samples.min(n_samples);
        let depth_limit = ((samples_per_tree as f64).log2().ceil() as usize).max(1);

        let base_seed = self.seed.unwrap_or_else(|| StdRng::from_entropy().next_u64());

        // one RNG per tree keeps the forest reproducible under parallel build
        let trees: Vec<IsolationTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let rows = rand::seq::index::sample(&mut rng, n_samples, samples_per_tree).into_vec();
                IsolationTree::grow(x, rows, depth_limit, &mut rng)
            })
            .collect();

        self.trees = Some(trees);
        self.n_samples = Some(samples_per_tree);

        // outliers score strictly above the (k+1)-th highest training score,
        // k = floor(contamination * n); rows tied at the cutoff stay inliers
        let n_outliers = (self.contamination * n_samples as f64).floor() as usize;
        self.threshold = if n_outliers == 0 || n_outliers >= n_samples {
            Some(f64::INFINITY)
        } else {
            let mut scores = self.compute_scores(x)?.to_vec();
            scores.sort_by(|a, b| b.total_cmp(a));
            Some(scores[n_outliers])
        };

        Ok(())
    }

    fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.compute_scores(x)
    }

    fn threshold(&self) -> f64 {
        self.threshold.unwrap_or(f64::INFINITY)
    }
}
