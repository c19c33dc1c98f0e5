//! Bagged ensemble of Gini trees for the funding-class task

use super::decision_tree::DecisionTree;
use super::models::{argmax_class, unique_classes, Classifier};
use crate::error::{HorizonError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const UNSEEDED_BASE: u64 = 42;

/// Random forest classifier.
///
/// Each tree sees a bootstrap resample of the rows and considers a random
/// subset of features at every split (√n_features unless overridden).
/// Tree `i` draws from `ChaCha8Rng::seed_from_u64(seed + i)`, so the fitted
/// forest does not depend on how rayon schedules the work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    /// Features tried per split; `None` means ⌊√n_features⌋
    pub features_per_split: Option<usize>,
    pub random_state: Option<u64>,
    trees: Vec<DecisionTree>,
    classes: Vec<f64>,
    importances: Option<Array1<f64>>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            n_estimators: n_estimators.max(1),
            max_depth: None,
            features_per_split: None,
            random_state: None,
            trees: Vec::new(),
            classes: Vec::new(),
            importances: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_features_per_split(mut self, k: usize) -> Self {
        self.features_per_split = Some(k);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn split_width(&self, n_features: usize) -> usize {
        let k = self
            .features_per_split
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize);
        k.clamp(1, n_features.max(1))
    }

    fn grow_tree(&self, x: &Array2<f64>, y: &Array1<f64>, tree_idx: usize, width: usize) -> Result<DecisionTree> {
        let base = self.random_state.unwrap_or(UNSEEDED_BASE);
        let mut rng = ChaCha8Rng::seed_from_u64(base.wrapping_add(tree_idx as u64));

        let n = x.nrows();
        let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        let y_rows: Array1<f64> = rows.iter().map(|&r| y[r]).collect();

        let mut tree = DecisionTree::new_classifier()
            .with_max_features(width)
            .with_random_state(rng.gen());
        if let Some(depth) = self.max_depth {
            tree = tree.with_max_depth(depth);
        }
        tree.fit(&x.select(Axis(0), &rows), &y_rows)?;
        Ok(tree)
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(HorizonError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(HorizonError::ValidationError("random forest needs at least one row".to_string()));
        }

        let width = self.split_width(x.ncols());
        self.trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|i| self.grow_tree(x, y, i, width))
            .collect::<Result<Vec<_>>>()?;
        self.classes = unique_classes(y);
        self.importances = Some(self.mean_importances(x.ncols()));
        Ok(self)
    }

    fn mean_importances(&self, n_features: usize) -> Array1<f64> {
        let mut total = Array1::<f64>::zeros(n_features);
        for imp in self.trees.iter().filter_map(DecisionTree::feature_importances) {
            total += imp;
        }
        let sum = total.sum();
        if sum > 0.0 {
            total /= sum;
        }
        total
    }

    /// Per-class vote counts, one row per sample and one column per class
    fn tally(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(HorizonError::ModelNotFitted);
        }
        let ballots = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let mut counts = Array2::zeros((x.nrows(), self.classes.len()));
        for ballot in &ballots {
            for (row, &label) in ballot.iter().enumerate() {
                let k = self.classes.partition_point(|&c| c < label);
                if k < self.classes.len() {
                    counts[[row, k]] += 1.0;
                }
            }
        }
        Ok(counts)
    }

    /// Majority vote; ties go to the lowest class
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let counts = self.tally(x)?;
        Ok(counts.rows().into_iter().map(|row| argmax_class(row, &self.classes)).collect())
    }

    /// Share of trees voting for each class (columns follow `classes()`)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let counts = self.tally(x)?;
        Ok(counts / self.trees.len() as f64)
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Mean impurity decrease across trees, normalized to sum to one
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.importances.as_ref()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        RandomForest::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_blobs() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((45, 3), |(r, c)| {
            let centre = (r / 15) as f64 * 10.0;
            match c {
                0 => centre + (r % 5) as f64 * 0.3,
                1 => centre - (r % 3) as f64 * 0.2,
                _ => (r % 7) as f64,
            }
        });
        let y = Array1::from_shape_fn(45, |r| (r / 15) as f64);
        (x, y)
    }

    #[test]
    fn test_separates_blobs() {
        let (x, y) = three_blobs();
        let mut rf = RandomForest::new(20).with_random_state(76);
        rf.fit(&x, &y).unwrap();

        assert_eq!(rf.n_trees(), 20);
        assert_eq!(rf.classes(), &[0.0, 1.0, 2.0]);
        let pred = rf.predict(&x).unwrap();
        let correct = pred.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct as f64 / y.len() as f64 > 0.9);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = three_blobs();
        let mut a = RandomForest::new(10).with_random_state(76);
        let mut b = RandomForest::new(10).with_random_state(76);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_vote_shares_sum_to_one() {
        let (x, y) = three_blobs();
        let mut rf = RandomForest::new(8).with_random_state(1);
        rf.fit(&x, &y).unwrap();

        let proba = rf.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (45, 3));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_importances_favour_informative_features() {
        let (x, y) = three_blobs();
        let mut rf = RandomForest::new(10).with_features_per_split(3).with_random_state(5);
        rf.fit(&x, &y).unwrap();

        let imp = rf.feature_importances().unwrap();
        assert!((imp.sum() - 1.0).abs() < 1e-9);
        assert!(imp[0] + imp[1] > imp[2]);
    }

    #[test]
    fn test_unfitted_forest() {
        let rf = RandomForest::new(3);
        assert!(matches!(rf.predict(&Array2::zeros((1, 2))), Err(HorizonError::ModelNotFitted)));
    }
}
