//! Boosted trees for the `xgb` candidate
//!
//! Softmax objective with one variance tree per class per round. Leaves are
//! refitted to the Newton step `Σg / (Σh + λ)`.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::decision_tree::DecisionTree;
use super::linear_models::{one_hot_targets, softmax_rows};
use super::models::{argmax_class, unique_classes, Classifier};
use crate::error::{HorizonError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Boosting rounds
    pub n_estimators: usize,
    /// Shrinkage applied to every tree's output
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Share of rows drawn per round
    pub subsample: f64,
    /// Share of columns drawn per round
    pub colsample_bytree: f64,
    /// L2 penalty in the leaf denominator
    pub reg_lambda: f64,
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            reg_lambda: 1.0,
            random_state: Some(42),
        }
    }
}

/// Trees fitted in one boosting round, one per class
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BoostRound {
    trees: Vec<DecisionTree>,
    col_indices: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    rounds: Vec<BoostRound>,
    base_scores: Array1<f64>,
    classes: Vec<f64>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl Default for GradientBoostingClassifier {
    fn default() -> Self {
        Self::new(GradientBoostingConfig::default())
    }
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            rounds: Vec::new(),
            base_scores: Array1::zeros(0),
            classes: Vec::new(),
            n_features: 0,
            feature_importances: Vec::new(),
        }
    }

    /// Configuration the model was built with
    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(HorizonError::ShapeError {
                expected: format!("{} labels", n_samples),
                actual: format!("{} labels", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(HorizonError::ValidationError("boosting needs at least one row".to_string()));
        }

        self.classes = unique_classes(y);
        self.n_features = n_features;
        self.rounds.clear();
        self.feature_importances = vec![0.0; n_features];

        let n_classes = self.classes.len();
        let targets = one_hot_targets(y, &self.classes);

        // margins start at the log class priors
        self.base_scores = targets
            .sum_axis(Axis(0))
            .mapv(|count| (count / n_samples as f64).max(1e-12).ln());

        if n_classes < 2 {
            debug!("Single class in training data; booster predicts the prior");
            return Ok(());
        }

        let mut scores = Array2::from_shape_fn((n_samples, n_classes), |(_, k)| self.base_scores[k]);

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        for _ in 0..self.config.n_estimators {
            let probs = softmax_rows(&scores);
            let residuals = &targets - &probs;

            let sample_indices = draw_subset(n_samples, self.config.subsample, &mut rng);
            let col_indices = draw_subset(n_features, self.config.colsample_bytree, &mut rng);
            let x_sub = x.select(Axis(0), &sample_indices).select(Axis(1), &col_indices);

            let config = &self.config;
            let trees = (0..n_classes)
                .into_par_iter()
                .map(|k| -> Result<DecisionTree> {
                    let r: Array1<f64> = sample_indices.iter().map(|&i| residuals[[i, k]]).collect();
                    let h: Vec<f64> = sample_indices
                        .iter()
                        .map(|&i| probs[[i, k]] * (1.0 - probs[[i, k]]))
                        .collect();

                    let mut tree = DecisionTree::new_regressor().with_max_depth(config.max_depth);
                    tree.min_samples_leaf = config.min_samples_leaf.max(1);
                    tree.fit(&x_sub, &r)?;
                    tree.refit_leaves(&x_sub, |rows| {
                        let grad: f64 = rows.iter().map(|&i| r[i]).sum();
                        let hess: f64 = rows.iter().map(|&i| h[i]).sum();
                        grad / (hess + config.reg_lambda)
                    })?;
                    Ok(tree)
                })
                .collect::<Result<Vec<_>>>()?;

            let x_cols = x.select(Axis(1), &col_indices);
            for (k, tree) in trees.iter().enumerate() {
                let update = tree.predict(&x_cols)?;
                scores
                    .column_mut(k)
                    .scaled_add(self.config.learning_rate, &update);

                if let Some(importance) = tree.feature_importances() {
                    for (j, &col_idx) in col_indices.iter().enumerate() {
                        if let Some(v) = importance.get(j) {
                            self.feature_importances[col_idx] += v;
                        }
                    }
                }
            }

            self.rounds.push(BoostRound { trees, col_indices });
        }

        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= total;
            }
        }

        debug!(rounds = self.rounds.len(), classes = n_classes, "Fitted gradient boosting");
        Ok(())
    }

    /// Raw margins, one column per class
    fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(HorizonError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(HorizonError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut scores = Array2::from_shape_fn((x.nrows(), self.classes.len()), |(_, k)| self.base_scores[k]);
        for round in &self.rounds {
            let x_sub = x.select(Axis(1), &round.col_indices);
            for (k, tree) in round.trees.iter().enumerate() {
                let update = tree.predict(&x_sub)?;
                scores
                    .column_mut(k)
                    .scaled_add(self.config.learning_rate, &update);
            }
        }
        Ok(scores)
    }

    /// Softmax of the margins (columns follow `classes()`)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(softmax_rows(&self.decision_function(x)?))
    }

    /// Class with the largest margin
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let margins = self.decision_function(x)?;
        Ok(margins.rows().into_iter().map(|row| argmax_class(row, &self.classes)).collect())
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }

    /// Summed per-round tree importances, normalized to sum to one
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

/// Sorted random subset of `0..n` holding `ceil(n * ratio)` indices
fn draw_subset(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let size = (((n as f64) * ratio).ceil() as usize).clamp(1, n.max(1));
    let mut picked = rand::seq::index::sample(rng, n, size).into_vec();
    picked.sort_unstable();
    picked
}

impl Classifier for GradientBoostingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        GradientBoostingClassifier::fit(self, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        GradientBoostingClassifier::predict(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagonal_bands() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((90, 2), (0..180).map(|i| (i as f64 * 0.37) % 10.0).collect())
            .unwrap();
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|row| {
                let s = row[0] + row[1];
                if s < 7.0 {
                    0.0
                } else if s < 13.0 {
                    1.0
                } else {
                    2.0
                }
            })
            .collect();
        (x, y)
    }

    #[test]
    fn test_fits_diagonal_bands() {
        let (x, y) = diagonal_bands();
        let config = GradientBoostingConfig {
            n_estimators: 20,
            max_depth: 3,
            ..Default::default()
        };

        let mut model = GradientBoostingClassifier::new(config);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_rounds(), 20);
        assert_eq!(model.classes(), &[0.0, 1.0, 2.0]);

        let pred = model.predict(&x).unwrap();
        let correct = pred.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct as f64 / y.len() as f64 > 0.9, "accuracy too low: {}", correct);
    }

    #[test]
    fn test_predict_proba_is_distribution() {
        let (x, y) = diagonal_bands();
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 5,
            subsample: 0.8,
            colsample_bytree: 0.5,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (90, 3));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_single_class_predicts_prior() {
        let x = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = Array1::from_elem(4, 2.0);
        let mut model = GradientBoostingClassifier::default();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_rounds(), 0);
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_draw_subset_sizes() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        assert_eq!(draw_subset(5, 1.0, &mut rng), vec![0, 1, 2, 3, 4]);
        let picked = draw_subset(10, 0.25, &mut rng);
        assert_eq!(picked.len(), 3);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_predict_before_fit() {
        let model = GradientBoostingClassifier::default();
        let x = Array2::zeros((2, 2));
        assert!(matches!(model.predict(&x), Err(HorizonError::ModelNotFitted)));
    }
}
