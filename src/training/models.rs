//! Model kinds, the classifier trait and the fitted-model wrapper

use super::engine::TrainingConfig;
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
use super::linear_models::LogisticRegression;
use super::random_forest::RandomForest;
use crate::error::{HorizonError, Result};
use crate::utils::frame::columns_to_array2;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, ArrayView1};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Sorted distinct labels
pub fn unique_classes(y: &Array1<f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.iter().copied().filter(|v| v.is_finite()).collect();
    classes.sort_by(|a, b| a.total_cmp(b));
    classes.dedup();
    classes
}

/// Label of the highest-scoring column; the first column wins ties
pub(crate) fn argmax_class(scores: ArrayView1<'_, f64>, classes: &[f64]) -> f64 {
    let mut best = 0;
    for (k, &s) in scores.iter().enumerate() {
        if s > scores[best] {
            best = k;
        }
    }
    classes.get(best).copied().unwrap_or(0.0)
}

/// Trait for classifiers trained on a dense feature matrix
pub trait Classifier: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict one label per row
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// The three model families the workflow trains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LogisticRegression,
    RandomForest,
    GradientBoosting,
}

impl ModelKind {
    /// Registry order, also the tie-break order for best-model selection
    pub const ALL: [ModelKind; 3] = [
        ModelKind::RandomForest,
        ModelKind::GradientBoosting,
        ModelKind::LogisticRegression,
    ];

    /// Short key used in artifact and metric names
    pub fn key(&self) -> &'static str {
        match self {
            ModelKind::LogisticRegression => "logistic",
            ModelKind::RandomForest => "rf",
            ModelKind::GradientBoosting => "xgb",
        }
    }

    /// Look up a kind by its short key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    /// Build an unfitted estimator for this kind
    pub fn build(&self, config: &TrainingConfig) -> Estimator {
        match self {
            ModelKind::LogisticRegression => {
                Estimator::LogisticRegression(LogisticRegression::new().with_max_iter(config.max_iter))
            }
            ModelKind::RandomForest => Estimator::RandomForest(
                RandomForest::new(config.n_estimators).with_random_state(config.random_state),
            ),
            ModelKind::GradientBoosting => {
                Estimator::GradientBoosting(GradientBoostingClassifier::new(GradientBoostingConfig {
                    n_estimators: config.n_estimators,
                    random_state: Some(config.random_state),
                    ..Default::default()
                }))
            }
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::LogisticRegression => "LogisticRegression",
            ModelKind::RandomForest => "RandomForestClassifier",
            ModelKind::GradientBoosting => "GradientBoostingClassifier",
        };
        f.write_str(name)
    }
}

/// A concrete estimator of one of the supported kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    LogisticRegression(LogisticRegression),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoostingClassifier),
}

impl Estimator {
    fn as_classifier(&self) -> &dyn Classifier {
        match self {
            Estimator::LogisticRegression(m) => m,
            Estimator::RandomForest(m) => m,
            Estimator::GradientBoosting(m) => m,
        }
    }

    fn as_classifier_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Estimator::LogisticRegression(m) => m,
            Estimator::RandomForest(m) => m,
            Estimator::GradientBoosting(m) => m,
        }
    }
}

impl Classifier for Estimator {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.as_classifier_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.as_classifier().predict(x)
    }
}

/// A fitted model together with the feature columns it was trained on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub kind: ModelKind,
    pub feature_names: Vec<String>,
    pub estimator: Estimator,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn new(kind: ModelKind, feature_names: Vec<String>, estimator: Estimator) -> Self {
        Self {
            kind,
            feature_names,
            estimator,
            trained_at: Utc::now(),
        }
    }

    /// Predict on a dense matrix laid out like `feature_names`
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.feature_names.len() {
            return Err(HorizonError::ShapeError {
                expected: format!("{} features", self.feature_names.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        self.estimator.predict(x)
    }

    /// Predict on a table, selecting the training feature columns by name
    pub fn predict_frame(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let x = columns_to_array2(df, &self.feature_names)?;
        self.estimator.predict(&x)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save the model to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load a model from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&json)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_unique_classes_sorted() {
        let y = array![2.0, 0.0, 1.0, 2.0, 0.0];
        assert_eq!(unique_classes(&y), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_model_kind_keys() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(ModelKind::from_key("svm"), None);
    }

    #[test]
    fn test_trained_model_roundtrip_file() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [0.1, 0.9], [0.9, 0.1]];
        let y = array![0.0, 1.0, 0.0, 1.0];
        let mut estimator = ModelKind::LogisticRegression.build(&TrainingConfig::default());
        estimator.fit(&x, &y).unwrap();
        let model = TrainedModel::new(
            ModelKind::LogisticRegression,
            vec!["a".to_string(), "b".to_string()],
            estimator,
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save(&path).unwrap();
        let loaded = TrainedModel::load(&path).unwrap();

        assert_eq!(loaded.kind, ModelKind::LogisticRegression);
        assert_eq!(loaded.predict(&x).unwrap(), model.predict(&x).unwrap());
    }

    #[test]
    fn test_predict_frame_selects_by_name() {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| (i % 2) as f64 + j as f64 * 10.0);
        let y = Array1::from_shape_fn(20, |i| (i % 2) as f64);
        let mut estimator = ModelKind::RandomForest.build(&TrainingConfig::default().with_n_estimators(15));
        estimator.fit(&x, &y).unwrap();
        let model = TrainedModel::new(
            ModelKind::RandomForest,
            vec!["a".to_string(), "b".to_string()],
            estimator,
        );

        let df = df!("b" => &[10.0, 11.0], "extra" => &[9.0, 9.0], "a" => &[0.0, 1.0]).unwrap();
        assert_eq!(model.predict_frame(&df).unwrap(), array![0.0, 1.0]);

        let missing = df!("a" => &[0.0]).unwrap();
        assert!(matches!(model.predict_frame(&missing), Err(HorizonError::FeatureNotFound(_))));
    }
}
