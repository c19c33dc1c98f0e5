//! Training engine: cross-validated fitting, evaluation and model selection

use super::cross_validation::{cross_val_score, CrossValidator};
use super::metrics::ClassificationReport;
use super::models::{Classifier, ModelKind, TrainedModel};
use crate::error::{HorizonError, Result};
use crate::utils::frame::{column_names, frame_to_array2, series_to_labels};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;

/// Training configuration shared by the three model families
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of stratified CV folds
    pub cv_folds: usize,
    /// Seed for the tree ensembles
    pub random_state: u64,
    /// Gradient-descent iterations for logistic regression
    pub max_iter: usize,
    /// Trees in the forest / boosting rounds
    pub n_estimators: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            cv_folds: 5,
            random_state: 76,
            max_iter: 1000,
            n_estimators: 100,
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }
}

/// Cross-validate then fit on the full training table.
///
/// Every column of `x` is a feature; the returned scores are per-fold
/// accuracies in fold order.
pub fn train_model(
    kind: ModelKind,
    x: &DataFrame,
    y: &Series,
    config: &TrainingConfig,
) -> Result<(TrainedModel, Vec<f64>)> {
    if x.height() != y.len() {
        return Err(HorizonError::ShapeError {
            expected: format!("y length = {}", x.height()),
            actual: format!("y length = {}", y.len()),
        });
    }

    let start = Instant::now();
    let features = frame_to_array2(x)?;
    let labels = series_to_labels(y)?;

    let template = kind.build(config);
    let cv = CrossValidator::stratified(config.cv_folds);
    let cv_results = cross_val_score(&template, &features, &labels, &cv)?;

    let mut estimator = template;
    estimator.fit(&features, &labels)?;

    info!(
        model = kind.key(),
        rows = x.height(),
        features = x.width(),
        cv_mean = cv_results.mean_score,
        cv_std = cv_results.std_score,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Trained model"
    );

    Ok((TrainedModel::new(kind, column_names(x), estimator), cv_results.scores))
}

pub fn train_logistic_regression(
    x: &DataFrame,
    y: &Series,
    config: &TrainingConfig,
) -> Result<(TrainedModel, Vec<f64>)> {
    train_model(ModelKind::LogisticRegression, x, y, config)
}

pub fn train_random_forest(
    x: &DataFrame,
    y: &Series,
    config: &TrainingConfig,
) -> Result<(TrainedModel, Vec<f64>)> {
    train_model(ModelKind::RandomForest, x, y, config)
}

pub fn train_gradient_boosting(
    x: &DataFrame,
    y: &Series,
    config: &TrainingConfig,
) -> Result<(TrainedModel, Vec<f64>)> {
    train_model(ModelKind::GradientBoosting, x, y, config)
}

/// Score a fitted model on held-out data
pub fn evaluate_model(model: &TrainedModel, x_test: &DataFrame, y_test: &Series) -> Result<ClassificationReport> {
    if x_test.height() != y_test.len() {
        return Err(HorizonError::ShapeError {
            expected: format!("y length = {}", x_test.height()),
            actual: format!("y length = {}", y_test.len()),
        });
    }

    let predictions = model.predict_frame(x_test)?;
    let truth = series_to_labels(y_test)?;
    let report = ClassificationReport::compute(&truth, &predictions)?;

    info!(
        model = model.kind.key(),
        accuracy = report.accuracy,
        f1 = report.f1,
        precision = report.precision,
        recall = report.recall,
        "Evaluated model"
    );
    Ok(report)
}

/// Pick the most accurate candidate; ties keep the earliest.
///
/// Also flattens every report into `<model>_<metric>` entries plus
/// `best_accuracy`.
pub fn select_best_model(
    candidates: &[(&TrainedModel, &ClassificationReport)],
) -> Result<(TrainedModel, BTreeMap<String, f64>)> {
    let mut all_metrics = BTreeMap::new();
    let mut best: Option<(&TrainedModel, f64)> = None;

    for &(model, report) in candidates {
        for (metric, value) in report.as_map() {
            all_metrics.insert(format!("{}_{}", model.kind.key(), metric), value);
        }
        match best {
            Some((_, acc)) if report.accuracy <= acc => {}
            _ => best = Some((model, report.accuracy)),
        }
    }

    let (best_model, best_accuracy) = best.ok_or_else(|| {
        HorizonError::TrainingError("no candidate models to select from".to_string())
    })?;
    all_metrics.insert("best_accuracy".to_string(), best_accuracy);

    info!(model = %best_model.kind, accuracy = best_accuracy, "Selected best model");
    Ok((best_model.clone(), all_metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (DataFrame, Series) {
        let n = 60;
        let a: Vec<f64> = (0..n).map(|i| (i % 3) as f64 + (i % 7) as f64 * 0.04).collect();
        let b: Vec<f64> = (0..n).map(|i| (i % 3) as f64 * -0.6 + (i % 5) as f64 * 0.02).collect();
        let y: Vec<i32> = (0..n).map(|i| (i % 3) as i32).collect();
        (
            df!("a" => &a, "b" => &b).unwrap(),
            Series::new("funding_class".into(), y),
        )
    }

    #[test]
    fn test_train_each_kind() {
        let (x, y) = blobs();
        let config = TrainingConfig::default().with_n_estimators(10);

        for kind in ModelKind::ALL {
            let (model, scores) = train_model(kind, &x, &y, &config).unwrap();
            assert_eq!(scores.len(), 5);
            assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
            assert_eq!(model.feature_names, vec!["a".to_string(), "b".to_string()]);

            let report = evaluate_model(&model, &x, &y).unwrap();
            let floor = if kind == ModelKind::LogisticRegression { 0.6 } else { 0.9 };
            assert!(report.accuracy > floor, "{} accuracy {}", kind, report.accuracy);
        }
    }

    #[test]
    fn test_constant_predictor_accuracy_half() {
        // A single-class training set yields a model that always predicts 0
        let x_train = df!("a" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let y_train = Series::new("y".into(), &[0i32, 0, 0, 0, 0, 0]);
        let config = TrainingConfig::default().with_cv_folds(2).with_n_estimators(5);
        let (model, _) = train_gradient_boosting(&x_train, &y_train, &config).unwrap();

        let x_test = df!("a" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]).unwrap();
        let y_test = Series::new("y".into(), &[0i32, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
        let report = evaluate_model(&model, &x_test, &y_test).unwrap();
        assert!((report.accuracy - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_select_best_model_ties_keep_first() {
        let (x, y) = blobs();
        let config = TrainingConfig::default().with_n_estimators(5).with_max_iter(100);
        let (rf, _) = train_random_forest(&x, &y, &config).unwrap();
        let (lr, _) = train_logistic_regression(&x, &y, &config).unwrap();

        let report = ClassificationReport {
            accuracy: 0.8,
            f1: 0.7,
            precision: 0.75,
            recall: 0.7,
            labels: vec![0, 1, 2],
            confusion_matrix: vec![vec![0; 3]; 3],
        };
        let (best, metrics) = select_best_model(&[(&rf, &report), (&lr, &report)]).unwrap();

        assert_eq!(best.kind, ModelKind::RandomForest);
        assert_eq!(metrics["best_accuracy"], 0.8);
        assert_eq!(metrics["rf_f1"], 0.7);
        assert_eq!(metrics["logistic_precision"], 0.75);
        assert_eq!(metrics.len(), 9);
    }

    #[test]
    fn test_select_best_model_empty() {
        assert!(select_best_model(&[]).is_err());
    }
}
