//! Classification metrics

use crate::error::{HorizonError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Test-set report for one classifier.
///
/// Precision, recall and F1 are macro averages over the sorted union of
/// true and predicted labels; a class with an empty denominator scores 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
    pub labels: Vec<i64>,
    /// Rows are true labels, columns predicted labels, both in `labels` order
    pub confusion_matrix: Vec<Vec<usize>>,
}

impl ClassificationReport {
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(HorizonError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(HorizonError::ValidationError(
                "cannot score an empty test set".to_string(),
            ));
        }

        let truth: Vec<i64> = y_true.iter().map(|&v| v.round() as i64).collect();
        let pred: Vec<i64> = y_pred.iter().map(|&v| v.round() as i64).collect();

        let mut labels: Vec<i64> = truth.iter().chain(pred.iter()).copied().collect();
        labels.sort_unstable();
        labels.dedup();

        let position: BTreeMap<i64, usize> = labels.iter().enumerate().map(|(i, &l)| (l, i)).collect();
        let n_labels = labels.len();
        let mut confusion_matrix = vec![vec![0usize; n_labels]; n_labels];
        for (t, p) in truth.iter().zip(pred.iter()) {
            confusion_matrix[position[t]][position[p]] += 1;
        }

        let correct: usize = (0..n_labels).map(|k| confusion_matrix[k][k]).sum();
        let accuracy = correct as f64 / truth.len() as f64;

        let mut precision_sum = 0.0;
        let mut recall_sum = 0.0;
        let mut f1_sum = 0.0;
        for k in 0..n_labels {
            let tp = confusion_matrix[k][k] as f64;
            let predicted: usize = (0..n_labels).map(|r| confusion_matrix[r][k]).sum();
            let actual: usize = confusion_matrix[k].iter().sum();

            let precision = safe_div(tp, predicted as f64);
            let recall = safe_div(tp, actual as f64);
            precision_sum += precision;
            recall_sum += recall;
            f1_sum += safe_div(2.0 * precision * recall, precision + recall);
        }

        let n = n_labels as f64;
        Ok(Self {
            accuracy,
            f1: f1_sum / n,
            precision: precision_sum / n,
            recall: recall_sum / n,
            labels,
            confusion_matrix,
        })
    }

    /// Scalar metrics keyed by name
    pub fn as_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("accuracy".to_string(), self.accuracy),
            ("f1".to_string(), self.f1),
            ("precision".to_string(), self.precision),
            ("recall".to_string(), self.recall),
        ])
    }
}

fn safe_div(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Fraction of exact label matches
pub fn accuracy_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    if y_true.len() != y_pred.len() {
        return Err(HorizonError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    if y_true.is_empty() {
        return Err(HorizonError::ValidationError(
            "cannot score an empty test set".to_string(),
        ));
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    Ok(correct as f64 / y_true.len() as f64)
}
