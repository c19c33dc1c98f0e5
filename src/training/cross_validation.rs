//! Stratified k-fold scoring

use super::metrics::accuracy_score;
use super::models::Classifier;
use crate::error::{HorizonError, Result};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Held-out rows of one fold and the rows trained on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Deterministic stratified k-fold splitter.
///
/// Rows of each class are dealt round-robin in their original order, so the
/// j-th member of a class is held out by fold `j % k`. No shuffling happens,
/// which keeps fold scores reproducible without a seed.
#[derive(Debug, Clone, Copy)]
pub struct CrossValidator {
    folds: usize,
}

impl CrossValidator {
    pub fn stratified(folds: usize) -> Self {
        Self { folds }
    }

    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<Fold>> {
        let k = self.folds;
        if k < 2 {
            return Err(HorizonError::InvalidParameter {
                name: "cv_folds".to_string(),
                value: k.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if y.len() < k {
            return Err(HorizonError::ValidationError(format!(
                "{} rows cannot fill {} folds",
                y.len(),
                k
            )));
        }

        let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (row, &label) in y.iter().enumerate() {
            by_class.entry(label.round() as i64).or_default().push(row);
        }

        let mut held_out = vec![Vec::new(); k];
        for (class, rows) in &by_class {
            if rows.len() < k {
                warn!(class, members = rows.len(), folds = k, "Class has fewer members than folds");
            }
            for (j, &row) in rows.iter().enumerate() {
                held_out[j % k].push(row);
            }
        }
        if held_out.iter().any(Vec::is_empty) {
            return Err(HorizonError::ValidationError(format!(
                "cannot form {} non-empty folds from {} rows",
                k,
                y.len()
            )));
        }

        let mut fold_of = vec![0; y.len()];
        for (index, rows) in held_out.iter_mut().enumerate() {
            rows.sort_unstable();
            for &row in rows.iter() {
                fold_of[row] = index;
            }
        }

        Ok(held_out
            .into_iter()
            .enumerate()
            .map(|(index, test)| Fold {
                index,
                train: (0..y.len()).filter(|&row| fold_of[row] != index).collect(),
                test,
            })
            .collect())
    }
}

/// Per-fold accuracies and their summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    pub scores: Vec<f64>,
    pub mean_score: f64,
    /// Population standard deviation of `scores`
    pub std_score: f64,
}

impl CVResults {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        if scores.is_empty() {
            return Self { scores, mean_score: 0.0, std_score: 0.0 };
        }
        let n = scores.len() as f64;
        let mean_score = scores.iter().sum::<f64>() / n;
        let var = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n;
        Self { scores, mean_score, std_score: var.sqrt() }
    }

    pub fn n_folds(&self) -> usize {
        self.scores.len()
    }
}

/// Accuracy of a fresh clone of `template` on every fold, folds in parallel
pub fn cross_val_score<M>(template: &M, x: &Array2<f64>, y: &Array1<f64>, cv: &CrossValidator) -> Result<CVResults>
where
    M: Classifier + Clone,
{
    if x.nrows() != y.len() {
        return Err(HorizonError::ShapeError {
            expected: format!("{} labels", x.nrows()),
            actual: format!("{} labels", y.len()),
        });
    }

    let scores = cv
        .split(y)?
        .par_iter()
        .map(|fold| -> Result<f64> {
            let mut model = template.clone();
            model.fit(&x.select(Axis(0), &fold.train), &y.select(Axis(0), &fold.train))?;
            let predicted = model.predict(&x.select(Axis(0), &fold.test))?;
            let score = accuracy_score(&y.select(Axis(0), &fold.test), &predicted)?;
            debug!(fold = fold.index, score, "Fold scored");
            Ok(score)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CVResults::from_scores(scores))
}
