//! Softmax regression and the helpers shared with the booster

use super::models::{argmax_class, unique_classes, Classifier};
use crate::error::{HorizonError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Row-wise softmax, shifted by the row maximum for stability
pub(crate) fn softmax_rows(z: &Array2<f64>) -> Array2<f64> {
    let mut out = z.clone();
    for mut row in out.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        }
    }
    out
}

/// One-hot targets over the given class list
pub(crate) fn one_hot_targets(y: &Array1<f64>, classes: &[f64]) -> Array2<f64> {
    let mut targets = Array2::zeros((y.len(), classes.len()));
    for (i, &label) in y.iter().enumerate() {
        let k = classes.partition_point(|&c| c < label);
        if k < classes.len() {
            targets[[i, k]] = 1.0;
        }
    }
    targets
}

/// Multinomial logistic regression trained by full-batch gradient descent
/// on the L2-penalized cross-entropy. Features are expected on a common
/// scale; the pipeline feeds it the standardized matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// L2 penalty on the weights
    pub alpha: f64,
    pub max_iter: usize,
    /// Stop once the gradient norm drops below this
    pub tol: f64,
    pub learning_rate: f64,
    weights: Option<Array2<f64>>,
    bias: Option<Array1<f64>>,
    classes: Vec<f64>,
    steps: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            weights: None,
            bias: None,
            classes: Vec::new(),
            steps: 0,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(HorizonError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(HorizonError::ValidationError("logistic regression needs at least one row".to_string()));
        }

        self.classes = unique_classes(y);
        let targets = one_hot_targets(y, &self.classes);
        let n = x.nrows() as f64;

        let mut w = Array2::<f64>::zeros((x.ncols(), self.classes.len()));
        let mut b = Array1::<f64>::zeros(self.classes.len());

        self.steps = self.max_iter;
        for step in 0..self.max_iter {
            let residual = softmax_rows(&(x.dot(&w) + &b)) - &targets;
            let grad_w = x.t().dot(&residual) / n + &w * self.alpha;
            let grad_b = residual.sum_axis(Axis(0)) / n;

            let norm = (grad_w.iter().chain(grad_b.iter()).map(|g| g * g).sum::<f64>()).sqrt();
            if norm < self.tol {
                self.steps = step;
                break;
            }
            w.scaled_add(-self.learning_rate, &grad_w);
            b.scaled_add(-self.learning_rate, &grad_b);
        }

        debug!(steps = self.steps, classes = self.classes.len(), "Fitted logistic regression");
        self.weights = Some(w);
        self.bias = Some(b);
        Ok(self)
    }

    /// Class probabilities, columns following `classes()`
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (Some(w), Some(b)) = (&self.weights, &self.bias) else {
            return Err(HorizonError::ModelNotFitted);
        };
        if x.ncols() != w.nrows() {
            return Err(HorizonError::ShapeError {
                expected: format!("{} features", w.nrows()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(softmax_rows(&(x.dot(w) + b)))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| argmax_class(row, &self.classes)).collect())
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Gradient steps taken in the last fit
    pub fn n_iter(&self) -> usize {
        self.steps
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        LogisticRegression::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LogisticRegression::predict(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_rows() {
        let z = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 1000.0, 1000.0, 1000.0]).unwrap();
        let p = softmax_rows(&z);
        for row in p.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        assert!(p[[0, 2]] > p[[0, 1]]);
        assert!((p[[1, 0]] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_separates_two_groups() {
        let x = Array2::from_shape_vec(
            (8, 2),
            vec![
                -2.0, -1.0, -1.5, -2.0, -1.0, -1.5, -2.5, -0.5,
                2.0, 1.0, 1.5, 2.0, 1.0, 1.5, 2.5, 0.5,
            ],
        )
        .unwrap();
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);

        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_three_classes_keep_label_values() {
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for (class, (cx, cy)) in [(0.0, 0.0), (4.0, 0.0), (0.0, 4.0)].iter().enumerate() {
            for i in 0..10 {
                data.push(cx + (i % 3) as f64 * 0.2);
                data.push(cy - (i % 2) as f64 * 0.2);
                labels.push(class as f64 * 2.0);
            }
        }
        let x = Array2::from_shape_vec((30, 2), data).unwrap();
        let y = Array1::from_vec(labels);

        let mut model = LogisticRegression::new().with_max_iter(2000);
        model.fit(&x, &y).unwrap();
        assert!(model.n_iter() <= 2000);

        assert_eq!(model.classes(), &[0.0, 2.0, 4.0]);
        let pred = model.predict(&x).unwrap();
        let correct = pred.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct >= 28);

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LogisticRegression::new();
        let x = Array2::zeros((1, 2));
        assert!(matches!(model.predict(&x), Err(HorizonError::ModelNotFitted)));
    }
}
