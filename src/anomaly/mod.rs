//! Anomaly detection
//!
//! Used by the outlier-removal stage to flag training rows that isolate
//! unusually fast.

mod isolation_forest;

pub use isolation_forest::{IsolationForest, IsolationTree};

use crate::error::Result;
use ndarray::{Array1, Array2};

/// A detector that scores rows and flags those strictly above a fitted cutoff
pub trait OutlierDetector: Send + Sync {
    fn fit(&mut self, x: &Array2<f64>) -> Result<()>;

    /// Higher is more anomalous
    fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Scores strictly above this value are outliers
    fn threshold(&self) -> f64;

    /// One flag per row, `true` for outliers
    fn flag_outliers(&self, x: &Array2<f64>) -> Result<Vec<bool>> {
        let cutoff = self.threshold();
        Ok(self.score_samples(x)?.iter().map(|&s| s > cutoff).collect())
    }

    /// Positions of the rows that are not flagged, in order
    fn inlier_rows(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        Ok(self
            .flag_outliers(x)?
            .into_iter()
            .enumerate()
            .filter(|(_, outlier)| !outlier)
            .map(|(i, _)| i)
            .collect())
    }
}
