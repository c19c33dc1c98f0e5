//! Threshold binning for the ordinal funding class

use crate::error::{HorizonError, Result};
use crate::utils::frame::f64_values;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Inner bin edges separating the funding classes (EUR)
pub const FUNDING_THRESHOLDS: [f64; 2] = [2_000_000.0, 4_000_000.0];

/// Right-closed binner over fixed inner thresholds.
///
/// Outer edges come from the fitted data: `min - 1` and `max + 1`, widened
/// to the nearest threshold when the data lies entirely on one side so the
/// edges stay monotonic. The lowest edge is inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdBinner {
    thresholds: Vec<f64>,
    edges: Option<Vec<f64>>,
}

impl ThresholdBinner {
    /// Create a binner with sorted inner thresholds
    pub fn new(thresholds: &[f64]) -> Self {
        let mut thresholds = thresholds.to_vec();
        thresholds.sort_by(|a, b| a.total_cmp(b));
        Self {
            thresholds,
            edges: None,
        }
    }

    /// Compute the outer edges from observed values
    pub fn fit(&mut self, values: &[f64]) -> Result<&mut Self> {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !min.is_finite() || !max.is_finite() {
            return Err(HorizonError::PreprocessingError(
                "cannot bin an empty column".to_string(),
            ));
        }

        let first = self.thresholds.first().copied().unwrap_or(min);
        let last = self.thresholds.last().copied().unwrap_or(max);

        let mut edges = Vec::with_capacity(self.thresholds.len() + 2);
        edges.push((min - 1.0).min(first));
        edges.extend_from_slice(&self.thresholds);
        edges.push((max + 1.0).max(last));

        self.edges = Some(edges);
        Ok(self)
    }

    /// Fitted edges, lowest first
    pub fn edges(&self) -> Option<&[f64]> {
        self.edges.as_deref()
    }

    /// Number of classes the binner produces
    pub fn n_bins(&self) -> usize {
        self.thresholds.len() + 1
    }

    /// Map a value to its bin; `None` outside the fitted edges
    pub fn bin(&self, value: f64) -> Result<Option<i32>> {
        let edges = self.edges.as_ref().ok_or(HorizonError::ModelNotFitted)?;
        Ok(Self::find_bin(value, edges))
    }

    // first window wins, which makes every bin right-closed
    fn find_bin(value: f64, edges: &[f64]) -> Option<i32> {
        edges
            .windows(2)
            .position(|w| value >= w[0] && value <= w[1])
            .map(|i| i as i32)
    }
}

/// Bin `ecMaxContribution` into classes 0/1/2 stored under `target_column`,
/// then drop the source column.
pub fn assign_funding_class(df: &DataFrame, target_column: &str) -> Result<DataFrame> {
    let values = f64_values(df, "ecMaxContribution")?;
    let observed: Vec<f64> = values.iter().flatten().copied().filter(|v| !v.is_nan()).collect();

    let mut binner = ThresholdBinner::new(&FUNDING_THRESHOLDS);
    binner.fit(&observed)?;

    let classes = values
        .iter()
        .map(|v| match v {
            Some(x) if !x.is_nan() => binner.bin(*x),
            _ => Ok(None),
        })
        .collect::<Result<Vec<Option<i32>>>>()?;

    let mut out = df.drop("ecMaxContribution")?;
    out.with_column(Series::new(target_column.into(), classes))?;

    info!(
        rows = out.height(),
        edges = ?binner.edges(),
        target = target_column,
        "Assigned funding classes"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(df: &DataFrame, name: &str) -> Vec<Option<i32>> {
        df.column(name).unwrap().i32().unwrap().into_iter().collect()
    }

    #[test]
    fn test_contributions_map_to_three_classes() {
        let df = df!(
            "ecMaxContribution" => &[1_000_000.0, 3_000_000.0, 10_000_000.0],
            "totalCost" => &[1.0, 2.0, 3.0]
        )
        .unwrap();

        let labeled = assign_funding_class(&df, "funding_class").unwrap();
        assert_eq!(classes(&labeled, "funding_class"), vec![Some(0), Some(1), Some(2)]);
        assert!(labeled.column("ecMaxContribution").is_err());
    }

    #[test]
    fn test_thresholds_are_right_closed() {
        let df = df!(
            "ecMaxContribution" => &[2_000_000.0, 2_000_000.5, 4_000_000.0, 4_000_001.0]
        )
        .unwrap();

        let labeled = assign_funding_class(&df, "funding_class").unwrap();
        assert_eq!(classes(&labeled, "funding_class"), vec![Some(0), Some(1), Some(1), Some(2)]);
    }

    #[test]
    fn test_edges_stay_monotonic() {
        let mut binner = ThresholdBinner::new(&FUNDING_THRESHOLDS);
        binner.fit(&[5_000_000.0, 6_000_000.0]).unwrap();

        let edges = binner.edges().unwrap();
        assert!(edges.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(binner.bin(5_000_000.0).unwrap(), Some(2));
        assert_eq!(binner.n_bins(), 3);
    }

    #[test]
    fn test_empty_input_is_error() {
        let df = df!("ecMaxContribution" => Vec::<f64>::new()).unwrap();
        let result = assign_funding_class(&df, "funding_class");
        assert!(matches!(result, Err(HorizonError::PreprocessingError(_))));
    }

    #[test]
    fn test_unfitted_binner() {
        let binner = ThresholdBinner::new(&[1.0]);
        assert!(matches!(binner.bin(0.5), Err(HorizonError::ModelNotFitted)));
    }
}
