//! Training-set outlier removal

use crate::anomaly::{IsolationForest, OutlierDetector};
use crate::error::{HorizonError, Result};
use crate::utils::frame::{columns_to_array2, numeric_column_names, take_rows, take_series};
use polars::prelude::*;
use tracing::{info, warn};

/// Drop anomalous training rows from both features and target.
///
/// An isolation forest (100 trees, up to 256 samples each) is fitted on the
/// integer/float columns of `x`; boolean indicators are left out. Rows
/// flagged as anomalies are removed from `x` and `y` together so row
/// correspondence holds.
pub fn remove_outliers(
    x: &DataFrame,
    y: &Series,
    contamination: f64,
    seed: u64,
) -> Result<(DataFrame, Series)> {
    if !(contamination > 0.0 && contamination < 0.5) {
        return Err(HorizonError::InvalidParameter {
            name: "contamination".to_string(),
            value: contamination.to_string(),
            reason: "must lie in (0, 0.5)".to_string(),
        });
    }
    if x.height() != y.len() {
        return Err(HorizonError::ShapeError {
            expected: format!("y length = {}", x.height()),
            actual: format!("y length = {}", y.len()),
        });
    }

    let numeric = numeric_column_names(x);
    if numeric.is_empty() || x.height() == 0 {
        warn!(rows = x.height(), "No numeric training data; outlier removal skipped");
        return Ok((x.clone(), y.clone()));
    }

    let matrix = columns_to_array2(x, &numeric)?;
    let mut detector = IsolationForest::new()
        .with_n_estimators(100)
        .with_max_samples(256)
        .with_contamination(contamination)
        .with_seed(seed);
    detector.fit(&matrix)?;
    let keep = detector.inlier_rows(&matrix)?;

    info!(
        before = x.height(),
        removed = x.height() - keep.len(),
        features = numeric.len(),
        "Removed training outliers"
    );
    Ok((take_rows(x, &keep)?, take_series(y, &keep)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn training_frame() -> (DataFrame, Series) {
        let mut cost: Vec<f64> = (0..60).map(|i| 1_000.0 + (i % 12) as f64 * 10.0).collect();
        let mut orgs: Vec<i64> = (0..60).map(|i| 3 + (i % 4) as i64).collect();
        cost.push(9_000_000.0);
        orgs.push(400);
        let flag: Vec<bool> = (0..61).map(|i| i % 2 == 0).collect();
        let y: Vec<i32> = (0..61).map(|i| (i % 3) as i32).collect();

        let x = df!("totalCost" => &cost, "org_count" => &orgs, "SME" => &flag).unwrap();
        (x, Series::new("funding_class".into(), y))
    }

    #[test]
    fn test_remove_outliers_keeps_rows_aligned() {
        let (x, y) = training_frame();
        let (x_clean, y_clean) = remove_outliers(&x, &y, 0.05, 78).unwrap();

        assert_eq!(x_clean.height(), y_clean.len());
        assert!(x_clean.height() < x.height());
        assert_eq!(x_clean.width(), x.width());

        let max_cost = x_clean.column("totalCost").unwrap().f64().unwrap().max().unwrap();
        assert!(max_cost < 9_000_000.0);
    }

    #[test]
    fn test_identical_rows_survive() {
        let x = df!("totalCost" => &[1_000.0; 40], "org_count" => &[3i64; 40]).unwrap();
        let y = Series::new("funding_class".into(), vec![1i32; 40]);

        let (x_clean, y_clean) = remove_outliers(&x, &y, 0.05, 78).unwrap();
        assert_eq!(x_clean.height(), 40);
        assert_eq!(y_clean.len(), 40);
    }

    #[test]
    fn test_duplicates_at_cutoff_do_not_inflate_removal() {
        let mut cost: Vec<f64> = (0..90).map(|i| 1_000.0 + ((i * 37) % 90) as f64 * 15.0).collect();
        let mut orgs: Vec<i64> = (0..90).map(|i| 2 + ((i * 11) % 9) as i64).collect();
        cost.extend([250_000.0; 10]);
        orgs.extend([40i64; 10]);
        let y: Vec<i32> = (0..100).map(|i| (i % 3) as i32).collect();
        let x = df!("totalCost" => &cost, "org_count" => &orgs).unwrap();
        let y = Series::new("funding_class".into(), y);

        let (x_clean, y_clean) = remove_outliers(&x, &y, 0.05, 78).unwrap();
        // floor(0.05 * 100) = 5
        let removed = x.height() - x_clean.height();
        assert!(removed <= 5, "removed {} rows", removed);
        assert_eq!(x_clean.height(), y_clean.len());
    }

    #[test]
    fn test_contamination_bounds() {
        let (x, y) = training_frame();
        for bad in [0.0, 0.5, 0.7, -0.1] {
            let result = remove_outliers(&x, &y, bad, 78);
            assert!(matches!(result, Err(HorizonError::InvalidParameter { .. })));
        }
    }

    #[test]
    fn test_length_mismatch() {
        let (x, _) = training_frame();
        let y = Series::new("y".into(), &[0, 1]);
        assert!(matches!(remove_outliers(&x, &y, 0.1, 78), Err(HorizonError::ShapeError { .. })));
    }
}
