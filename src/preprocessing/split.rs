//! Stratified train/test split

use crate::error::{HorizonError, Result};
use crate::utils::frame::{series, take_rows, take_series};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::info;

/// Disjoint train/test partition of a feature table
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: DataFrame,
    pub x_test: DataFrame,
    pub y_train: Series,
    pub y_test: Series,
}

/// Shuffled test/train row indices, stratified by class label.
///
/// Each class contributes `round(n_class * test_size)` rows to the test
/// side, clamped so both sides keep at least one row of every class.
pub(crate) fn stratified_indices(
    labels: &[i64],
    test_size: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(HorizonError::InvalidParameter {
            name: "test_size".to_string(),
            value: test_size.to_string(),
            reason: "must lie in (0, 1)".to_string(),
        });
    }

    let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        class_indices.entry(label).or_default().push(i);
    }

    if let Some((label, members)) = class_indices.iter().find(|(_, m)| m.len() < 2) {
        return Err(HorizonError::ValidationError(format!(
            "class {} has {} member(s); stratified split needs at least 2 per class",
            label,
            members.len()
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train_indices = Vec::with_capacity(labels.len());
    let mut test_indices = Vec::new();

    for indices in class_indices.values_mut() {
        indices.shuffle(&mut rng);
        let n_test = ((indices.len() as f64) * test_size).round() as usize;
        let n_test = n_test.clamp(1, indices.len() - 1);
        test_indices.extend_from_slice(&indices[..n_test]);
        train_indices.extend_from_slice(&indices[n_test..]);
    }

    train_indices.sort_unstable();
    test_indices.sort_unstable();
    Ok((train_indices, test_indices))
}

/// Split the encoded table into features and target, stratified on the target
pub fn split_data(
    df: &DataFrame,
    target_column: &str,
    test_size: f64,
    seed: u64,
) -> Result<TrainTestSplit> {
    let target = series(df, target_column)?;
    let labels = target
        .cast(&DataType::Int64)?
        .i64()?
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| {
                HorizonError::DataError(format!("target '{}' contains missing values", target_column))
            })
        })
        .collect::<Result<Vec<i64>>>()?;

    let (train_idx, test_idx) = stratified_indices(&labels, test_size, seed)?;

    let features = df.drop(target_column)?;
    let split = TrainTestSplit {
        x_train: take_rows(&features, &train_idx)?,
        x_test: take_rows(&features, &test_idx)?,
        y_train: take_series(target, &train_idx)?,
        y_test: take_series(target, &test_idx)?,
    };

    info!(
        train = split.x_train.height(),
        test = split.x_test.height(),
        seed,
        "Split train/test"
    );
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(n: usize) -> DataFrame {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y: Vec<i32> = (0..n).map(|i| if i % 5 == 0 { 1 } else { 0 }).collect();
        df!("x" => &x, "funding_class" => &y).unwrap()
    }

    fn class_share(s: &Series, class: i32) -> f64 {
        let ca = s.i32().unwrap();
        ca.into_iter().filter(|v| *v == Some(class)).count() as f64 / ca.len() as f64
    }

    #[test]
    fn test_split_sizes_and_disjoint() {
        let df = labeled(100);
        let split = split_data(&df, "funding_class", 0.2, 56).unwrap();

        assert_eq!(split.x_train.height() + split.x_test.height(), 100);
        assert_eq!(split.x_test.height(), 20);
        assert_eq!(split.x_train.height(), split.y_train.len());
        assert!(split.x_train.column("funding_class").is_err());

        let train_x: Vec<f64> = split.x_train.column("x").unwrap().f64().unwrap().into_iter().flatten().collect();
        let test_x: Vec<f64> = split.x_test.column("x").unwrap().f64().unwrap().into_iter().flatten().collect();
        assert!(train_x.iter().all(|v| !test_x.contains(v)));
    }

    #[test]
    fn test_split_preserves_class_proportions() {
        let df = labeled(100);
        let split = split_data(&df, "funding_class", 0.2, 56).unwrap();

        assert!((class_share(&split.y_train, 1) - 0.2).abs() < 0.02);
        assert!((class_share(&split.y_test, 1) - 0.2).abs() < 0.02);
    }

    #[test]
    fn test_split_is_deterministic() {
        let df = labeled(50);
        let a = split_data(&df, "funding_class", 0.2, 7).unwrap();
        let b = split_data(&df, "funding_class", 0.2, 7).unwrap();
        assert!(a.x_test.equals(&b.x_test));
    }

    #[test]
    fn test_singleton_class_is_error() {
        let df = df!("x" => &[1.0, 2.0, 3.0], "y" => &[0, 0, 1]).unwrap();
        let result = split_data(&df, "y", 0.2, 56);
        assert!(matches!(result, Err(HorizonError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_test_size() {
        let df = labeled(10);
        let result = split_data(&df, "funding_class", 1.5, 56);
        assert!(matches!(result, Err(HorizonError::InvalidParameter { .. })));
    }
}
