//! DataFrame helpers shared by the preprocessing and training stages

use crate::error::{HorizonError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// True for the integer and float dtypes
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Names of the integer/float columns, in frame order
pub fn numeric_column_names(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| is_numeric_dtype(c.dtype()))
        .map(|c| c.name().to_string())
        .collect()
}

/// All column names, in frame order
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

/// Fetch a column as a materialized series, mapping absence to `FeatureNotFound`
pub fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|c| c.as_materialized_series())
        .map_err(|_| HorizonError::FeatureNotFound(name.to_string()))
}

/// Read a column as optional f64 values; booleans become 0/1
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let casted = series(df, name)?.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

/// Build a row-major feature matrix from the given columns.
/// Missing values are rejected; they should have been dropped upstream.
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|col_name| {
            f64_values(df, col_name)?
                .into_iter()
                .map(|v| {
                    v.filter(|x| !x.is_nan()).ok_or_else(|| {
                        HorizonError::DataError(format!(
                            "column '{}' contains missing values",
                            col_name
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_refs[c][r]))
}

/// Feature matrix over every column of the frame
pub fn frame_to_array2(df: &DataFrame) -> Result<Array2<f64>> {
    columns_to_array2(df, &column_names(df))
}

/// Class labels from a single integer/float column
pub fn series_to_labels(labels: &Series) -> Result<Array1<f64>> {
    let casted = labels.cast(&DataType::Float64)?;
    let values = casted
        .f64()?
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| {
                HorizonError::DataError(format!("target '{}' contains missing values", labels.name()))
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(Array1::from_vec(values))
}

/// Select rows by position
pub fn take_rows(df: &DataFrame, indices: &[usize]) -> Result<DataFrame> {
    let idx = IdxCa::from_vec(
        "idx".into(),
        indices.iter().map(|&i| i as IdxSize).collect(),
    );
    Ok(df.take(&idx)?)
}

/// Select series rows by position
pub fn take_series(s: &Series, indices: &[usize]) -> Result<Series> {
    let idx = IdxCa::from_vec(
        "idx".into(),
        indices.iter().map(|&i| i as IdxSize).collect(),
    );
    Ok(s.take(&idx)?)
}

/// Fail with `FeatureNotFound` for the first absent column
pub fn require_columns(df: &DataFrame, columns: &[&str]) -> Result<()> {
    for name in columns {
        if df.column(name).is_err() {
            return Err(HorizonError::FeatureNotFound(name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_to_array2_casts_bool_and_int() {
        let df = df!(
            "a" => &[1i64, 2, 3],
            "b" => &[true, false, true],
            "c" => &[0.5, 1.5, 2.5]
        )
        .unwrap();

        let x = frame_to_array2(&df).unwrap();
        assert_eq!(x.dim(), (3, 3));
        assert_eq!(x[[1, 0]], 2.0);
        assert_eq!(x[[0, 1]], 1.0);
        assert_eq!(x[[1, 1]], 0.0);
        assert_eq!(x[[2, 2]], 2.5);
    }

    #[test]
    fn test_columns_to_array2_rejects_nulls() {
        let df = df!("a" => &[Some(1.0), None]).unwrap();
        let result = frame_to_array2(&df);
        assert!(matches!(result, Err(HorizonError::DataError(_))));
    }

    #[test]
    fn test_missing_column() {
        let df = df!("a" => &[1.0]).unwrap();
        let result = columns_to_array2(&df, &["nope".to_string()]);
        assert!(matches!(result, Err(HorizonError::FeatureNotFound(_))));
        assert!(require_columns(&df, &["a"]).is_ok());
    }

    #[test]
    fn test_numeric_column_names_skips_bool_and_text() {
        let df = df!(
            "n" => &[1i32, 2],
            "s" => &["x", "y"],
            "b" => &[true, false],
            "f" => &[1.0f32, 2.0]
        )
        .unwrap();
        assert_eq!(numeric_column_names(&df), vec!["n".to_string(), "f".to_string()]);
    }

    #[test]
    fn test_take_rows() {
        let df = df!("a" => &[10, 20, 30]).unwrap();
        let taken = take_rows(&df, &[2, 0]).unwrap();
        let values: Vec<Option<i32>> = taken.column("a").unwrap().i32().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(30), Some(10)]);
    }
}
