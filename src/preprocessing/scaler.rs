//! Feature standardization

use crate::error::{HorizonError, Result};
use crate::utils::frame::{is_numeric_dtype, series};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameters for a fitted column
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerParams {
    center: f64,
    scale: f64,
}

/// Zero-mean / unit-variance scaler over selected columns.
///
/// Uses the population standard deviation; a constant column gets scale 1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    params: Vec<(String, ScalerParams)>,
    is_fitted: bool,
}

impl StandardScaler {
    /// Create a new scaler
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the scaler to the given numeric columns
    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        self.params.clear();
        for col_name in columns {
            let column = series(df, col_name)?;
            if !is_numeric_dtype(column.dtype()) {
                return Err(HorizonError::PreprocessingError(format!(
                    "cannot standardize non-numeric column '{}' ({})",
                    col_name,
                    column.dtype()
                )));
            }
            let params = Self::compute_params(column)?;
            self.params.push((col_name.to_string(), params));
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Transform the data; columns outside the fitted set pass through
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(HorizonError::ModelNotFitted);
        }

        let replacements: Vec<Series> = self
            .params
            .iter()
            .map(|(col_name, params)| Self::scale_series(series(df, col_name)?, params))
            .collect::<Result<Vec<_>>>()?;

        let mut result = df.clone();
        for scaled in replacements {
            result.with_column(scaled)?;
        }

        Ok(result)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }

    /// Fitted (column, mean, std) triples
    pub fn statistics(&self) -> Vec<(&str, f64, f64)> {
        self.params
            .iter()
            .map(|(name, p)| (name.as_str(), p.center, p.scale))
            .collect()
    }

    fn compute_params(series: &Series) -> Result<ScalerParams> {
        let casted = series.cast(&DataType::Float64)?;
        let ca = casted.f64()?;

        let mean = ca.mean().unwrap_or(0.0);
        let std = ca.std(0).unwrap_or(1.0);
        Ok(ScalerParams {
            center: mean,
            scale: if std == 0.0 || !std.is_finite() { 1.0 } else { std },
        })
    }

    fn scale_series(series: &Series, params: &ScalerParams) -> Result<Series> {
        let casted = series.cast(&DataType::Float64)?;
        let scaled: Float64Chunked = casted
            .f64()?
            .into_iter()
            .map(|opt| opt.map(|v| (v - params.center) / params.scale))
            .collect();

        Ok(scaled.with_name(series.name().clone()).into_series())
    }
}

/// Fit on the training columns, apply to both train and test
pub fn standardize_numeric_columns(
    x_train: &DataFrame,
    x_test: &DataFrame,
    numeric_columns: &[String],
) -> Result<(DataFrame, DataFrame)> {
    let columns: Vec<&str> = numeric_columns.iter().map(|s| s.as_str()).collect();

    let mut scaler = StandardScaler::new();
    let train_scaled = scaler.fit_transform(x_train, &columns)?;
    let test_scaled = scaler.transform(x_test)?;

    debug!(columns = ?scaler.statistics(), "Standardized numeric columns");
    Ok((train_scaled, test_scaled))
}
