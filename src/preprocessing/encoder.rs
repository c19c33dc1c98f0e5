//! One-hot encoding of categorical columns

use super::cleaning::parse_flag;
use super::merge::text_values;
use super::ENCODED_COLUMNS;
use crate::error::{HorizonError, Result};
use crate::utils::frame::require_columns;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// One-hot encoder producing boolean indicator columns named `<column>_<level>`.
///
/// Levels are sorted; with `drop_first` the lowest level is implied by all
/// indicators being false. Missing and unseen values encode as all-false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    drop_first: bool,
    categories: Vec<(String, Vec<String>)>,
    is_fitted: bool,
}

impl Default for OneHotEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl OneHotEncoder {
    /// Create a new encoder that keeps every level
    pub fn new() -> Self {
        Self {
            drop_first: false,
            categories: Vec::new(),
            is_fitted: false,
        }
    }

    /// Drop the first (lowest) level of each column
    pub fn with_drop_first(mut self, drop_first: bool) -> Self {
        self.drop_first = drop_first;
        self
    }

    /// Learn the sorted levels of each column
    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        self.categories.clear();
        for col_name in columns {
            let column = df
                .column(col_name)
                .map_err(|_| HorizonError::FeatureNotFound(col_name.to_string()))?;
            let levels: BTreeSet<String> = text_values(column.as_materialized_series())?
                .into_iter()
                .flatten()
                .collect();
            self.categories
                .push((col_name.to_string(), levels.into_iter().collect()));
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// Indicator column names in output order
    pub fn feature_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .flat_map(|(col_name, levels)| {
                self.encoded_levels(levels)
                    .iter()
                    .map(move |level| format!("{}_{}", col_name, level))
            })
            .collect()
    }

    fn encoded_levels<'a>(&self, levels: &'a [String]) -> &'a [String] {
        if self.drop_first && !levels.is_empty() {
            &levels[1..]
        } else {
            levels
        }
    }

    /// Replace each fitted column with its indicator columns, appended at the end
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(HorizonError::ModelNotFitted);
        }

        let mut result = df.clone();
        for (col_name, levels) in &self.categories {
            let column = df
                .column(col_name)
                .map_err(|_| HorizonError::FeatureNotFound(col_name.clone()))?;
            let values = text_values(column.as_materialized_series())?;

            for level in self.encoded_levels(levels) {
                let indicator: Vec<bool> = values
                    .iter()
                    .map(|v| v.as_deref() == Some(level.as_str()))
                    .collect();
                result.with_column(Series::new(
                    format!("{}_{}", col_name, level).into(),
                    indicator,
                ))?;
            }

            result = result.drop(col_name)?;
        }

        Ok(result)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }
}

/// Encode the categorical columns of the feature table.
///
/// `fundingScheme` and `organiser_country` expand into indicators with the
/// first level dropped. `SME` is already binary and stays a single boolean
/// column.
pub fn one_hot_encode(df: &DataFrame) -> Result<DataFrame> {
    require_columns(df, &ENCODED_COLUMNS)?;
    let mut out = df.clone();

    if let Ok(sme) = df.column("SME") {
        let sme = sme.as_materialized_series();
        if sme.dtype() != &DataType::Boolean {
            let flags: Vec<Option<bool>> = text_values(sme)?
                .into_iter()
                .map(|v| v.and_then(|t| parse_flag(&t)))
                .collect();
            out.with_column(Series::new("SME".into(), flags))?;
        }
    }

    let mut encoder = OneHotEncoder::new().with_drop_first(true);
    let encoded = encoder.fit_transform(&out, &ENCODED_COLUMNS)?;

    debug!(
        indicators = encoder.feature_names().len(),
        cols = encoded.width(),
        "One-hot encoded categorical columns"
    );
    Ok(encoded)
}
