//! Data processing stages
//!
//! Each stage takes a table and returns a new one:
//! - [`merge`] joins project and organization records into one row per project
//! - [`cleaning`] coerces raw text into numbers, dates and flags, derives
//!   `startmonth` / `duration_days`, and filters rows
//! - [`binning`] builds the ordinal funding class from `ecMaxContribution`
//! - [`encoder`] one-hot encodes the categorical columns
//! - [`split`] produces the stratified train/test partition
//! - [`outlier`] drops anomalous training rows with an isolation forest
//! - [`scaler`] standardizes numeric columns using training statistics

pub mod binning;
pub mod cleaning;
pub mod encoder;
pub mod merge;
pub mod outlier;
pub mod scaler;
pub mod split;

pub use binning::{assign_funding_class, ThresholdBinner, FUNDING_THRESHOLDS};
pub use cleaning::{add_duration, cast_types, drop_na, drop_zero_total_cost, parse_date, parse_decimal, parse_flag};
pub use encoder::{one_hot_encode, OneHotEncoder};
pub use merge::{load_and_merge, merge_sources};
pub use outlier::remove_outliers;
pub use scaler::{standardize_numeric_columns, StandardScaler};
pub use split::{split_data, TrainTestSplit};

use crate::error::{HorizonError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Logical kind of a column in a declared table schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Integer key
    Identifier,
    /// Quantity, possibly stored as decimal-comma text
    Numeric,
    /// Small set of levels
    Categorical,
    /// Calendar date, possibly stored as text
    Date,
    /// Free text
    Text,
}

/// A named column with its logical kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec { name, kind }
}

/// Statically declared table layout, checked when a table enters a stage
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
}

impl TableSchema {
    /// Column names in declaration order
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Names of the columns of a given kind
    pub fn columns_of(&self, kind: ColumnKind) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.name)
            .collect()
    }

    /// Fail with `FeatureNotFound` if any declared column is absent
    pub fn validate(&self, df: &DataFrame) -> Result<()> {
        for column in self.columns {
            if df.column(column.name).is_err() {
                return Err(HorizonError::FeatureNotFound(format!(
                    "{} (required by {} table)",
                    column.name, self.name
                )));
            }
        }
        Ok(())
    }

    /// Validate, then keep only the declared columns in declaration order
    pub fn select(&self, df: &DataFrame) -> Result<DataFrame> {
        self.validate(df)?;
        Ok(df.select(self.column_names())?)
    }
}

pub const PROJECT_SCHEMA: TableSchema = TableSchema {
    name: "project",
    columns: &[
        col("id", ColumnKind::Identifier),
        col("title", ColumnKind::Text),
        col("ecMaxContribution", ColumnKind::Numeric),
        col("totalCost", ColumnKind::Numeric),
        col("startDate", ColumnKind::Date),
        col("endDate", ColumnKind::Date),
        col("fundingScheme", ColumnKind::Categorical),
    ],
};

pub const ORGANIZATION_SCHEMA: TableSchema = TableSchema {
    name: "organization",
    columns: &[
        col("projectID", ColumnKind::Identifier),
        col("organisationID", ColumnKind::Identifier),
        col("country", ColumnKind::Categorical),
        col("SME", ColumnKind::Categorical),
        col("order", ColumnKind::Numeric),
    ],
};

pub const MERGED_SCHEMA: TableSchema = TableSchema {
    name: "merged",
    columns: &[
        col("id", ColumnKind::Identifier),
        col("ecMaxContribution", ColumnKind::Numeric),
        col("totalCost", ColumnKind::Numeric),
        col("startDate", ColumnKind::Date),
        col("endDate", ColumnKind::Date),
        col("fundingScheme", ColumnKind::Categorical),
        col("SME", ColumnKind::Categorical),
        col("org_count", ColumnKind::Numeric),
        col("organiser_country", ColumnKind::Categorical),
    ],
};

/// Categorical columns expanded into indicator columns
pub const ENCODED_COLUMNS: [&str; 2] = ["fundingScheme", "organiser_country"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_select_orders_columns() {
        let df = df!(
            "order" => &["1"],
            "extra" => &["x"],
            "SME" => &["true"],
            "country" => &["DE"],
            "organisationID" => &["9"],
            "projectID" => &["1"]
        )
        .unwrap();

        let selected = ORGANIZATION_SCHEMA.select(&df).unwrap();
        let names: Vec<String> = selected
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["projectID", "organisationID", "country", "SME", "order"]);
    }

    #[test]
    fn test_schema_missing_column() {
        let df = df!("id" => &[1i64]).unwrap();
        let result = PROJECT_SCHEMA.validate(&df);
        assert!(matches!(result, Err(HorizonError::FeatureNotFound(_))));
    }

    #[test]
    fn test_columns_of_kind() {
        assert_eq!(PROJECT_SCHEMA.columns_of(ColumnKind::Date), vec!["startDate", "endDate"]);
        assert_eq!(MERGED_SCHEMA.columns_of(ColumnKind::Categorical).len(), 3);
    }
}
