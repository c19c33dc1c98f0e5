//! Run parameters loaded from `conf/parameters.yml`

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::catalog::{DataCatalog, ParamValue};
use crate::error::{HorizonError, Result};

/// Workflow parameters; every field is exposed as `params:<field>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Parameters {
    pub project_filepath: String,
    pub organization_filepath: String,
    pub csv_separator: String,
    pub target_column: String,
    pub contamination: f64,
    pub numeric_columns: Vec<String>,
    pub test_size: f64,
    pub split_seed: u64,
    pub outlier_seed: u64,
    pub model_seed: u64,
    pub cv_folds: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            project_filepath: "data/01_raw/project.csv".to_string(),
            organization_filepath: "data/01_raw/organization.csv".to_string(),
            csv_separator: ";".to_string(),
            target_column: "funding_class".to_string(),
            contamination: 0.05,
            numeric_columns: vec![
                "totalCost".to_string(),
                "org_count".to_string(),
                "duration_days".to_string(),
            ],
            test_size: 0.2,
            split_seed: 56,
            outlier_seed: 78,
            model_seed: 76,
            cv_folds: 5,
        }
    }
}

impl Parameters {
    /// Parse and validate YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let params: Self = serde_yaml::from_str(yaml)?;
        params.validate()?;
        Ok(params)
    }

    /// Load and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| HorizonError::ConfigError(format!("{}: {}", path.display(), e)))?;
        let params = Self::from_yaml_str(&yaml)?;
        debug!(path = %path.display(), "Loaded parameters");
        Ok(params)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// The separator as a single byte
    pub fn separator_byte(&self) -> Result<u8> {
        match self.csv_separator.as_bytes() {
            [b] => Ok(*b),
            _ => Err(HorizonError::ConfigError(format!(
                "csv_separator must be a single ASCII character, got '{}'",
                self.csv_separator
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination < 0.5) {
            return Err(HorizonError::ConfigError(format!(
                "contamination must lie in (0, 0.5), got {}",
                self.contamination
            )));
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(HorizonError::ConfigError(format!(
                "test_size must lie in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.cv_folds < 2 {
            return Err(HorizonError::ConfigError(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        if self.target_column.trim().is_empty() {
            return Err(HorizonError::ConfigError("target_column must not be empty".to_string()));
        }
        if self.numeric_columns.is_empty() {
            return Err(HorizonError::ConfigError("numeric_columns must not be empty".to_string()));
        }
        self.separator_byte()?;
        Ok(())
    }

    /// Register every parameter in the catalog
    pub fn register(&self, catalog: &mut DataCatalog) {
        let text = |s: &str| ParamValue::Text(s.to_string());
        catalog.add_param("project_filepath", text(&self.project_filepath));
        catalog.add_param("organization_filepath", text(&self.organization_filepath));
        catalog.add_param("csv_separator", text(&self.csv_separator));
        catalog.add_param("target_column", text(&self.target_column));
        catalog.add_param("contamination", ParamValue::Float(self.contamination));
        catalog.add_param("numeric_columns", ParamValue::List(self.numeric_columns.clone()));
        catalog.add_param("test_size", ParamValue::Float(self.test_size));
        catalog.add_param("split_seed", ParamValue::Integer(self.split_seed as i64));
        catalog.add_param("outlier_seed", ParamValue::Integer(self.outlier_seed as i64));
        catalog.add_param("model_seed", ParamValue::Integer(self.model_seed as i64));
        catalog.add_param("cv_folds", ParamValue::Integer(self.cv_folds as i64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = Parameters::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.separator_byte().unwrap(), b';');
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let params = Parameters::from_yaml_str("contamination: 0.1\nnumeric_columns: [totalCost]\n").unwrap();
        assert_eq!(params.contamination, 0.1);
        assert_eq!(params.numeric_columns, vec!["totalCost".to_string()]);
        assert_eq!(params.split_seed, 56);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for yaml in [
            "contamination: 0.5",
            "contamination: 0",
            "test_size: 1.2",
            "cv_folds: 1",
            "csv_separator: ';;'",
            "unknown_key: 3",
        ] {
            let result = Parameters::from_yaml_str(yaml);
            assert!(matches!(result, Err(HorizonError::ConfigError(_))), "{} -> {:?}", yaml, result);
        }
    }

    #[test]
    fn test_register_params() {
        let mut catalog = DataCatalog::new();
        Parameters::default().register(&mut catalog);
        assert_eq!(catalog.params().count(), 11);
        assert!(catalog.contains("params:numeric_columns"));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let params = Parameters::default();
        let parsed = Parameters::from_yaml_str(&params.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, params);
    }
}
