//! Data catalog: named artifacts threaded between nodes

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::debug;

use crate::error::{HorizonError, Result};
use crate::training::{ClassificationReport, TrainedModel};
use crate::utils::DataLoader;

/// Prefix that marks parameter entries
pub const PARAMS_PREFIX: &str = "params:";

/// A configuration value exposed to nodes as `params:<name>`
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Float(f64),
    Integer(i64),
    List(Vec<String>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ParamValue::Integer(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ParamValue::List(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Integer(v) => write!(f, "{}", v),
            ParamValue::List(v) => write!(f, "[{}]", v.join(", ")),
        }
    }
}

/// Any value a node can consume or produce
#[derive(Debug, Clone)]
pub enum Artifact {
    Table(DataFrame),
    Column(Series),
    Model(Box<TrainedModel>),
    Scores(Vec<f64>),
    Report(ClassificationReport),
    Metrics(BTreeMap<String, f64>),
    Param(ParamValue),
}

impl Artifact {
    /// Short type label used in errors and listings
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Table(_) => "table",
            Artifact::Column(_) => "column",
            Artifact::Model(_) => "model",
            Artifact::Scores(_) => "scores",
            Artifact::Report(_) => "report",
            Artifact::Metrics(_) => "metrics",
            Artifact::Param(_) => "param",
        }
    }

    /// One-line description for logs
    pub fn describe(&self) -> String {
        match self {
            Artifact::Table(df) => format!("table {}x{}", df.height(), df.width()),
            Artifact::Column(s) => format!("column '{}' len {}", s.name(), s.len()),
            Artifact::Model(m) => format!("model {}", m.kind),
            Artifact::Scores(s) => format!("scores {:?}", s),
            Artifact::Report(r) => format!("report accuracy {:.4}", r.accuracy),
            Artifact::Metrics(m) => format!("metrics ({} entries)", m.len()),
            Artifact::Param(p) => format!("param {}", p),
        }
    }
}

/// Name → artifact registry for one run.
///
/// When a data directory is configured, an absent table is loaded from
/// `<data_dir>/<name>.csv`; a CSV with a single column loads as a column.
#[derive(Debug, Default)]
pub struct DataCatalog {
    entries: BTreeMap<String, Artifact>,
    data_dir: Option<PathBuf>,
}

impl DataCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Register a parameter under `params:<name>`
    pub fn add_param(&mut self, name: &str, value: ParamValue) {
        self.entries.insert(format!("{}{}", PARAMS_PREFIX, name), Artifact::Param(value));
    }

    pub fn save(&mut self, name: impl Into<String>, artifact: Artifact) {
        let name = name.into();
        debug!(dataset = %name, value = %artifact.describe(), "Saved dataset");
        self.entries.insert(name, artifact);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Whether `name` is present or can be loaded from disk
    pub fn exists(&self, name: &str) -> bool {
        self.contains(name) || self.csv_path(name).map_or(false, |p| p.is_file())
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.entries.get(name)
    }

    /// Fetch an artifact, falling back to the data directory
    pub fn load(&mut self, name: &str) -> Result<&Artifact> {
        if !self.entries.contains_key(name) {
            let artifact = self.load_from_disk(name)?;
            self.entries.insert(name.to_string(), artifact);
        }
        self.entries
            .get(name)
            .ok_or_else(|| HorizonError::DatasetNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Parameters without their prefix
    pub fn params(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().filter_map(|(k, v)| match v {
            Artifact::Param(p) => k.strip_prefix(PARAMS_PREFIX).map(|name| (name, p)),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn csv_path(&self, name: &str) -> Option<PathBuf> {
        if name.starts_with(PARAMS_PREFIX) {
            return None;
        }
        self.data_dir.as_ref().map(|d| d.join(format!("{}.csv", name)))
    }

    fn load_from_disk(&self, name: &str) -> Result<Artifact> {
        let path = self
            .csv_path(name)
            .filter(|p| p.is_file())
            .ok_or_else(|| HorizonError::DatasetNotFound(name.to_string()))?;

        let df = DataLoader::new().load_csv(&path)?;
        debug!(dataset = %name, path = %path.display(), rows = df.height(), "Loaded dataset from disk");

        if df.width() == 1 {
            let column = df.get_columns()[0].as_materialized_series().clone();
            Ok(Artifact::Column(column))
        } else {
            Ok(Artifact::Table(df))
        }
    }
}
