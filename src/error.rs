//! Error type shared by every pipeline stage

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HorizonError>;

#[derive(Error, Debug)]
pub enum HorizonError {
    /// Malformed or unreadable input tables
    #[error("data: {0}")]
    DataError(String),

    #[error("preprocessing: {0}")]
    PreprocessingError(String),

    #[error("training: {0}")]
    TrainingError(String),

    /// Parameters file problems and invalid parameter values
    #[error("config: {0}")]
    ConfigError(String),

    #[error("pipeline: {0}")]
    PipelineError(String),

    #[error("tracking: {0}")]
    TrackingError(String),

    #[error("io: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization: {0}")]
    SerializationError(String),

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("column not found: {0}")]
    FeatureNotFound(String),

    #[error("dataset '{0}' is not in the catalog")]
    DatasetNotFound(String),

    #[error("model used before fit")]
    ModelNotFitted,

    #[error("{name} = {value} {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("validation: {0}")]
    ValidationError(String),
}

impl From<polars::error::PolarsError> for HorizonError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for HorizonError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for HorizonError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for HorizonError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::ShapeError {
            expected: "a rectangular matrix".to_string(),
            actual: err.to_string(),
        }
    }
}
