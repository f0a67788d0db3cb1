//! Error types for the Matrix model
//!
//! Every fallible operation on [`Matrix`](crate::Matrix), [`Metric`](crate::Metric)
//! and the parameter tree returns [`MatrixError`].

use thiserror::Error;

/// Result type alias for Matrix operations
pub type Result<T> = std::result::Result<T, MatrixError>;

/// Main error type for Matrix operations
#[derive(Error, Debug)]
pub enum MatrixError {
    /// A metric with this key already exists
    #[error("Duplicate metric key: {0}")]
    DuplicateMetricKey(String),

    /// An instance with this key already exists
    #[error("Duplicate instance key: {0}")]
    DuplicateInstanceKey(String),

    /// Metric key not present in the matrix
    #[error("Metric not found: {0}")]
    MetricNotFound(String),

    /// Instance key not present in the matrix
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    /// Cell index beyond the column length
    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Vector arithmetic on columns of different length
    #[error("Unequal vectors: left={left}, right={right}")]
    UnequalVectors { left: usize, right: usize },

    /// Unknown numeric type name
    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    /// Unknown counter property name
    #[error("Invalid property: {0}")]
    InvalidProperty(String),

    /// A string could not be converted to the metric's numeric type
    #[error("Cannot parse {value:?} as {data_type}")]
    ParseValue { value: String, data_type: String },

    /// Required parameter missing
    #[error("Missing parameter: {0}")]
    MissingParam(String),

    /// Parameter present but malformed
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParam { name: String, reason: String },

    /// YAML document could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error while reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MatrixError {
    /// Shorthand for [`MatrixError::InvalidParam`]
    pub fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
