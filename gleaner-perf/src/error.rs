// Gleaner Perf - Performance counter delta engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for the perf engine

use thiserror::Error;

/// Main error type for perf operations
#[derive(Error, Debug)]
pub enum PerfError {
    /// The raw matrix has no `timestamp` metric
    #[error("Missing timestamp metric in {0}")]
    MissingTimestamp(String),

    /// Counter not present in the schema
    #[error("Unknown counter: {0}")]
    UnknownCounter(String),

    /// Counter type outside raw/delta/rate/average/percent
    #[error("Invalid property {property:?} for counter {counter}")]
    InvalidProperty { counter: String, property: String },

    /// Schema file could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Error from the Matrix model
    #[error("Matrix error: {0}")]
    Matrix(#[from] gleaner::MatrixError),
}

/// Result type alias for perf operations
pub type Result<T> = std::result::Result<T, PerfError>;
