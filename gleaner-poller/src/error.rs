// Gleaner Poller - Error types
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Poller errors.

use std::time::Duration;

/// Result type alias for poller operations.
pub type Result<T> = std::result::Result<T, PollerError>;

/// Poller errors.
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    /// The collector did not answer within the client timeout
    #[error("Timeout after {timeout:?} polling {object}")]
    Timeout { object: String, timeout: Duration },

    /// The collector failed to produce a matrix
    #[error("Collector error: {0}")]
    Collector(String),

    /// A plugin could not be set up
    #[error("Plugin error: {0}")]
    Plugin(#[from] gleaner_plugins::PluginError),

    /// The perf engine rejected a poll
    #[error("Perf error: {0}")]
    Perf(#[from] gleaner_perf::PerfError),

    #[error("Matrix error: {0}")]
    Matrix(#[from] gleaner::MatrixError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    /// A replay row could not be interpreted
    #[error("Invalid row {line}: {reason}")]
    InvalidRow { line: u64, reason: String },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
