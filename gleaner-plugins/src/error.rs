// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for Gleaner plugins

use thiserror::Error;

/// Main error type for plugin operations
#[derive(Error, Debug)]
pub enum PluginError {
    /// Required parameter missing
    #[error("Missing parameter: {0}")]
    MissingParam(String),

    /// Parameter present but unusable
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParam { name: String, reason: String },

    /// A rule line could not be parsed
    #[error("Invalid {kind} rule {rule:?}: {reason}")]
    InvalidRule {
        kind: String,
        rule: String,
        reason: String,
    },

    /// Regex failed to compile
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// YAML configuration could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Error from the Matrix model
    #[error("Matrix error: {0}")]
    Matrix(#[from] gleaner::MatrixError),

    /// No constructor registered under this name
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    /// The input map has no matrix for the plugin's object
    #[error("No matrix for object: {0}")]
    MissingMatrix(String),

    /// Per-poll failure (enrichment I/O, malformed response)
    #[error("Operational error: {0}")]
    Operational(String),
}

impl PluginError {
    pub(crate) fn invalid_rule(
        kind: impl Into<String>,
        rule: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRule {
            kind: kind.into(),
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;
