// Gleaner Perf - Performance counter delta engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Perf engine configuration

use crate::error::Result;
use gleaner::{MatrixError, Node};
use serde::{Deserialize, Serialize};

/// Configuration of one perf object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfConfig {
    /// Latencies are dropped when their ops delta is below this (default: 10)
    pub latency_io_reqd: f64,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            latency_io_reqd: 10.0,
        }
    }
}

impl PerfConfig {
    /// Create a configuration with a custom latency threshold
    pub fn with_latency_io_reqd(latency_io_reqd: f64) -> Self {
        Self { latency_io_reqd }
    }

    /// Read `latency_io_reqd` from collector parameters
    pub fn from_node(params: &Node) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = params.child_content("latency_io_reqd") {
            config.latency_io_reqd = raw.trim().parse().map_err(|_| {
                MatrixError::invalid_param("latency_io_reqd", format!("{:?} is not a number", raw))
            })?;
        }
        Ok(config)
    }
}
