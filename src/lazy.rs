//! Key-addressed cell access
//!
//! Shorthands for the common "look up metric, look up instance, touch cell"
//! sequence used by collectors and plugins.

use crate::error::{MatrixError, Result};
use crate::matrix::Matrix;
use crate::value::Value;

impl Matrix {
    fn cell_index(&self, instance_key: &str) -> Result<usize> {
        self.instance(instance_key)
            .map(|i| i.index())
            .ok_or_else(|| MatrixError::InstanceNotFound(instance_key.to_string()))
    }

    /// Set the cell at (`metric_key`, `instance_key`)
    pub fn lazy_set_value(
        &mut self,
        metric_key: &str,
        instance_key: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let index = self.cell_index(instance_key)?;
        self.metric_mut(metric_key)
            .ok_or_else(|| MatrixError::MetricNotFound(metric_key.to_string()))?
            .set_value(index, value)
    }

    /// Add to the cell at (`metric_key`, `instance_key`)
    pub fn lazy_add_value(
        &mut self,
        metric_key: &str,
        instance_key: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let index = self.cell_index(instance_key)?;
        self.metric_mut(metric_key)
            .ok_or_else(|| MatrixError::MetricNotFound(metric_key.to_string()))?
            .add_value(index, value)
    }

    /// Recorded value at (`metric_key`, `instance_key`)
    pub fn lazy_value_f64(&self, metric_key: &str, instance_key: &str) -> Option<f64> {
        let instance = self.instance(instance_key)?;
        self.metric(metric_key)?.value_f64(instance)
    }

    pub fn lazy_value_i64(&self, metric_key: &str, instance_key: &str) -> Option<i64> {
        let instance = self.instance(instance_key)?;
        self.metric(metric_key)?.value_i64(instance)
    }
}
