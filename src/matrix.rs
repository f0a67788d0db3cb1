//! Matrix: metrics × instances for one object at one poll
//!
//! Instance indices form a dense `[0, N)` assignment and every metric column
//! holds exactly `N` cells. Adding an instance appends a cell to each column,
//! removing one compacts the columns and renumbers the survivors.

use crate::error::{MatrixError, Result};
use crate::export::ExportOptions;
use crate::instance::Instance;
use crate::metric::Metric;
use crate::value::DataType;
use std::collections::hash_map::IterMut;
use std::collections::{HashMap, HashSet};

/// Selects what [`Matrix::clone_with`] copies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct With {
    /// Copy cell values and record flags
    pub data: bool,
    /// Copy metric headers
    pub metrics: bool,
    /// Copy instances
    pub instances: bool,
    /// Export flag given to copied instances
    pub export_instances: bool,
    /// Only copy these instance labels
    pub labels: Option<Vec<String>>,
    /// Only copy these metrics
    pub metrics_names: Option<HashSet<String>>,
}

impl With {
    /// Copy everything
    pub fn all() -> Self {
        Self {
            data: true,
            metrics: true,
            instances: true,
            export_instances: true,
            labels: None,
            metrics_names: None,
        }
    }

    /// Metric headers only, no instances and no data
    pub fn metrics_only() -> Self {
        Self {
            metrics: true,
            ..Default::default()
        }
    }
}

/// Tabular store of one object's metrics and instances
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    /// Unique id of the producer (collector or plugin)
    pub uuid: String,
    /// Vendor-neutral object name, used as series prefix
    pub object: String,
    /// Stable identifier across polls
    pub identifier: String,
    global_labels: HashMap<String, String>,
    instances: HashMap<String, Instance>,
    metrics: HashMap<String, Metric>,
    export_options: Option<ExportOptions>,
    exportable: bool,
}

impl Matrix {
    pub fn new(
        uuid: impl Into<String>,
        object: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            object: object.into(),
            identifier: identifier.into(),
            global_labels: HashMap::new(),
            instances: HashMap::new(),
            metrics: HashMap::new(),
            export_options: None,
            exportable: true,
        }
    }

    pub fn is_exportable(&self) -> bool {
        self.exportable
    }

    pub fn set_exportable(&mut self, exportable: bool) {
        self.exportable = exportable;
    }

    /// Copy selected parts of this matrix
    ///
    /// Cell data is only carried over together with instances; otherwise each
    /// copied metric gets a zeroed, unrecorded column sized to the clone.
    pub fn clone_with(&self, with: &With) -> Matrix {
        let mut clone = Matrix::new(&self.uuid, &self.object, &self.identifier);
        clone.global_labels = self.global_labels.clone();
        clone.export_options = self.export_options.clone();
        clone.exportable = self.exportable;

        if with.instances {
            clone.instances = self
                .instances
                .iter()
                .map(|(k, i)| {
                    (
                        k.clone(),
                        i.clone_with(with.export_instances, with.labels.as_deref()),
                    )
                })
                .collect();
        }

        if with.metrics {
            let len = clone.instances.len();
            let with_data = with.data && with.instances;
            for (key, metric) in &self.metrics {
                if let Some(names) = &with.metrics_names {
                    if !names.contains(key) {
                        continue;
                    }
                }
                clone
                    .metrics
                    .insert(key.clone(), metric.clone_with(with_data, len));
            }
        }
        clone
    }

    /// Zero and unrecord every cell, keeping shape
    pub fn reset(&mut self) {
        let len = self.instances.len();
        for metric in self.metrics.values_mut() {
            metric.reset(len);
        }
    }

    // ---------------------------------------------------------------------
    // Metrics
    // ---------------------------------------------------------------------

    pub fn metric(&self, key: &str) -> Option<&Metric> {
        self.metrics.get(key)
    }

    pub fn metric_mut(&mut self, key: &str) -> Option<&mut Metric> {
        self.metrics.get_mut(key)
    }

    pub fn metrics(&self) -> &HashMap<String, Metric> {
        &self.metrics
    }

    /// Metrics for in-place updates; the set of keys stays fixed
    pub fn metrics_iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Metric)> + '_ {
        self.metrics.iter_mut()
    }

    pub fn metric_keys(&self) -> Vec<String> {
        self.metrics.keys().cloned().collect()
    }

    /// Metric whose display name is `name`
    pub fn display_metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.values().find(|m| m.name() == name)
    }

    /// Key of the metric whose display name is `name`
    pub fn display_metric_key(&self, name: &str) -> Option<&str> {
        self.metrics
            .iter()
            .find(|(_, m)| m.name() == name)
            .map(|(k, _)| k.as_str())
    }

    /// Add a metric with one unrecorded cell per instance
    pub fn new_metric(&mut self, key: impl Into<String>, data_type: DataType) -> Result<&mut Metric> {
        let key = key.into();
        if self.metrics.contains_key(&key) {
            return Err(MatrixError::DuplicateMetricKey(key));
        }
        let metric = Metric::new(key.clone(), data_type, self.instances.len());
        Ok(self.metrics.entry(key).or_insert(metric))
    }

    pub fn new_metric_f64(&mut self, key: impl Into<String>) -> Result<&mut Metric> {
        self.new_metric(key, DataType::Float64)
    }

    pub fn new_metric_u8(&mut self, key: impl Into<String>) -> Result<&mut Metric> {
        self.new_metric(key, DataType::Uint8)
    }

    pub fn new_metric_i64(&mut self, key: impl Into<String>) -> Result<&mut Metric> {
        self.new_metric(key, DataType::Int64)
    }

    /// Existing metric `key`, or a new one of `data_type`
    pub fn metric_or_insert(&mut self, key: &str, data_type: DataType) -> &mut Metric {
        let len = self.instances.len();
        self.metrics
            .entry(key.to_string())
            .or_insert_with(|| Metric::new(key, data_type, len))
    }

    pub fn remove_metric(&mut self, key: &str) -> Option<Metric> {
        self.metrics.remove(key)
    }

    /// Insert or replace metric `key`; its column must hold one cell per instance
    pub fn put_metric(&mut self, key: impl Into<String>, metric: Metric) -> Result<()> {
        if metric.len() != self.instances.len() {
            return Err(MatrixError::UnequalVectors {
                left: metric.len(),
                right: self.instances.len(),
            });
        }
        self.metrics.insert(key.into(), metric);
        Ok(())
    }

    /// Keep only the metrics for which `keep` returns true
    pub fn retain_metrics(&mut self, mut keep: impl FnMut(&str, &Metric) -> bool) {
        self.metrics.retain(|k, m| keep(k, m));
    }

    /// Drop every metric except `key`
    pub fn remove_except_metric(&mut self, key: &str) {
        self.metrics.retain(|k, _| k == key);
    }

    // ---------------------------------------------------------------------
    // Instances
    // ---------------------------------------------------------------------

    pub fn instance(&self, key: &str) -> Option<&Instance> {
        self.instances.get(key)
    }

    pub fn instance_mut(&mut self, key: &str) -> Option<&mut Instance> {
        self.instances.get_mut(key)
    }

    pub fn instances(&self) -> &HashMap<String, Instance> {
        &self.instances
    }

    /// Instances for label and export updates; keys and indices stay fixed
    pub fn instances_iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Instance)> + '_ {
        self.instances.iter_mut()
    }

    pub fn instance_keys(&self) -> Vec<String> {
        self.instances.keys().cloned().collect()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Instances for reading alongside metrics for writing
    pub fn parts_mut(&mut self) -> (&HashMap<String, Instance>, IterMut<'_, String, Metric>) {
        (&self.instances, self.metrics.iter_mut())
    }

    /// Instances for reading alongside metric `key` for writing
    pub fn metric_with_instances(
        &mut self,
        key: &str,
    ) -> Option<(&HashMap<String, Instance>, &mut Metric)> {
        let metric = self.metrics.get_mut(key)?;
        Some((&self.instances, metric))
    }

    /// Add an instance at the next free index
    pub fn new_instance(&mut self, key: impl Into<String>) -> Result<&mut Instance> {
        let key = key.into();
        if self.instances.contains_key(&key) {
            return Err(MatrixError::DuplicateInstanceKey(key));
        }
        let index = self.instances.len();
        for metric in self.metrics.values_mut() {
            metric.append();
        }
        Ok(self.instances.entry(key).or_insert(Instance::new(index)))
    }

    /// Remove an instance and compact every metric column
    pub fn remove_instance(&mut self, key: &str) -> Option<Instance> {
        let removed = self.instances.remove(key)?;
        let deleted = removed.index();
        for metric in self.metrics.values_mut() {
            metric.remove(deleted);
        }
        for instance in self.instances.values_mut() {
            if instance.index() > deleted {
                instance.set_index(instance.index() - 1);
            }
        }
        Some(removed)
    }

    /// Drop all instances; metric columns become empty
    pub fn purge_instances(&mut self) {
        self.instances.clear();
        for metric in self.metrics.values_mut() {
            metric.reset(0);
        }
    }

    /// Unrecord every cell of one instance
    pub fn reset_instance(&mut self, key: &str) {
        if let Some(index) = self.instances.get(key).map(Instance::index) {
            for metric in self.metrics.values_mut() {
                metric.set_value_nan(index);
            }
        }
    }

    /// Map each local instance index to the index of the same key in `prev`
    pub fn index_map(&self, prev: &Matrix) -> Vec<Option<usize>> {
        let mut map = vec![None; self.instances.len()];
        for (key, instance) in &self.instances {
            map[instance.index()] = prev.instance(key).map(Instance::index);
        }
        map
    }

    // ---------------------------------------------------------------------
    // Labels and export
    // ---------------------------------------------------------------------

    pub fn global_labels(&self) -> &HashMap<String, String> {
        &self.global_labels
    }

    pub fn set_global_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.global_labels.insert(key.into(), value.into());
    }

    /// Merge `labels`, keeping values that are already set
    pub fn set_global_labels(&mut self, labels: &HashMap<String, String>) {
        for (k, v) in labels {
            self.global_labels
                .entry(k.clone())
                .or_insert_with(|| v.clone());
        }
    }

    /// Configured export options, or the include-all default
    pub fn export_options(&self) -> ExportOptions {
        self.export_options.clone().unwrap_or_default()
    }

    pub fn has_export_options(&self) -> bool {
        self.export_options.is_some()
    }

    pub fn set_export_options(&mut self, options: ExportOptions) {
        self.export_options = Some(options);
    }

    /// True when every column length equals the instance count and
    /// the instance indices are a permutation of `[0, N)`
    pub fn is_consistent(&self) -> bool {
        let n = self.instances.len();
        let mut seen = vec![false; n];
        for instance in self.instances.values() {
            match seen.get_mut(instance.index()) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        self.metrics.values().all(|m| m.len() == n)
    }
}
