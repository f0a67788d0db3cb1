// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Change detection between successive polls
//!
//! [`ChangeLog`] keeps a trimmed snapshot of the previous poll and emits a
//! `change` matrix with one instance per create, update or delete. Instances
//! are matched across polls by their `uuid` label.

pub mod config;

use crate::error::Result;
use crate::plugin::{DataMap, Metadata, Plugin, PluginContext, PluginOutput, Remote};
use chrono::Utc;
use config::Entry;
use gleaner::{ExportOptions, Instance, Matrix, With};
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Object name of the output matrix
pub const OBJECT_CHANGE_LOG: &str = "change";
/// Metric holding the Unix time of the change
pub const LOG_METRIC: &str = "log";

const UUID_LABEL: &str = "uuid";

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Update,
    Delete,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Create => "create",
            Op::Update => "update",
            Op::Delete => "delete",
        }
    }
}

/// What changed on an update
#[derive(Debug, Clone)]
struct Tracked {
    category: &'static str,
    name: String,
    old_value: String,
    new_value: String,
}

#[derive(Debug, Clone)]
struct Change {
    key: String,
    op: Op,
    labels: HashMap<String, String>,
    tracked: Option<Tracked>,
}

/// Change tracking plugin
pub struct ChangeLog {
    ctx: PluginContext,
    entry: Entry,
    matrix_name: String,
    previous: Option<Matrix>,
    index: u32,
    metrics_count: usize,
}

impl ChangeLog {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            ctx,
            entry: Entry::default(),
            matrix_name: String::new(),
            previous: None,
            index: 0,
            metrics_count: 0,
        }
    }

    /// Current value of the rotating `index` label
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    fn source_object(&self) -> &str {
        self.ctx
            .parent_params
            .child_content("object")
            .unwrap_or(self.ctx.object.as_str())
    }

    /// Labels only, plus the tracked metrics
    fn snapshot(&self, current: &Matrix) -> Matrix {
        let mut labels: Vec<String> = self.entry.publish_labels.clone();
        let mut metrics = HashSet::new();
        for name in &self.entry.track {
            match current.display_metric_key(name) {
                Some(key) => {
                    metrics.insert(key.to_string());
                }
                None => labels.push(name.clone()),
            }
        }
        labels.push(UUID_LABEL.to_string());

        current.clone_with(&With {
            data: true,
            metrics: !metrics.is_empty(),
            instances: true,
            export_instances: false,
            labels: if self.entry.include_all {
                None
            } else {
                Some(labels)
            },
            metrics_names: Some(metrics),
        })
    }

    /// Labels identifying the changed instance
    fn publish_labels(&self, object: &str, instance: &Instance) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        if !self.entry.publish_labels.is_empty() {
            for l in &self.entry.publish_labels {
                match instance.label(l) {
                    Some(v) if !v.is_empty() => {
                        labels.insert(l.clone(), v.to_string());
                    }
                    _ => warn!("{} {} missing label {}", self.ctx.prefix(), object, l),
                }
            }
        } else if self.entry.include_all {
            labels = instance.labels().clone();
        } else {
            warn!("{} {} missing publish labels", self.ctx.prefix(), object);
        }
        labels
    }

    /// Tracked metrics whose cell changed, by current instance key
    fn compare_metrics(
        current: &Matrix,
        previous: &Matrix,
        prev_by_uuid: &HashMap<String, String>,
    ) -> HashMap<String, BTreeSet<String>> {
        let mut changes: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (mkey, prev_metric) in previous.metrics() {
            let Some(cur_metric) = current.metric(mkey) else {
                continue;
            };
            for (key, instance) in current.instances() {
                let Some(prev_instance) = prev_by_uuid
                    .get(instance.label_or_empty(UUID_LABEL))
                    .and_then(|k| previous.instance(k))
                else {
                    continue;
                };
                let cur = cur_metric.value_f64(instance);
                let old = prev_metric.value_f64(prev_instance);
                if cur != old {
                    changes
                        .entry(key.clone())
                        .or_default()
                        .insert(format!("{}_{}", current.object, cur_metric.name()));
                }
            }
        }
        changes
    }

    fn new_matrix(&self) -> Result<Matrix> {
        let mut m = Matrix::new(
            format!("{}{}", self.ctx.parent, self.matrix_name),
            OBJECT_CHANGE_LOG,
            self.matrix_name.as_str(),
        );
        m.set_export_options(ExportOptions::default());
        m.new_metric_i64(LOG_METRIC)?;
        Ok(m)
    }

    fn add_row(&mut self, out: &mut Matrix, object: &str, change: Change, time: i64) {
        let instance = match out.new_instance(change.key.as_str()) {
            Ok(i) => i,
            Err(e) => {
                warn!("{} {} change row: {}", self.ctx.prefix(), object, e);
                return;
            }
        };
        instance.set_label("object", object);
        instance.set_label("op", change.op.as_str());
        instance.set_label("index", self.index.to_string());
        for (k, v) in change.labels {
            instance.set_label(k, v);
        }
        if let Some(t) = change.tracked {
            instance.set_label("category", t.category);
            instance.set_label("track", t.name);
            instance.set_label("old_value", t.old_value);
            instance.set_label("new_value", t.new_value);
        }
        self.metrics_count += instance.labels().len();
        let index = instance.index();
        if let Some(log) = out.metric_mut(LOG_METRIC) {
            if let Err(e) = log.set_value_i64(index, time) {
                warn!("{} {} log metric: {}", self.ctx.prefix(), object, e);
            }
        }
    }

    fn detect(&self, current: &Matrix, previous: &Matrix) -> Vec<Change> {
        let object = current.object.as_str();
        let mut changes = Vec::new();

        let mut prev_by_uuid: HashMap<String, String> = HashMap::new();
        let mut unmatched: BTreeSet<&str> = BTreeSet::new();
        for (key, instance) in previous.instances() {
            let uuid = instance.label_or_empty(UUID_LABEL);
            if uuid.is_empty() {
                warn!("{} {} missing uuid for {}", self.ctx.prefix(), object, key);
                continue;
            }
            prev_by_uuid.insert(uuid.to_string(), key.clone());
            unmatched.insert(key.as_str());
        }

        let metric_changes = Self::compare_metrics(current, previous, &prev_by_uuid);

        // sorted for stable row order
        let current_sorted: BTreeMap<&String, &Instance> = current.instances().iter().collect();
        for (key, instance) in current_sorted {
            let uuid = instance.label_or_empty(UUID_LABEL);
            if uuid.is_empty() {
                warn!("{} {} missing uuid for {}", self.ctx.prefix(), object, key);
                continue;
            }
            let prev_instance = match prev_by_uuid.get(uuid) {
                Some(prev_key) => {
                    unmatched.remove(prev_key.as_str());
                    previous.instance(prev_key)
                }
                None => None,
            };
            let Some(prev_instance) = prev_instance else {
                changes.push(Change {
                    key: format!("{}_{}", uuid, object),
                    op: Op::Create,
                    labels: self.publish_labels(object, instance),
                    tracked: None,
                });
                continue;
            };

            let (cur, old) = instance.compare_diffs(prev_instance, &self.entry.track);
            let cur: BTreeMap<String, String> = cur.into_iter().collect();
            for (label, new_value) in cur {
                changes.push(Change {
                    key: format!("{}_{}_{}", uuid, object, label),
                    op: Op::Update,
                    labels: self.publish_labels(object, instance),
                    tracked: Some(Tracked {
                        category: "label",
                        old_value: old.get(&label).cloned().unwrap_or_default(),
                        name: label,
                        new_value,
                    }),
                });
            }

            if let Some(names) = metric_changes.get(key) {
                for name in names {
                    changes.push(Change {
                        key: format!("{}_{}_{}", uuid, object, name),
                        op: Op::Update,
                        labels: self.publish_labels(object, instance),
                        tracked: Some(Tracked {
                            category: "metric",
                            name: name.clone(),
                            old_value: String::new(),
                            new_value: String::new(),
                        }),
                    });
                }
            }
        }

        for key in unmatched {
            let Some(prev_instance) = previous.instance(key) else {
                continue;
            };
            let uuid = prev_instance.label_or_empty(UUID_LABEL);
            changes.push(Change {
                key: format!("{}_{}", uuid, object),
                op: Op::Delete,
                labels: self.publish_labels(object, prev_instance),
                tracked: None,
            });
        }
        changes
    }
}

impl Plugin for ChangeLog {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    fn init(&mut self, _remote: &Remote) -> Result<()> {
        let object = self.source_object().to_string();
        self.matrix_name = format!("{}_{}", object, OBJECT_CHANGE_LOG);
        self.entry = Entry::resolve(&object, &self.ctx.params, &self.ctx.parent_params)?;
        Ok(())
    }

    fn run(&mut self, data: &mut DataMap) -> Result<PluginOutput> {
        let current: &Matrix = self.ctx.matrix(data)?;
        self.metrics_count = 0;

        let Some(previous) = self.previous.take() else {
            self.previous = Some(self.snapshot(current));
            return Ok(PluginOutput::none());
        };

        let mut out = self.new_matrix()?;
        out.set_global_labels(current.global_labels());
        let object = current.object.clone();
        let now = Utc::now().timestamp();

        let changes = self.detect(current, &previous);
        for change in changes {
            self.add_row(&mut out, &object, change, now);
        }

        self.previous = Some(self.snapshot(current));

        let rows = out.instance_count();
        if rows > 0 {
            self.index = (self.index + 1) % 100;
            info!(
                "{} collected {} change instances, {} metrics, index {}",
                self.ctx.prefix(),
                rows,
                self.metrics_count,
                self.index
            );
        }

        let metadata = Metadata {
            plugin_instances: rows as u64,
            ..Default::default()
        };
        Ok(PluginOutput::with_matrices(vec![out]).with_metadata(metadata))
    }
}
