// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! FlexGroup volume rollup
//!
//! Volumes named `<prefix>__NNNN` are constituents of the flexgroup
//! `<prefix>`. The plugin emits one summed instance per flexgroup, with
//! latencies weighted by their ops counter, and a `volume_aggr` matrix
//! listing the aggregates each flexgroup spans.

use crate::aggregator::is_latency;
use crate::error::{PluginError, Result};
use crate::plugin::{DataMap, Metadata, Plugin, PluginContext, PluginOutput, Remote};
use gleaner::{DataType, Matrix, With};
use log::{debug, warn};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

const CONSTITUENT_PATTERN: &str = r"^(.*)__(\d{4})$";
const TEMP_PREFIX: &str = "temp_";

/// Output object of the aggregate list
pub const VOLUME_AGGR_OBJECT: &str = "volume_aggr";

/// A constituent and the flexgroup it belongs to
struct Member {
    key: String,
    group_key: String,
    group_name: String,
}

/// Volume-to-flexgroup rollup plugin
pub struct FlexGroup {
    ctx: PluginContext,
    pattern: Option<Regex>,
    include_constituents: bool,
}

impl FlexGroup {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            ctx,
            pattern: None,
            include_constituents: false,
        }
    }

    fn members(&self, input: &Matrix) -> Vec<Member> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };
        let mut members: Vec<Member> = input
            .instances()
            .iter()
            .filter_map(|(key, instance)| {
                let caps = pattern.captures(instance.label_or_empty("volume"))?;
                let name = caps.get(1)?.as_str();
                Some(Member {
                    key: key.clone(),
                    group_key: format!("{}.{}", instance.label_or_empty("svm"), name),
                    group_name: name.to_string(),
                })
            })
            .collect();
        members.sort_by(|a, b| a.key.cmp(&b.key));
        members
    }

    fn rollup(&self, input: &Matrix, members: &[Member]) -> Result<(Matrix, Matrix)> {
        let mut cache = input.clone_with(&With::metrics_only());
        cache.uuid = format!("{}.FlexGroup", input.uuid);
        cache.set_exportable(true);
        let mut aggrs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        // (flexgroup, metric) cells with a constituent that did not report
        let mut partial: BTreeSet<(String, String)> = BTreeSet::new();

        for m in members {
            let Some(instance) = input.instance(&m.key) else {
                continue;
            };
            if cache.instance(&m.group_key).is_none() {
                let fg = cache.new_instance(m.group_key.as_str())?;
                fg.set_labels(instance.labels().clone());
                fg.set_label("volume", m.group_name.as_str());
                fg.set_label("style", "flexgroup");
                fg.remove_label("node");
                fg.remove_label("uuid");
            }
            let aggr = instance.label_or_empty("aggr");
            let entry = aggrs.entry(m.group_key.clone()).or_default();
            if !aggr.is_empty() {
                entry.insert(aggr.to_string());
            }
        }

        for m in members {
            let (Some(instance), Some(index)) = (
                input.instance(&m.key),
                cache.instance(&m.group_key).map(|i| i.index()),
            ) else {
                continue;
            };
            for (mkey, metric) in input.metrics() {
                let Some(value) = metric.value_f64(instance) else {
                    partial.insert((m.group_key.clone(), mkey.clone()));
                    continue;
                };
                if is_latency(metric.name()) && !metric.comment().is_empty() {
                    let Some(ops) = input
                        .metric(metric.comment())
                        .and_then(|o| o.value_f64(instance))
                    else {
                        partial.insert((m.group_key.clone(), mkey.clone()));
                        continue;
                    };
                    if let Some(target) = cache.metric_mut(mkey) {
                        target.add_value(index, ops * value)?;
                    }
                    if value != 0.0 {
                        let temp = format!("{}{}", TEMP_PREFIX, metric.comment());
                        cache
                            .metric_or_insert(&temp, DataType::Float64)
                            .add_value(index, ops)?;
                    }
                } else if let Some(target) = cache.metric_mut(mkey) {
                    target.add_value(index, value)?;
                }
            }
        }

        Self::normalize_latency(&mut cache)?;
        cache.retain_metrics(|k, _| !k.starts_with(TEMP_PREFIX));
        for (group_key, mkey) in &partial {
            let Some(index) = cache.instance(group_key).map(|i| i.index()) else {
                continue;
            };
            if let Some(metric) = cache.metric_mut(mkey) {
                metric.set_value_nan(index);
            }
        }
        if !partial.is_empty() {
            debug!(
                "{} {} flexgroup cells left unrecorded on missing constituent data",
                self.ctx.prefix(),
                partial.len()
            );
        }

        let mut volume_aggr = Matrix::new(
            format!("{}.FlexGroupAggr", input.uuid),
            VOLUME_AGGR_OBJECT,
            VOLUME_AGGR_OBJECT,
        );
        volume_aggr.set_global_labels(input.global_labels());
        volume_aggr.new_metric_u8("labels")?;
        for (group_key, set) in &aggrs {
            let joined = set.iter().cloned().collect::<Vec<_>>().join(",");
            let Some(fg) = cache.instance_mut(group_key) else {
                continue;
            };
            fg.set_label("aggr", joined.as_str());
            let (volume, svm) = (
                fg.label_or_empty("volume").to_string(),
                fg.label_or_empty("svm").to_string(),
            );

            let row = volume_aggr.new_instance(group_key.as_str())?;
            row.set_label("volume", volume);
            row.set_label("svm", svm);
            row.set_label("aggr", joined);
            let index = row.index();
            if let Some(labels) = volume_aggr.metric_mut("labels") {
                labels.set_value_u8(index, 1)?;
            }
        }
        Ok((cache, volume_aggr))
    }

    /// Divide weighted latency sums by the ops that carried a latency
    fn normalize_latency(cache: &mut Matrix) -> Result<()> {
        let latencies: Vec<(String, String)> = cache
            .metrics()
            .iter()
            .filter(|(_, m)| is_latency(m.name()) && !m.comment().is_empty())
            .map(|(k, m)| (k.clone(), format!("{}{}", TEMP_PREFIX, m.comment())))
            .collect();
        let indices: Vec<usize> = cache.instances().values().map(|i| i.index()).collect();

        for (key, temp) in latencies {
            let weights: Vec<Option<f64>> = indices
                .iter()
                .map(|&i| cache.metric(&temp).and_then(|t| t.value_f64(i)))
                .collect();
            let Some(metric) = cache.metric_mut(&key) else {
                continue;
            };
            for (&i, weight) in indices.iter().zip(weights) {
                let Some(sum) = metric.value_f64(i) else {
                    continue;
                };
                match weight {
                    Some(w) if w != 0.0 => metric.set_value_f64(i, sum / w)?,
                    _ => metric.set_value_nan(i),
                }
            }
        }
        Ok(())
    }
}

impl Plugin for FlexGroup {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    fn init(&mut self, _remote: &Remote) -> Result<()> {
        self.pattern = Some(Regex::new(CONSTITUENT_PATTERN)?);
        if let Some(raw) = self.ctx.params.child_content("include_constituents") {
            self.include_constituents = raw.parse().map_err(|_| {
                PluginError::invalid_param("include_constituents", "expected true or false")
            })?;
        }
        Ok(())
    }

    fn run(&mut self, data: &mut DataMap) -> Result<PluginOutput> {
        let input = self.ctx.matrix(data)?;
        let members = self.members(input);
        if members.is_empty() {
            return Ok(PluginOutput::none());
        }

        let (cache, volume_aggr) = self.rollup(input, &members)?;
        debug!(
            "{} extracted {} flexgroup volumes from {} constituents",
            self.ctx.prefix(),
            cache.instance_count(),
            members.len()
        );

        for m in &members {
            match input.instance_mut(&m.key) {
                Some(instance) => {
                    instance.set_label("style", "flexgroup_constituent");
                    instance.set_exportable(self.include_constituents);
                }
                None => warn!("{} constituent {} vanished", self.ctx.prefix(), m.key),
            }
        }

        let metadata = Metadata {
            plugin_instances: cache.instance_count() as u64,
            ..Default::default()
        };
        Ok(PluginOutput::with_matrices(vec![cache, volume_aggr]).with_metadata(metadata))
    }
}
