// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Group-by summarization
//!
//! Each rule produces one output matrix whose instances are groups of the
//! input instances. Plain metrics are summed, latencies are weighted by their
//! ops counter and averages are divided by the number of contributors.

pub mod rule;

use crate::error::{PluginError, Result};
use crate::plugin::{DataMap, Metadata, Plugin, PluginContext, PluginOutput, Remote};
use gleaner::{ExportOptions, Matrix, Metric, Property, With};
use log::{debug, warn};
use rule::GroupRule;
use std::collections::HashMap;

/// True for latency counters, which are weighted by their ops counter
pub(crate) fn is_latency(name: &str) -> bool {
    name.ends_with("_latency")
}

/// True when a summed cell must be divided by its weight
fn is_average(metric: &Metric) -> bool {
    let name = metric.name();
    matches!(metric.property(), Some(Property::Average | Property::Percent))
        || name.contains("avg_")
        || name.contains("average_")
        || (is_latency(name) && !metric.is_histogram())
}

/// Weights per (group key, metric key) for one output matrix
type Weights = HashMap<(String, String), f64>;

/// Group-by plugin
pub struct Aggregator {
    ctx: PluginContext,
    rules: Vec<GroupRule>,
}

impl Aggregator {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            ctx,
            rules: Vec::new(),
        }
    }

    pub fn rules(&self) -> &[GroupRule] {
        &self.rules
    }

    fn new_output(&self, rule: &GroupRule, input: &Matrix) -> Matrix {
        let mut out = input.clone_with(&With::metrics_only());
        out.object = rule.output_object(&input.object);
        out.uuid = format!("{}.Aggregator", input.uuid);
        out.set_export_options(ExportOptions::default());
        out.set_exportable(true);
        out
    }

    fn normalize(out: &mut Matrix, weights: &Weights) -> Result<()> {
        let (instances, metrics) = out.parts_mut();
        for (mkey, metric) in metrics {
            if !is_average(metric) {
                continue;
            }
            for (ikey, instance) in instances {
                let Some(sum) = metric.value_f64(instance) else {
                    continue;
                };
                let Some(&weight) = weights.get(&(ikey.clone(), mkey.clone())) else {
                    continue;
                };
                let value = if weight == 0.0 { 0.0 } else { sum / weight };
                metric.set_value_f64(instance, value)?;
            }
        }
        Ok(())
    }
}

impl Plugin for Aggregator {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    fn init(&mut self, _remote: &Remote) -> Result<()> {
        let lines: Vec<String> = self
            .ctx
            .params
            .children()
            .iter()
            .filter(|c| c.name().is_empty())
            .map(|c| c.content().to_string())
            .collect();
        for line in lines {
            self.rules.push(GroupRule::parse(&line)?);
        }
        if self.rules.is_empty() {
            return Err(PluginError::MissingParam("aggregation rules".into()));
        }
        debug!("{} parsed {} aggregation rules", self.ctx.prefix(), self.rules.len());
        Ok(())
    }

    fn run(&mut self, data: &mut DataMap) -> Result<PluginOutput> {
        let input: &Matrix = self.ctx.matrix(data)?;

        let mut outputs: Vec<Matrix> = self
            .rules
            .iter()
            .map(|r| self.new_output(r, input))
            .collect();
        let mut weights: Vec<Weights> = vec![Weights::new(); self.rules.len()];

        for instance in input.instances().values() {
            if !instance.is_exportable() {
                continue;
            }
            for (i, rule) in self.rules.iter().enumerate() {
                let name = instance.label_or_empty(&rule.label);
                if name.is_empty() {
                    warn!(
                        "{} label [{}] missing, instance skipped",
                        self.ctx.prefix(),
                        rule.label
                    );
                    continue;
                }
                if !rule.accepts(instance) {
                    continue;
                }

                let key = rule.group_key(name, instance);
                let out = &mut outputs[i];
                let index = match out.instance(&key) {
                    Some(existing) => existing.index(),
                    None => {
                        let created = out.new_instance(key.as_str())?;
                        rule.carry_labels(name, instance, created);
                        created.index()
                    }
                };

                for (mkey, metric) in input.metrics() {
                    let Some(value) = metric.value_f64(instance) else {
                        continue;
                    };
                    let Some(out_metric) = out.metric_mut(mkey) else {
                        continue;
                    };

                    let mut amount = value;
                    let mut weight = 1.0;
                    if is_latency(metric.name()) && !metric.comment().is_empty() {
                        if let Some(ops_metric) = input.metric(metric.comment()) {
                            let Some(ops) = ops_metric.value_f64(instance) else {
                                continue;
                            };
                            amount = ops * value;
                            weight = ops;
                        }
                    }
                    out_metric.add_value(index, amount)?;
                    *weights[i].entry((key.clone(), mkey.clone())).or_insert(0.0) += weight;
                }
            }
        }

        for (out, w) in outputs.iter_mut().zip(&weights) {
            Self::normalize(out, w)?;
        }

        let metadata = Metadata {
            plugin_instances: outputs.iter().map(|m| m.instance_count() as u64).sum(),
            ..Default::default()
        };
        Ok(PluginOutput::with_matrices(outputs).with_metadata(metadata))
    }
}
