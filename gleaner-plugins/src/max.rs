// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Group maximum
//!
//! Same rules as the [`Aggregator`](crate::aggregator::Aggregator), but every
//! metric gets its own output matrix holding the largest value seen in each
//! group. Carried labels come from the instance that holds the maximum.

use crate::aggregator::rule::GroupRule;
use crate::error::{PluginError, Result};
use crate::plugin::{DataMap, Metadata, Plugin, PluginContext, PluginOutput, Remote};
use gleaner::{ExportOptions, Matrix, With};
use log::debug;
use std::collections::BTreeMap;

/// Group-maximum plugin
pub struct Max {
    ctx: PluginContext,
    rules: Vec<GroupRule>,
}

impl Max {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            ctx,
            rules: Vec::new(),
        }
    }
}

impl Plugin for Max {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    fn init(&mut self, _remote: &Remote) -> Result<()> {
        for line in self.ctx.params.all_child_contents() {
            if !line.is_empty() {
                self.rules.push(GroupRule::parse(line)?);
            }
        }
        if self.rules.is_empty() {
            return Err(PluginError::MissingParam("max rules".into()));
        }
        debug!("{} parsed {} max rules", self.ctx.prefix(), self.rules.len());
        Ok(())
    }

    fn run(&mut self, data: &mut DataMap) -> Result<PluginOutput> {
        let input: &Matrix = self.ctx.matrix(data)?;

        // one matrix per (rule, metric), ordered for stable output
        let mut outputs: BTreeMap<(usize, String), Matrix> = BTreeMap::new();
        for (i, rule) in self.rules.iter().enumerate() {
            for mkey in input.metrics().keys() {
                let mut out = input.clone_with(&With::metrics_only());
                out.remove_except_metric(mkey);
                out.object = rule.output_object(&input.object);
                out.uuid = format!("{}.{}{}", input.uuid, i, mkey);
                out.set_export_options(ExportOptions::default());
                out.set_exportable(true);
                outputs.insert((i, mkey.clone()), out);
            }
        }

        for instance in input.instances().values() {
            if !instance.is_exportable() {
                continue;
            }
            for (i, rule) in self.rules.iter().enumerate() {
                let name = instance.label_or_empty(&rule.label);
                if name.is_empty() || !rule.accepts(instance) {
                    continue;
                }
                for (mkey, metric) in input.metrics() {
                    let Some(out) = outputs.get_mut(&(i, mkey.clone())) else {
                        continue;
                    };
                    let index = match out.instance(name) {
                        Some(existing) => existing.index(),
                        None => out.new_instance(name)?.index(),
                    };
                    let Some(value) = metric.value_f64(instance) else {
                        continue;
                    };
                    let Some(out_metric) = out.metric_mut(mkey) else {
                        continue;
                    };
                    let larger = match out_metric.value_f64(index) {
                        Some(current) => value > current,
                        None => true,
                    };
                    if larger {
                        out_metric.set_value_f64(index, value)?;
                        if let Some(target) = out.instance_mut(name) {
                            rule.carry_labels(name, instance, target);
                        }
                    }
                }
            }
        }

        let matrices: Vec<Matrix> = outputs.into_values().collect();
        let metadata = Metadata {
            plugin_instances: matrices.iter().map(|m| m.instance_count() as u64).sum(),
            ..Default::default()
        };
        Ok(PluginOutput::with_matrices(matrices).with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner::Node;

    #[test]
    fn test_max_per_group() {
        let params = Node::from_yaml_str("Max", "- node<>node_max ...\n").unwrap();
        let ctx = PluginContext::new("ZapiPerf", "Max", "disk", params, Node::new("disk"));
        let mut plugin = Max::new(ctx);
        plugin.init(&Remote::default()).unwrap();

        let mut m = Matrix::new("ZapiPerf", "disk", "disk");
        m.new_metric_f64("busy").unwrap();
        m.new_metric_f64("io").unwrap();
        for (key, node, busy, io) in [
            ("d1", "n1", 30.0, 5.0),
            ("d2", "n1", 80.0, 2.0),
            ("d3", "n2", 10.0, 9.0),
        ] {
            let i = m.new_instance(key).unwrap();
            i.set_label("node", node);
            i.set_label("disk", key);
            m.lazy_set_value("busy", key, busy).unwrap();
            m.lazy_set_value("io", key, io).unwrap();
        }
        let mut d = DataMap::new();
        d.insert("disk".into(), m);

        let out = plugin.run(&mut d).unwrap();
        assert_eq!(out.matrices.len(), 2);
        let busy = out
            .matrices
            .iter()
            .find(|m| m.metric("busy").is_some())
            .unwrap();
        assert_eq!(busy.object, "node_max");
        assert!(busy.metric("io").is_none());
        assert_eq!(busy.lazy_value_f64("busy", "n1"), Some(80.0));
        assert_eq!(busy.lazy_value_f64("busy", "n2"), Some(10.0));
        // labels of the maximum holder
        assert_eq!(busy.instance("n1").unwrap().label("disk"), Some("d2"));

        let io = out.matrices.iter().find(|m| m.metric("io").is_some()).unwrap();
        assert_eq!(io.lazy_value_f64("io", "n1"), Some(5.0));
        assert_eq!(io.instance("n1").unwrap().label("disk"), Some("d1"));
    }
}
