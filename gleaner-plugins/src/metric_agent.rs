// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Derived metrics
//!
//! ```yaml
//! MetricAgent:
//!   compute_metric:
//!     - inode_used_percent PERCENT inode_files_used inode_files_total
//!     - space_total ADD space_available space_used
//!     - space_used_mb DIVIDE space_used 1048576
//! ```
//!
//! Operands are metric names (display name first, then key) or integer
//! literals. Operations fold left to right over the operands.

use crate::error::{PluginError, Result};
use crate::plugin::{DataMap, Plugin, PluginContext, PluginOutput, Remote};
use gleaner::{DataType, Matrix};
use log::{debug, warn};
use std::str::FromStr;

/// Arithmetic of a `compute_metric` rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Percent,
}

impl Operation {
    /// Fold one operand into the running result; dividing by zero gives 0
    pub fn apply(self, acc: f64, v: f64) -> f64 {
        match self {
            Operation::Add => acc + v,
            Operation::Subtract => acc - v,
            Operation::Multiply => acc * v,
            Operation::Divide if v == 0.0 => 0.0,
            Operation::Divide => acc / v,
            Operation::Percent if v == 0.0 => 0.0,
            Operation::Percent => acc / v * 100.0,
        }
    }
}

impl FromStr for Operation {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ADD" => Ok(Operation::Add),
            "SUBTRACT" => Ok(Operation::Subtract),
            "MULTIPLY" => Ok(Operation::Multiply),
            "DIVIDE" => Ok(Operation::Divide),
            "PERCENT" => Ok(Operation::Percent),
            other => Err(PluginError::invalid_param(other, "unknown operation")),
        }
    }
}

/// Right-hand side value
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(f64),
    Metric(String),
}

/// `dst OP a b ...`
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeRule {
    pub metric: String,
    pub operation: Operation,
    pub operands: Vec<Operand>,
}

impl ComputeRule {
    pub fn parse(line: &str) -> Result<ComputeRule> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(PluginError::invalid_rule(
                "compute_metric",
                line,
                "expected metric OPERATION a b ...",
            ));
        }
        let operation = fields[1].parse()?;
        let operands = fields[2..]
            .iter()
            .map(|f| match f.parse::<i64>() {
                Ok(n) => Operand::Literal(n as f64),
                Err(_) => Operand::Metric(f.to_string()),
            })
            .collect();
        Ok(ComputeRule {
            metric: fields[0].to_string(),
            operation,
            operands,
        })
    }
}

fn metric_key(matrix: &Matrix, name: &str) -> Option<String> {
    matrix
        .display_metric_key(name)
        .or_else(|| matrix.metric(name).map(|_| name))
        .map(String::from)
}

/// Plugin evaluating `compute_metric` rules
pub struct MetricAgent {
    ctx: PluginContext,
    rules: Vec<ComputeRule>,
}

impl MetricAgent {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            ctx,
            rules: Vec::new(),
        }
    }

    fn compute(&self, rule: &ComputeRule, matrix: &mut Matrix) -> Result<()> {
        if !matches!(rule.operands.first(), Some(Operand::Metric(_))) {
            return Ok(());
        }

        // resolve metric operands to keys once
        let mut keys = Vec::with_capacity(rule.operands.len());
        for operand in &rule.operands {
            match operand {
                Operand::Literal(_) => keys.push(None),
                Operand::Metric(name) => match metric_key(matrix, name) {
                    Some(key) => keys.push(Some(key)),
                    None => {
                        warn!("{} metric [{}] not found", self.ctx.prefix(), name);
                        return Ok(());
                    }
                },
            }
        }
        let Some(Some(first_key)) = keys.first().cloned() else {
            return Ok(());
        };

        let mut results = Vec::with_capacity(matrix.instance_count());
        for instance in matrix.instances().values() {
            let Some(mut acc) = matrix
                .metric(&first_key)
                .and_then(|m| m.value_f64(instance))
            else {
                continue;
            };
            for (operand, key) in rule.operands.iter().zip(&keys).skip(1) {
                let v = match (operand, key) {
                    (Operand::Literal(v), _) => *v,
                    (Operand::Metric(_), Some(key)) => matrix
                        .metric(key)
                        .and_then(|m| m.value_f64(instance))
                        .unwrap_or(0.0),
                    (Operand::Metric(_), None) => 0.0,
                };
                acc = rule.operation.apply(acc, v);
            }
            results.push((instance.index(), acc));
        }

        let key = metric_key(matrix, &rule.metric).unwrap_or_else(|| rule.metric.clone());
        let target = matrix.metric_or_insert(&key, DataType::Float64);
        for (index, value) in results {
            target.set_value_f64(index, value)?;
        }
        Ok(())
    }
}

impl Plugin for MetricAgent {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    fn init(&mut self, _remote: &Remote) -> Result<()> {
        if let Some(group) = self.ctx.params.child("compute_metric") {
            for line in group.all_child_contents() {
                match ComputeRule::parse(line) {
                    Ok(rule) => self.rules.push(rule),
                    Err(e) => warn!("{} dropping rule: {}", self.ctx.prefix(), e),
                }
            }
        }
        if self.rules.is_empty() {
            return Err(PluginError::MissingParam("valid rules".into()));
        }
        debug!("{} parsed {} compute_metric rules", self.ctx.prefix(), self.rules.len());
        Ok(())
    }

    fn run(&mut self, data: &mut DataMap) -> Result<PluginOutput> {
        let matrix = self.ctx.matrix(data)?;
        for rule in &self.rules {
            self.compute(rule, matrix)?;
        }
        Ok(PluginOutput::none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gleaner::Node;

    fn agent(yaml: &str) -> MetricAgent {
        let params = Node::from_yaml_str("MetricAgent", yaml).unwrap();
        let ctx = PluginContext::new("Rest", "MetricAgent", "volume", params, Node::new("volume"));
        let mut a = MetricAgent::new(ctx);
        a.init(&Remote::default()).unwrap();
        a
    }

    fn data() -> DataMap {
        let mut m = Matrix::new("Rest", "volume", "volume");
        m.new_metric_f64("used").unwrap();
        m.new_metric_f64("total").unwrap().set_name("size_total");
        m.new_instance("v1").unwrap();
        m.new_instance("v2").unwrap();
        m.lazy_set_value("used", "v1", 25.0).unwrap();
        m.lazy_set_value("total", "v1", 200.0).unwrap();
        m.lazy_set_value("total", "v2", 0.0).unwrap();
        let mut d = DataMap::new();
        d.insert("volume".into(), m);
        d
    }

    #[test]
    fn test_parse() {
        let r = ComputeRule::parse("space_total ADD space_available space_used 10").unwrap();
        assert_eq!(r.operation, Operation::Add);
        assert_eq!(r.operands.len(), 3);
        assert_eq!(r.operands[2], Operand::Literal(10.0));
        assert!(ComputeRule::parse("x ADD a").is_err());
        assert!(ComputeRule::parse("x POWER a b").is_err());
    }

    #[test]
    fn test_percent_by_display_name() {
        let mut a = agent("compute_metric:\n  - used_percent PERCENT used size_total\n");
        let mut d = data();
        a.run(&mut d).unwrap();
        let m = &d["volume"];
        assert_relative_eq!(m.lazy_value_f64("used_percent", "v1").unwrap(), 12.5);
        // first operand unrecorded
        assert_eq!(m.lazy_value_f64("used_percent", "v2"), None);
    }

    #[test]
    fn test_divide_by_zero_and_literal() {
        let mut a = agent(
            "compute_metric:\n  - ratio DIVIDE total used\n  - total_mb DIVIDE total 2\n",
        );
        let mut d = data();
        d.get_mut("volume")
            .unwrap()
            .lazy_set_value("used", "v2", 0.0)
            .unwrap();
        a.run(&mut d).unwrap();
        let m = &d["volume"];
        assert_relative_eq!(m.lazy_value_f64("ratio", "v1").unwrap(), 8.0);
        assert_eq!(m.lazy_value_f64("ratio", "v2"), Some(0.0));
        assert_relative_eq!(m.lazy_value_f64("total_mb", "v1").unwrap(), 100.0);
    }
}
