// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Declarative label rules
//!
//! The [`LabelAgent`] rewrites instance labels, toggles instance export and
//! maps label values to a small numeric metric. Rule groups run in the order
//! they first appear in the parameters; rules inside a group run in the
//! order declared.
//!
//! ```yaml
//! LabelAgent:
//!   split:
//!     - node `/` ,aggr,plex,disk
//!   exclude_equals:
//!     - style `flexgroup_constituent`
//!   value_to_num:
//!     - new_status state online online `0`
//! ```

pub mod rules;

use crate::error::{PluginError, Result};
use crate::plugin::{DataMap, Plugin, PluginContext, PluginOutput, Remote};
use gleaner::{DataType, Matrix};
use log::{debug, error, warn};
use rules::{FilterRule, Rule, RuleKind, ValueToNumRule};

/// One step of the run: a group of rules of the same kind
#[derive(Debug)]
enum Action {
    Labels(Vec<Rule>),
    /// All exclude and include rules, evaluated together
    Filter {
        excludes: Vec<FilterRule>,
        includes: Vec<FilterRule>,
    },
    ValueToNum(Vec<ValueToNumRule>),
}

/// Label rewriting plugin
pub struct LabelAgent {
    ctx: PluginContext,
    actions: Vec<Action>,
}

impl LabelAgent {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            ctx,
            actions: Vec::new(),
        }
    }

    /// Number of valid rules across all actions
    pub fn rule_count(&self) -> usize {
        self.actions
            .iter()
            .map(|a| match a {
                Action::Labels(r) => r.len(),
                Action::Filter { excludes, includes } => excludes.len() + includes.len(),
                Action::ValueToNum(r) => r.len(),
            })
            .sum()
    }

    fn parse_rules(&mut self) -> usize {
        let mut actions: Vec<Action> = Vec::new();
        let mut filter_slot: Option<usize> = None;
        let mut seen: Vec<RuleKind> = Vec::new();

        for group in self.ctx.params.children() {
            let kind = match group.name().parse::<RuleKind>() {
                Ok(kind) => kind,
                Err(_) => {
                    warn!("{} unknown rule group {:?}", self.ctx.prefix(), group.name());
                    continue;
                }
            };
            if seen.contains(&kind) {
                continue;
            }
            seen.push(kind);

            let mut parsed = Vec::new();
            for line in group.all_child_contents() {
                match Rule::parse(kind, line) {
                    Ok(rule) => parsed.push(rule),
                    Err(e) => warn!("{} dropping rule: {}", self.ctx.prefix(), e),
                }
            }
            if parsed.is_empty() {
                continue;
            }

            if kind.is_filter() {
                let slot = *filter_slot.get_or_insert_with(|| {
                    actions.push(Action::Filter {
                        excludes: Vec::new(),
                        includes: Vec::new(),
                    });
                    actions.len() - 1
                });
                if let Some(Action::Filter { excludes, includes }) = actions.get_mut(slot) {
                    for rule in parsed {
                        match rule {
                            Rule::Exclude(f) => excludes.push(f),
                            Rule::Include(f) => includes.push(f),
                            _ => {}
                        }
                    }
                }
            } else if matches!(kind, RuleKind::ValueToNum | RuleKind::ValueToNumRegex) {
                let mapped = parsed
                    .into_iter()
                    .filter_map(|r| match r {
                        Rule::ValueToNum(v) => Some(v),
                        _ => None,
                    })
                    .collect();
                actions.push(Action::ValueToNum(mapped));
            } else {
                actions.push(Action::Labels(parsed));
            }
        }

        self.actions = actions;
        self.rule_count()
    }

    fn apply_labels(rules: &[Rule], matrix: &mut Matrix) {
        for rule in rules {
            for (_, instance) in matrix.instances_iter_mut() {
                match rule {
                    Rule::Split(r) => r.apply(instance),
                    Rule::SplitRegex(r) => r.apply(instance),
                    Rule::SplitPairs(r) => r.apply(instance),
                    Rule::Join(r) => r.apply(instance),
                    Rule::Replace(r) => r.apply(instance),
                    Rule::ReplaceRegex(r) => r.apply(instance),
                    Rule::Exclude(_) | Rule::Include(_) | Rule::ValueToNum(_) => {}
                }
            }
        }
    }

    fn apply_filter(excludes: &[FilterRule], includes: &[FilterRule], matrix: &mut Matrix) {
        for (_, instance) in matrix.instances_iter_mut() {
            if excludes.iter().any(|r| r.matches(instance)) {
                instance.set_exportable(false);
            } else if instance.is_exportable() && !includes.is_empty() {
                let keep = includes.iter().any(|r| r.matches(instance));
                instance.set_exportable(keep);
            }
        }
    }

    fn apply_value_to_num(&self, rules: &[ValueToNumRule], matrix: &mut Matrix) -> Result<()> {
        for rule in rules {
            if matrix.metric(&rule.metric).is_none() {
                matrix.new_metric(rule.metric.as_str(), DataType::Uint8)?;
            }
            let Some((instances, metric)) = matrix.metric_with_instances(&rule.metric) else {
                continue;
            };
            for instance in instances.values() {
                if let Some(v) = rule.value_for(instance) {
                    if let Err(e) = metric.set_value_u8(instance, v) {
                        warn!("{} value_to_num {}: {}", self.ctx.prefix(), rule.metric, e);
                    }
                }
            }
        }
        Ok(())
    }
}

impl Plugin for LabelAgent {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    fn init(&mut self, _remote: &Remote) -> Result<()> {
        let count = self.parse_rules();
        if count == 0 {
            return Err(PluginError::MissingParam("valid rules".into()));
        }
        debug!(
            "{} parsed {} rules for {} actions",
            self.ctx.prefix(),
            count,
            self.actions.len()
        );
        Ok(())
    }

    fn run(&mut self, data: &mut DataMap) -> Result<PluginOutput> {
        let matrix = self.ctx.matrix(data)?;
        for action in &self.actions {
            match action {
                Action::Labels(rules) => Self::apply_labels(rules, matrix),
                Action::Filter { excludes, includes } => {
                    Self::apply_filter(excludes, includes, matrix)
                }
                Action::ValueToNum(rules) => {
                    if let Err(e) = self.apply_value_to_num(rules, matrix) {
                        error!("{} value_to_num: {}", self.ctx.prefix(), e);
                    }
                }
            }
        }
        Ok(PluginOutput::none())
    }
}
