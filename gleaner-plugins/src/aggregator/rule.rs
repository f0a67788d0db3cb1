// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Group-by rule shared by the Aggregator and Max plugins
//!
//! ```text
//! node
//! node<>node_volume            group by node, output object "node_volume"
//! node<style=flexgroup>        only instances with style=flexgroup
//! node<`^vs\d+$`>              check the grouped label itself by regex
//! node ...                     carry all labels
//! node svm,aggr                carry svm and aggr, key "node.svm.aggr"
//! ```

use crate::error::{PluginError, Result};
use gleaner::Instance;
use regex::Regex;

/// Which instances a rule accepts
#[derive(Debug, Clone)]
pub enum Check {
    Equals { label: String, value: String },
    Regex { label: String, regex: Regex },
}

/// Labels copied onto the output instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Carry {
    /// Just the grouped label
    Label,
    /// The grouped label and these extra labels
    Include(Vec<String>),
    /// Every label of the source instance (`...`)
    All,
}

/// One group-by rule
#[derive(Debug, Clone)]
pub struct GroupRule {
    pub label: String,
    pub check: Option<Check>,
    /// Output object name override, lowercased
    pub object: Option<String>,
    pub carry: Carry,
}

impl GroupRule {
    pub fn parse(line: &str) -> Result<GroupRule> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() || fields.len() > 2 {
            return Err(PluginError::invalid_rule(
                "aggregation",
                line,
                "expected label[<check>object] [labels|...]",
            ));
        }

        let (label, condition) = match fields[0].split_once('<') {
            Some((label, rest)) => (label.trim(), Some(rest)),
            None => (fields[0].trim(), None),
        };
        if label.is_empty() {
            return Err(PluginError::invalid_rule("aggregation", line, "empty label"));
        }

        let mut check = None;
        let mut object = None;
        if let Some(rest) = condition {
            let (cond, obj) = rest.split_once('>').unwrap_or((rest, ""));
            let (check_label, value) = match cond.split_once('=') {
                Some((l, v)) => (l, v),
                None => (label, cond),
            };
            if let Some(pattern) = value.strip_prefix('`') {
                let pattern = pattern.strip_suffix('`').unwrap_or(pattern);
                check = Some(Check::Regex {
                    label: check_label.to_string(),
                    regex: Regex::new(pattern)?,
                });
            } else if !value.is_empty() {
                check = Some(Check::Equals {
                    label: check_label.to_string(),
                    value: value.to_string(),
                });
            }
            if !obj.is_empty() {
                object = Some(obj.to_lowercase());
            }
        }

        let carry = match fields.get(1).map(|f| f.trim()) {
            Some("...") => Carry::All,
            Some(list) => Carry::Include(list.split(',').map(String::from).collect()),
            None => Carry::Label,
        };

        Ok(GroupRule {
            label: label.to_string(),
            check,
            object,
            carry,
        })
    }

    /// Output object name for source object `source`
    pub fn output_object(&self, source: &str) -> String {
        match &self.object {
            Some(o) => o.clone(),
            None => format!("{}_{}", self.label.to_lowercase(), source),
        }
    }

    /// True when the instance passes the rule's check
    pub fn accepts(&self, instance: &Instance) -> bool {
        match &self.check {
            None => true,
            Some(Check::Equals { label, value }) => {
                instance.label_or_empty(label) == value.as_str()
            }
            Some(Check::Regex { label, regex }) => regex.is_match(instance.label_or_empty(label)),
        }
    }

    /// Group key for an instance whose grouped label is `name`
    pub fn group_key(&self, name: &str, instance: &Instance) -> String {
        match &self.carry {
            Carry::Label => name.to_string(),
            Carry::Include(labels) => {
                let mut key = name.to_string();
                for l in labels {
                    key.push('.');
                    key.push_str(instance.label_or_empty(l));
                }
                key
            }
            Carry::All => {
                let mut labels: Vec<(&String, &String)> = instance.labels().iter().collect();
                labels.sort();
                labels
                    .into_iter()
                    .map(|(_, v)| v.as_str())
                    .collect::<Vec<_>>()
                    .join(".")
            }
        }
    }

    /// Copy the carried labels of `from` onto `to`
    pub fn carry_labels(&self, name: &str, from: &Instance, to: &mut Instance) {
        match &self.carry {
            Carry::All => to.set_labels(from.labels().clone()),
            Carry::Include(labels) => {
                for l in labels {
                    to.set_label(l.as_str(), from.label_or_empty(l));
                }
                to.set_label(self.label.as_str(), name);
            }
            Carry::Label => to.set_label(self.label.as_str(), name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(labels: &[(&str, &str)]) -> Instance {
        let mut i = Instance::new(0);
        for (k, v) in labels {
            i.set_label(*k, *v);
        }
        i
    }

    #[test]
    fn test_plain() {
        let r = GroupRule::parse("node").unwrap();
        assert_eq!(r.label, "node");
        assert!(r.check.is_none());
        assert_eq!(r.carry, Carry::Label);
        assert_eq!(r.output_object("volume"), "node_volume");
    }

    #[test]
    fn test_check_and_object() {
        let r = GroupRule::parse("node<style=flexgroup>Node_Vol svm,aggr").unwrap();
        assert_eq!(r.output_object("volume"), "node_vol");
        assert!(r.accepts(&instance(&[("style", "flexgroup")])));
        assert!(!r.accepts(&instance(&[("style", "flexvol")])));
        assert_eq!(r.carry, Carry::Include(vec!["svm".into(), "aggr".into()]));

        let i = instance(&[("node", "n1"), ("svm", "vs1")]);
        assert_eq!(r.group_key("n1", &i), "n1.vs1.");
    }

    #[test]
    fn test_regex_on_own_label() {
        let r = GroupRule::parse(r"svm<`^vs\d+$`>").unwrap();
        assert!(r.accepts(&instance(&[("svm", "vs12")])));
        assert!(!r.accepts(&instance(&[("svm", "svm_root")])));
        assert!(r.object.is_none());
    }

    #[test]
    fn test_all_labels_key_is_sorted() {
        let r = GroupRule::parse("node ...").unwrap();
        let i = instance(&[("svm", "vs1"), ("node", "n1"), ("aggr", "a1")]);
        assert_eq!(r.group_key("n1", &i), "a1.n1.vs1");
    }

    #[test]
    fn test_invalid() {
        assert!(GroupRule::parse("").is_err());
        assert!(GroupRule::parse("a b c").is_err());
        assert!(GroupRule::parse("node<`(`>").is_err());
    }
}
