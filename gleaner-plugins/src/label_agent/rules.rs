// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! LabelAgent rule grammar
//!
//! Values containing spaces are wrapped in backticks:
//!
//! ```text
//! split            node `/` ,aggr,plex,disk
//! split_regex      node `.*_(ag\d+)_(p\d+)` aggr,plex
//! split_pairs      node ` ` `:`
//! join             plex_long `_` aggr,plex
//! replace          node node_short `node_` ``
//! replace_regex    node node `^(node)_(\d+)_.*$` `Node-$2`
//! exclude_equals   style `flexgroup_constituent`
//! value_to_num     status state up ok `0`
//! ```

use crate::error::{PluginError, Result};
use gleaner::Instance;
use regex::Regex;
use std::collections::HashSet;
use std::str::FromStr;

/// Rule group names as they appear in the parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Split,
    SplitRegex,
    SplitPairs,
    Join,
    Replace,
    ReplaceRegex,
    ExcludeEquals,
    ExcludeContains,
    ExcludeRegex,
    IncludeEquals,
    IncludeContains,
    IncludeRegex,
    ValueToNum,
    ValueToNumRegex,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Split => "split",
            RuleKind::SplitRegex => "split_regex",
            RuleKind::SplitPairs => "split_pairs",
            RuleKind::Join => "join",
            RuleKind::Replace => "replace",
            RuleKind::ReplaceRegex => "replace_regex",
            RuleKind::ExcludeEquals => "exclude_equals",
            RuleKind::ExcludeContains => "exclude_contains",
            RuleKind::ExcludeRegex => "exclude_regex",
            RuleKind::IncludeEquals => "include_equals",
            RuleKind::IncludeContains => "include_contains",
            RuleKind::IncludeRegex => "include_regex",
            RuleKind::ValueToNum => "value_to_num",
            RuleKind::ValueToNumRegex => "value_to_num_regex",
        }
    }

    /// Exclude and include rules only touch the export flag
    pub fn is_filter(&self) -> bool {
        matches!(
            self,
            RuleKind::ExcludeEquals
                | RuleKind::ExcludeContains
                | RuleKind::ExcludeRegex
                | RuleKind::IncludeEquals
                | RuleKind::IncludeContains
                | RuleKind::IncludeRegex
        )
    }
}

impl FromStr for RuleKind {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s {
            "split" => RuleKind::Split,
            "split_regex" => RuleKind::SplitRegex,
            "split_pairs" => RuleKind::SplitPairs,
            "join" => RuleKind::Join,
            "replace" => RuleKind::Replace,
            "replace_regex" => RuleKind::ReplaceRegex,
            "exclude_equals" => RuleKind::ExcludeEquals,
            "exclude_contains" => RuleKind::ExcludeContains,
            "exclude_regex" => RuleKind::ExcludeRegex,
            "include_equals" => RuleKind::IncludeEquals,
            "include_contains" => RuleKind::IncludeContains,
            "include_regex" => RuleKind::IncludeRegex,
            "value_to_num" => RuleKind::ValueToNum,
            "value_to_num_regex" => RuleKind::ValueToNumRegex,
            other => return Err(PluginError::invalid_param(other, "unknown rule kind")),
        };
        Ok(kind)
    }
}

/// `src `sep` t1,t2,...`
#[derive(Debug, Clone)]
pub struct SplitRule {
    pub source: String,
    pub sep: String,
    pub targets: Vec<String>,
}

impl SplitRule {
    pub fn apply(&self, instance: &mut Instance) {
        let value = instance.label_or_empty(&self.source).to_string();
        let pieces: Vec<&str> = value.split(self.sep.as_str()).collect();
        if pieces.len() < self.targets.len() {
            return;
        }
        for (target, piece) in self.targets.iter().zip(pieces) {
            if !target.is_empty() && !piece.is_empty() {
                instance.set_label(target.as_str(), piece);
            }
        }
    }
}

/// `src `regex` t1,t2,...`
#[derive(Debug, Clone)]
pub struct SplitRegexRule {
    pub source: String,
    pub regex: Regex,
    pub targets: Vec<String>,
}

impl SplitRegexRule {
    pub fn apply(&self, instance: &mut Instance) {
        let value = instance.label_or_empty(&self.source).to_string();
        let Some(caps) = self.regex.captures(&value) else {
            return;
        };
        if caps.len() != self.targets.len() + 1 {
            return;
        }
        for (i, target) in self.targets.iter().enumerate() {
            match caps.get(i + 1) {
                Some(m) if !target.is_empty() && !m.as_str().is_empty() => {
                    instance.set_label(target.as_str(), m.as_str());
                }
                _ => {}
            }
        }
    }
}

/// `src `sep1` `sep2``
#[derive(Debug, Clone)]
pub struct SplitPairsRule {
    pub source: String,
    pub sep1: String,
    pub sep2: String,
}

impl SplitPairsRule {
    pub fn apply(&self, instance: &mut Instance) {
        let value = instance.label_or_empty(&self.source).to_string();
        if value.is_empty() {
            return;
        }
        for pair in value.split(self.sep1.as_str()) {
            let kv: Vec<&str> = pair.split(self.sep2.as_str()).collect();
            if let [k, v] = kv.as_slice() {
                instance.set_label(*k, *v);
            }
        }
    }
}

/// `dst `sep` s1,s2,...`
#[derive(Debug, Clone)]
pub struct JoinRule {
    pub target: String,
    pub sep: String,
    pub sources: Vec<String>,
}

impl JoinRule {
    pub fn apply(&self, instance: &mut Instance) {
        let values: Vec<&str> = self
            .sources
            .iter()
            .map(|s| instance.label_or_empty(s))
            .filter(|v| !v.is_empty())
            .collect();
        if !values.is_empty() {
            let joined = values.join(&self.sep);
            instance.set_label(self.target.as_str(), joined);
        }
    }
}

/// `src dst `old` `new``
#[derive(Debug, Clone)]
pub struct ReplaceRule {
    pub source: String,
    pub target: String,
    pub old: String,
    pub new: String,
}

impl ReplaceRule {
    pub fn apply(&self, instance: &mut Instance) {
        let old = instance.label_or_empty(&self.source);
        if old.is_empty() {
            return;
        }
        let value = old.replace(&self.old, &self.new);
        if value != old {
            instance.set_label(self.target.as_str(), value);
        }
    }
}

/// Piece of a `replace_regex` substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// 1-based capture group
    Group(usize),
}

/// `src dst `regex` `$N...pattern``
#[derive(Debug, Clone)]
pub struct ReplaceRegexRule {
    pub source: String,
    pub target: String,
    pub regex: Regex,
    pub format: Vec<Segment>,
}

impl ReplaceRegexRule {
    pub fn apply(&self, instance: &mut Instance) {
        let old = instance.label_or_empty(&self.source).to_string();
        let Some(caps) = self.regex.captures(&old) else {
            return;
        };
        let mut value = String::new();
        for segment in &self.format {
            match segment {
                Segment::Literal(s) => value.push_str(s),
                Segment::Group(n) => {
                    if let Some(m) = caps.get(*n) {
                        value.push_str(m.as_str());
                    }
                }
            }
        }
        if !value.is_empty() && value != old {
            instance.set_label(self.target.as_str(), value);
        }
    }
}

/// Parse a substitution such as `Node-$2` or `cost \$$1`
pub fn parse_substitution(sub: &str) -> std::result::Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = sub.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'$') => {
                chars.next();
                literal.push('$');
            }
            '$' => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(*d);
                    chars.next();
                }
                let group: usize = digits
                    .parse()
                    .map_err(|_| format!("expected group number after '$' in {:?}", sub))?;
                if group == 0 {
                    return Err(format!("group numbers start at 1 in {:?}", sub));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Group(group));
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// How a filter rule compares a label
#[derive(Debug, Clone)]
pub enum Matcher {
    Equals(String),
    Contains(String),
    Regex(Regex),
}

impl Matcher {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Equals(v) => value == v,
            Matcher::Contains(v) => value.contains(v.as_str()),
            Matcher::Regex(r) => r.is_match(value),
        }
    }
}

/// `label `value-or-regex``
#[derive(Debug, Clone)]
pub struct FilterRule {
    pub label: String,
    pub matcher: Matcher,
}

impl FilterRule {
    pub fn matches(&self, instance: &Instance) -> bool {
        self.matcher.matches(instance.label_or_empty(&self.label))
    }
}

/// What `value_to_num` compares the label against
#[derive(Debug, Clone)]
pub enum ValueMatch {
    /// Exact values, hyphen-separated alternatives already expanded
    Values(HashSet<String>),
    Regexes(Vec<Regex>),
}

/// `metric label v1 v2 [`default`]`
#[derive(Debug, Clone)]
pub struct ValueToNumRule {
    pub metric: String,
    pub label: String,
    pub matcher: ValueMatch,
    pub default: Option<u8>,
}

impl ValueToNumRule {
    /// Value for this instance, `None` to leave the cell unrecorded
    pub fn value_for(&self, instance: &Instance) -> Option<u8> {
        let value = instance.label_or_empty(&self.label);
        let hit = match &self.matcher {
            ValueMatch::Values(set) => set.contains(value),
            ValueMatch::Regexes(regexes) => regexes.iter().any(|r| r.is_match(value)),
        };
        if hit {
            Some(1)
        } else {
            self.default
        }
    }
}

/// One parsed rule
#[derive(Debug, Clone)]
pub enum Rule {
    Split(SplitRule),
    SplitRegex(SplitRegexRule),
    SplitPairs(SplitPairsRule),
    Join(JoinRule),
    Replace(ReplaceRule),
    ReplaceRegex(ReplaceRegexRule),
    Exclude(FilterRule),
    Include(FilterRule),
    ValueToNum(ValueToNumRule),
}

impl Rule {
    /// Parse one rule line of group `kind`
    pub fn parse(kind: RuleKind, line: &str) -> Result<Rule> {
        let line = line.trim();
        let bad = |reason: &str| PluginError::invalid_rule(kind.as_str(), line, reason);

        let rule = match kind {
            RuleKind::Split | RuleKind::SplitRegex | RuleKind::Join => {
                let (head, rest) = line.split_once(" `").ok_or_else(|| bad("missing `"))?;
                let (quoted, list) = rest.split_once("` ").ok_or_else(|| bad("missing `"))?;
                let head = head.trim().to_string();
                let list: Vec<String> = list.trim().split(',').map(String::from).collect();
                match kind {
                    RuleKind::Split => Rule::Split(SplitRule {
                        source: head,
                        sep: quoted.to_string(),
                        targets: list,
                    }),
                    RuleKind::SplitRegex => Rule::SplitRegex(SplitRegexRule {
                        source: head,
                        regex: Regex::new(quoted)?,
                        targets: list,
                    }),
                    _ => Rule::Join(JoinRule {
                        target: head,
                        sep: quoted.to_string(),
                        sources: list,
                    }),
                }
            }
            RuleKind::SplitPairs => {
                let fields: Vec<&str> = line.split('`').collect();
                if fields.len() != 5 {
                    return Err(bad("expected src `sep1` `sep2`"));
                }
                Rule::SplitPairs(SplitPairsRule {
                    source: fields[0].trim().to_string(),
                    sep1: fields[1].to_string(),
                    sep2: fields[3].to_string(),
                })
            }
            RuleKind::Replace | RuleKind::ReplaceRegex => {
                let fields: Vec<&str> = line.splitn(3, " `").collect();
                if fields.len() != 3 {
                    return Err(bad("expected src dst `a` `b`"));
                }
                let labels: Vec<&str> = fields[0].split_whitespace().collect();
                let [source, target] = labels.as_slice() else {
                    return Err(bad("expected two label names"));
                };
                let first = fields[1].trim_end().trim_end_matches('`');
                let second = fields[2].trim_end().trim_end_matches('`');
                if kind == RuleKind::Replace {
                    Rule::Replace(ReplaceRule {
                        source: source.to_string(),
                        target: target.to_string(),
                        old: first.to_string(),
                        new: second.to_string(),
                    })
                } else {
                    Rule::ReplaceRegex(ReplaceRegexRule {
                        source: source.to_string(),
                        target: target.to_string(),
                        regex: Regex::new(first)?,
                        format: parse_substitution(second).map_err(|e| bad(&e))?,
                    })
                }
            }
            RuleKind::ExcludeEquals
            | RuleKind::ExcludeContains
            | RuleKind::ExcludeRegex
            | RuleKind::IncludeEquals
            | RuleKind::IncludeContains
            | RuleKind::IncludeRegex => {
                let (label, rest) = line
                    .split_once(" `")
                    .ok_or_else(|| bad("expected label `value`"))?;
                let value = rest.strip_suffix('`').unwrap_or(rest);
                let matcher = match kind {
                    RuleKind::ExcludeEquals | RuleKind::IncludeEquals => {
                        Matcher::Equals(value.to_string())
                    }
                    RuleKind::ExcludeContains | RuleKind::IncludeContains => {
                        Matcher::Contains(value.to_string())
                    }
                    _ => Matcher::Regex(Regex::new(value)?),
                };
                let filter = FilterRule {
                    label: label.trim().to_string(),
                    matcher,
                };
                if matches!(
                    kind,
                    RuleKind::ExcludeEquals | RuleKind::ExcludeContains | RuleKind::ExcludeRegex
                ) {
                    Rule::Exclude(filter)
                } else {
                    Rule::Include(filter)
                }
            }
            RuleKind::ValueToNum | RuleKind::ValueToNumRegex => {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() != 4 && fields.len() != 5 {
                    return Err(bad("expected metric label v1 v2 [`default`]"));
                }
                let default = match fields.get(4) {
                    Some(raw) => {
                        let raw = raw.trim_matches('`');
                        Some(raw.parse::<u8>().map_err(|_| bad("default is not a uint8"))?)
                    }
                    None => None,
                };
                let matcher = if kind == RuleKind::ValueToNum {
                    ValueMatch::Values(
                        fields[2]
                            .split('-')
                            .chain(fields[3].split('-'))
                            .map(String::from)
                            .collect(),
                    )
                } else {
                    ValueMatch::Regexes(vec![Regex::new(fields[2])?, Regex::new(fields[3])?])
                };
                Rule::ValueToNum(ValueToNumRule {
                    metric: fields[0].to_string(),
                    label: fields[1].to_string(),
                    matcher,
                    default,
                })
            }
        };
        Ok(rule)
    }
}
