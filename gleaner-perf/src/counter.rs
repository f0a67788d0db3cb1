// Gleaner Perf - Performance counter delta engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Counter metadata learned from the device schema
//!
//! ```yaml
//! - name: read_latency
//!   description: Average read latency
//!   type: average
//!   unit: microsec
//!   denominator: read_ops
//! ```

use crate::error::{PerfError, Result};
use gleaner::Property;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Metadata of one counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterMeta {
    pub name: String,
    pub description: String,
    pub property: Property,
    pub unit: String,
    /// Base counter of ratio counters
    pub denominator: Option<String>,
}

impl CounterMeta {
    pub fn new(name: impl Into<String>, property: Property) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            property,
            unit: String::new(),
            denominator: None,
        }
    }

    pub fn with_denominator(mut self, denominator: impl Into<String>) -> Self {
        self.denominator = Some(denominator.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Parse a `(name, description, type, unit, denominator)` record
    pub fn from_record(
        name: &str,
        description: &str,
        counter_type: &str,
        unit: &str,
        denominator: &str,
    ) -> Result<Self> {
        let property = counter_type
            .parse::<Property>()
            .map_err(|_| PerfError::InvalidProperty {
                counter: name.to_string(),
                property: counter_type.to_string(),
            })?;
        let denominator = denominator.trim();
        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
            property,
            unit: unit.to_string(),
            denominator: (!denominator.is_empty()).then(|| denominator.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Record {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    counter_type: String,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    denominator: String,
}

/// Cached counter metadata of one object
#[derive(Debug, Clone, Default)]
pub struct CounterSchema {
    counters: BTreeMap<String, CounterMeta>,
}

impl CounterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, description, type, unit, denominator)` records
    pub fn from_records<'a, I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str, &'a str, &'a str)>,
    {
        let mut schema = Self::new();
        for (name, description, counter_type, unit, denominator) in records {
            schema.insert(CounterMeta::from_record(
                name,
                description,
                counter_type,
                unit,
                denominator,
            )?);
        }
        Ok(schema)
    }

    /// Build from a YAML list of counter records
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let records: Vec<Record> = serde_yaml::from_str(yaml)?;
        Self::from_records(records.iter().map(|r| {
            (
                r.name.as_str(),
                r.description.as_str(),
                r.counter_type.as_str(),
                r.unit.as_str(),
                r.denominator.as_str(),
            )
        }))
    }

    pub fn insert(&mut self, meta: CounterMeta) {
        self.counters.insert(meta.name.clone(), meta);
    }

    pub fn get(&self, name: &str) -> Option<&CounterMeta> {
        self.counters.get(name)
    }

    /// Metadata of `name`, or [`PerfError::UnknownCounter`]
    pub fn require(&self, name: &str) -> Result<&CounterMeta> {
        self.get(name)
            .ok_or_else(|| PerfError::UnknownCounter(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CounterMeta> {
        self.counters.values()
    }

    /// Problems with base counters, one message each
    ///
    /// Base counters are delta'd before the counters that divide by them, so
    /// a base that is itself a ratio counter would be divided by its own base
    /// after its consumer already used it.
    pub fn check_denominators(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for meta in self.counters.values() {
            let Some(denominator) = &meta.denominator else {
                continue;
            };
            match self.counters.get(denominator) {
                None => problems.push(format!(
                    "counter {} has unknown denominator {}",
                    meta.name, denominator
                )),
                Some(base) if base.denominator.is_some() => problems.push(format!(
                    "counter {} uses ratio counter {} as denominator",
                    meta.name, denominator
                )),
                Some(_) => {}
            }
        }
        problems
    }
}
