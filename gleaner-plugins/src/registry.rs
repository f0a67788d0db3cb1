// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Plugin constructors by name
//!
//! A registry is filled before any collector starts and only read afterwards.
//! [`Registry::global`] holds the built-in plugins.

use crate::aggregator::Aggregator;
use crate::changelog::ChangeLog;
use crate::days_till_full::DaysTillFull;
use crate::error::{PluginError, Result};
use crate::flexgroup::FlexGroup;
use crate::label_agent::LabelAgent;
use crate::max::Max;
use crate::metric_agent::MetricAgent;
use crate::plugin::{Plugin, PluginContext};
use crate::snaplock::VolumeSnapLock;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Builds an uninitialized plugin
pub type Constructor = fn(PluginContext) -> Box<dyn Plugin>;

static BUILTIN: OnceLock<Registry> = OnceLock::new();

/// Name to constructor table
#[derive(Default, Clone)]
pub struct Registry {
    constructors: BTreeMap<String, Constructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All plugins shipped with this crate
    pub fn builtin() -> Self {
        let mut r = Self::new();
        r.register("Aggregator", |ctx| Box::new(Aggregator::new(ctx)));
        r.register("ChangeLog", |ctx| Box::new(ChangeLog::new(ctx)));
        r.register("DaysTillFull", |ctx| Box::new(DaysTillFull::new(ctx)));
        r.register("FlexGroup", |ctx| Box::new(FlexGroup::new(ctx)));
        r.register("LabelAgent", |ctx| Box::new(LabelAgent::new(ctx)));
        r.register("Max", |ctx| Box::new(Max::new(ctx)));
        r.register("MetricAgent", |ctx| Box::new(MetricAgent::new(ctx)));
        r.register("VolumeSnapLock", |ctx| Box::new(VolumeSnapLock::new(ctx)));
        r
    }

    /// Shared registry of the built-in plugins
    pub fn global() -> &'static Registry {
        BUILTIN.get_or_init(Registry::builtin)
    }

    /// Add or replace a constructor; returns true when `name` was new
    pub fn register(&mut self, name: impl Into<String>, constructor: Constructor) -> bool {
        self.constructors.insert(name.into(), constructor).is_none()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Construct the plugin named by `ctx.name`
    pub fn create(&self, ctx: PluginContext) -> Result<Box<dyn Plugin>> {
        match self.constructors.get(&ctx.name) {
            Some(constructor) => Ok(constructor(ctx)),
            None => Err(PluginError::UnknownPlugin(ctx.name)),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("plugins", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner::Node;

    fn ctx(name: &str) -> PluginContext {
        PluginContext::new("Rest", name, "volume", Node::new(name), Node::new("volume"))
    }

    #[test]
    fn test_builtin() {
        let r = Registry::global();
        assert_eq!(r.names().len(), 8);
        assert!(r.contains("LabelAgent"));
        let plugin = r.create(ctx("Aggregator")).unwrap();
        assert_eq!(plugin.name(), "Aggregator");
    }

    #[test]
    fn test_unknown() {
        assert!(matches!(
            Registry::global().create(ctx("Nope")),
            Err(PluginError::UnknownPlugin(name)) if name == "Nope"
        ));
    }

    #[test]
    fn test_register() {
        let mut r = Registry::new();
        assert!(r.register("Max", |ctx| Box::new(Max::new(ctx))));
        assert!(!r.register("Max", |ctx| Box::new(Max::new(ctx))));
        assert_eq!(r.names(), vec!["Max"]);
    }
}
