// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! The plugin contract
//!
//! A plugin receives the collector's matrices keyed by object name, may
//! mutate its own object's matrix in place and may return extra matrices.
//! Expensive work is gated by the plugin invocation rate: the plugin ticks on
//! every poll but only does that work once every `rate` ticks.

use crate::error::{PluginError, Result};
use gleaner::{parse_duration, ExportOptions, Matrix, Node};
use log::warn;
use std::collections::HashMap;
use std::time::Duration;

/// Matrices handed to a plugin, keyed by object name
pub type DataMap = HashMap<String, Matrix>;

/// Default timeout for plugin-side device calls
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Identity of the monitored device, passed to [`Plugin::init`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub model: String,
    pub version: String,
    pub is_clustered: bool,
}

/// Accounting record returned alongside output matrices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Instances in the plugin's output
    pub plugin_instances: u64,
    /// Device calls issued by the plugin
    pub api_calls: u64,
    /// Bytes received by those calls
    pub bytes_rx: u64,
}

/// What a plugin run produced
#[derive(Debug, Default)]
pub struct PluginOutput {
    pub matrices: Vec<Matrix>,
    pub metadata: Option<Metadata>,
}

impl PluginOutput {
    /// No extra matrices, no metadata
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_matrices(matrices: Vec<Matrix>) -> Self {
        Self {
            matrices,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A transformation step in a collector's plugin chain
pub trait Plugin: Send {
    /// Plugin name as configured
    fn name(&self) -> &str;

    /// Parse parameters; an error keeps the plugin out of the chain
    fn init(&mut self, remote: &Remote) -> Result<()>;

    /// Process one poll
    fn run(&mut self, data: &mut DataMap) -> Result<PluginOutput>;
}

/// Counter of plugin ticks gated by the invocation rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    rate: u64,
    calls: u64,
}

impl Invocation {
    pub fn new(rate: u64) -> Self {
        Self {
            rate: rate.max(1),
            calls: 0,
        }
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Ticks so far
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Count one tick; true on the first tick and every `rate` ticks after
    pub fn tick(&mut self) -> bool {
        let due = self.calls % self.rate == 0;
        self.calls = self.calls.saturating_add(1);
        due
    }
}

impl Default for Invocation {
    fn default() -> Self {
        Self::new(1)
    }
}

/// State common to every plugin: identity, parameters and scheduling
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Collector that owns the chain
    pub parent: String,
    /// Plugin name
    pub name: String,
    /// Object whose matrix is the primary input
    pub object: String,
    /// Plugin parameters
    pub params: Node,
    /// Collector parameters
    pub parent_params: Node,
    invocation: Invocation,
}

impl PluginContext {
    pub fn new(
        parent: impl Into<String>,
        name: impl Into<String>,
        object: impl Into<String>,
        params: Node,
        parent_params: Node,
    ) -> Self {
        Self {
            parent: parent.into(),
            name: name.into(),
            object: object.into(),
            params,
            parent_params,
            invocation: Invocation::default(),
        }
    }

    /// Prefix for log lines: `(parent:name)`
    pub fn prefix(&self) -> String {
        format!("({}:{})", self.parent, self.name)
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn invocation_mut(&mut self) -> &mut Invocation {
        &mut self.invocation
    }

    /// Derive the invocation rate from `schedule.data` of the plugin and the
    /// collector: `ceil(plugin / poll)`, at least 1. `default` stands in when
    /// the plugin declares no schedule. Returns the rate.
    pub fn set_plugin_interval(&mut self, default: Option<Duration>) -> u64 {
        let poll = self.schedule_of(&self.parent_params);
        let plugin = self.schedule_of(&self.params).or(default);
        let rate = match (poll, plugin) {
            (Some(poll), Some(plugin)) if !poll.is_zero() => {
                (plugin.as_secs_f64() / poll.as_secs_f64()).ceil().max(1.0) as u64
            }
            _ => 1,
        };
        self.invocation = Invocation::new(rate);
        rate
    }

    fn schedule_of(&self, node: &Node) -> Option<Duration> {
        let raw = node.path(&["schedule", "data"])?.content();
        match parse_duration(raw) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!("{} ignoring schedule {:?}: {}", self.prefix(), raw, e);
                None
            }
        }
    }

    /// `client_timeout` from the plugin, then the collector, else 30s
    pub fn client_timeout(&self) -> Duration {
        [&self.params, &self.parent_params]
            .iter()
            .find_map(|n| n.child_content("client_timeout"))
            .and_then(|raw| parse_duration(raw).ok())
            .unwrap_or(DEFAULT_CLIENT_TIMEOUT)
    }

    /// Export options of the collector, when configured
    pub fn parent_export_options(&self) -> Option<ExportOptions> {
        let node = self.parent_params.child("export_options")?;
        match ExportOptions::from_node(node) {
            Ok(eo) => Some(eo),
            Err(e) => {
                warn!("{} export_options: {}", self.prefix(), e);
                None
            }
        }
    }

    /// The primary input matrix
    pub fn matrix<'a>(&self, data: &'a mut DataMap) -> Result<&'a mut Matrix> {
        data.get_mut(&self.object)
            .ok_or_else(|| PluginError::MissingMatrix(self.object.clone()))
    }
}
