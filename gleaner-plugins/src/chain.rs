// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Ordered plugin chain of one collector
//!
//! ```yaml
//! plugins:
//!   - LabelAgent:
//!       split:
//!         - node `/` ,aggr,plex,disk
//!   - Aggregator:
//!       - node
//!   - MetricAgent
//! ```

use crate::plugin::{DataMap, Metadata, Plugin, PluginContext, Remote};
use crate::registry::Registry;
use gleaner::{Matrix, Node};
use log::{debug, error, warn};

/// Everything one pass over the chain produced
#[derive(Debug, Default)]
pub struct ChainOutput {
    /// Extra matrices from all plugins, in chain order
    pub matrices: Vec<Matrix>,
    /// Metadata by plugin name
    pub metadata: Vec<(String, Metadata)>,
    /// Plugins whose run failed
    pub errors: usize,
}

/// Initialized plugins in configuration order
#[derive(Default)]
pub struct PluginChain {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct and initialize every plugin listed under `plugins`
    ///
    /// Unknown plugins and plugins whose init fails are logged and left out.
    pub fn build(
        registry: &Registry,
        parent: &str,
        object: &str,
        plugins: &Node,
        parent_params: &Node,
        remote: &Remote,
    ) -> Self {
        let mut chain = Self::new();
        for child in plugins.children() {
            let (name, params) = if child.name().is_empty() {
                (child.content(), Node::new(child.content()))
            } else {
                (child.name(), child.clone())
            };
            if name.is_empty() {
                continue;
            }

            let ctx = PluginContext::new(parent, name, object, params, parent_params.clone());
            let mut plugin = match registry.create(ctx) {
                Ok(p) => p,
                Err(e) => {
                    error!("({}:{}) {}", parent, object, e);
                    continue;
                }
            };
            match plugin.init(remote) {
                Ok(()) => {
                    debug!("({}:{}) initialized plugin {}", parent, object, name);
                    chain.push(plugin);
                }
                Err(e) => warn!("({}:{}) plugin {} disabled: {}", parent, object, name, e),
            }
        }
        chain
    }

    /// Append an initialized plugin
    pub fn push(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run every plugin once over `data`
    ///
    /// A failing plugin is logged and skipped; the rest of the chain still
    /// runs on the same data.
    pub fn run(&mut self, data: &mut DataMap) -> ChainOutput {
        let mut out = ChainOutput::default();
        for plugin in &mut self.plugins {
            match plugin.run(data) {
                Ok(result) => {
                    if let Some(metadata) = result.metadata {
                        out.metadata.push((plugin.name().to_string(), metadata));
                    }
                    out.matrices.extend(result.matrices);
                }
                Err(e) => {
                    warn!("plugin {} failed: {}", plugin.name(), e);
                    out.errors += 1;
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginChain").field("plugins", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PluginError, Result};
    use crate::plugin::PluginOutput;

    struct Failing;

    impl Plugin for Failing {
        fn name(&self) -> &str {
            "Failing"
        }
        fn init(&mut self, _remote: &Remote) -> Result<()> {
            Ok(())
        }
        fn run(&mut self, _data: &mut DataMap) -> Result<PluginOutput> {
            Err(PluginError::Operational("device unreachable".into()))
        }
    }

    struct Marker;

    impl Plugin for Marker {
        fn name(&self) -> &str {
            "Marker"
        }
        fn init(&mut self, _remote: &Remote) -> Result<()> {
            Ok(())
        }
        fn run(&mut self, data: &mut DataMap) -> Result<PluginOutput> {
            for m in data.values_mut() {
                m.set_global_label("marked", "true");
            }
            Ok(PluginOutput::none().with_metadata(Metadata::default()))
        }
    }

    #[test]
    fn test_build_drops_bad_plugins() {
        let plugins = Node::from_yaml_str(
            "plugins",
            "- LabelAgent:\n    exclude_equals:\n      - state `offline`\n\
             - Aggregator: []\n\
             - Unknown\n\
             - MetricAgent\n",
        )
        .unwrap();
        let chain = PluginChain::build(
            Registry::global(),
            "Rest",
            "volume",
            &plugins,
            &Node::new("volume"),
            &Remote::default(),
        );
        // Aggregator and MetricAgent have no rules
        assert_eq!(chain.names(), vec!["LabelAgent"]);
    }

    #[test]
    fn test_run_continues_after_error() {
        let mut chain = PluginChain::new();
        chain.push(Box::new(Failing));
        chain.push(Box::new(Marker));

        let mut data = DataMap::new();
        data.insert("volume".into(), Matrix::new("Rest", "volume", "volume"));
        let out = chain.run(&mut data);
        assert_eq!(out.errors, 1);
        assert_eq!(out.metadata.len(), 1);
        assert_eq!(
            data["volume"].global_labels().get("marked").map(String::as_str),
            Some("true")
        );
    }
}
