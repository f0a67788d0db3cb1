// Gleaner Poller - Configuration
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Poller and replay configuration.
//!
//! ```yaml
//! name: lab-cluster
//! schedule:
//!   - data: 1m
//! client_timeout: 30s
//! objects:
//!   volume:
//!     csv: volume.csv
//!     counters: volume_counters.yaml
//!     latency_io_reqd: 10
//!     export_options:
//!       instance_keys:
//!         - volume
//!     plugins:
//!       - Aggregator:
//!           - node
//! ```

use crate::error::{PollerError, Result};
use gleaner::{parse_duration, ExportOptions, Node};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default poll interval when no `schedule.data` is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default collector timeout.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// One polled object.
#[derive(Debug, Clone)]
pub struct ObjectConfig {
    /// Object name, also the key of its matrix in the plugin data map
    pub name: String,
    /// Replay dataset for this object
    pub csv: Option<PathBuf>,
    /// Counter schema; when present the object goes through the perf engine
    pub counters: Option<PathBuf>,
    /// Plugin list, one child per plugin
    pub plugins: Node,
    pub export_options: Option<ExportOptions>,
    /// Object parameters as seen by plugins (`parent_params`)
    pub params: Node,
}

impl ObjectConfig {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            csv: None,
            counters: None,
            plugins: Node::new("plugins"),
            export_options: None,
            params: Node::new(name.as_str()),
            name,
        }
    }

    pub fn with_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.csv = Some(path.into());
        self
    }

    pub fn with_counters(mut self, path: impl Into<PathBuf>) -> Self {
        self.counters = Some(path.into());
        self
    }

    pub fn with_plugins(mut self, plugins: Node) -> Self {
        self.plugins = plugins;
        self
    }

    fn from_node(node: &Node, base: &Path) -> Result<Self> {
        let mut object = Self::new(node.name());
        object.csv = node.child_content("csv").map(|p| base.join(p));
        object.counters = node.child_content("counters").map(|p| base.join(p));
        if let Some(plugins) = node.child("plugins") {
            object.plugins = plugins.clone();
        }
        if let Some(eo) = node.child("export_options") {
            object.export_options = Some(ExportOptions::from_node(eo)?);
        }
        object.params = node.clone();
        Ok(object)
    }
}

/// Configuration of a poller process.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Poller name, used as collector prefix in logs and as `datacenter` label
    pub name: String,
    pub poll_interval: Duration,
    pub client_timeout: Duration,
    pub objects: Vec<ObjectConfig>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            name: "gleaner".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            objects: Vec::new(),
        }
    }
}

impl PollerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = timeout;
        self
    }

    pub fn with_object(mut self, object: ObjectConfig) -> Self {
        self.objects.push(object);
        self
    }

    /// Load from a YAML file; relative dataset paths resolve against its directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PollerError::FileNotFound(path.display().to_string()));
        }
        let yaml = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml_str(&yaml, base)
    }

    pub fn from_yaml_str(yaml: &str, base: &Path) -> Result<Self> {
        let root = Node::from_yaml_str("poller", yaml)?;
        let mut config = Self::default();

        if let Some(name) = root.child_content("name").filter(|n| !n.is_empty()) {
            config.name = name.to_string();
        }
        if let Some(raw) = root.path(&["schedule", "data"]).map(Node::content) {
            config.poll_interval = parse_duration(raw)?;
        }
        if let Some(raw) = root.child_content("client_timeout") {
            config.client_timeout = parse_duration(raw)?;
        }
        if config.poll_interval.is_zero() {
            return Err(PollerError::Config("poll interval must be positive".into()));
        }

        let objects = root
            .child("objects")
            .ok_or_else(|| PollerError::Config("no objects configured".into()))?;
        for node in objects.children() {
            if node.name().is_empty() {
                // bare `- volume` entries
                config.objects.push(ObjectConfig::new(node.content()));
                continue;
            }
            config.objects.push(ObjectConfig::from_node(node, base)?);
        }
        config.inherit_schedule(root.child("schedule"));
        Ok(config)
    }

    /// Objects without their own schedule see the poller's, so plugin
    /// invocation rates can be derived from it
    fn inherit_schedule(&mut self, schedule: Option<&Node>) {
        let Some(schedule) = schedule else {
            return;
        };
        for object in &mut self.objects {
            if object.params.child("schedule").is_none() {
                object.params.add_child(schedule.clone());
            }
        }
    }
}

/// Configuration of the CSV replay collector.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Path to CSV dataset file.
    pub csv_path: PathBuf,
    /// Object name of the produced matrices.
    pub object: String,
    /// Start over after the last poll instead of failing.
    pub loop_replay: bool,
}

impl ReplayConfig {
    pub fn new(csv_path: impl Into<PathBuf>, object: impl Into<String>) -> Self {
        Self {
            csv_path: csv_path.into(),
            object: object.into(),
            loop_replay: true,
        }
    }

    pub fn with_loop(mut self, loop_replay: bool) -> Self {
        self.loop_replay = loop_replay;
        self
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self::new("", "replay")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
name: lab
schedule:
  - data: 3m
client_timeout: 5s
objects:
  volume:
    csv: volume.csv
    counters: counters.yaml
    plugins:
      - Aggregator:
          - node
  qtree:
    schedule:
      - data: 10m
"#;

    #[test]
    fn test_from_yaml() {
        let config = PollerConfig::from_yaml_str(YAML, Path::new("/data")).unwrap();
        assert_eq!(config.name, "lab");
        assert_eq!(config.poll_interval, Duration::from_secs(180));
        assert_eq!(config.client_timeout, Duration::from_secs(5));
        assert_eq!(config.objects.len(), 2);

        let volume = &config.objects[0];
        assert_eq!(volume.csv.as_deref(), Some(Path::new("/data/volume.csv")));
        assert_eq!(volume.plugins.all_child_names(), vec!["Aggregator"]);
        assert_eq!(volume.params.path(&["schedule", "data"]).unwrap().content(), "3m");

        let qtree = &config.objects[1];
        assert!(qtree.csv.is_none());
        assert_eq!(qtree.params.path(&["schedule", "data"]).unwrap().content(), "10m");
    }

    #[test]
    fn test_defaults() {
        let config = PollerConfig::from_yaml_str("objects:\n  - volume\n", Path::new(".")).unwrap();
        assert_eq!(config.name, "gleaner");
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.client_timeout, DEFAULT_CLIENT_TIMEOUT);
        assert_eq!(config.objects[0].name, "volume");
    }

    #[test]
    fn test_invalid() {
        assert!(PollerConfig::from_yaml_str("name: x\n", Path::new(".")).is_err());
        assert!(PollerConfig::from_yaml_str(
            "schedule:\n  - data: soon\nobjects:\n  - volume\n",
            Path::new(".")
        )
        .is_err());
        assert!(matches!(
            PollerConfig::from_file("/nonexistent/poller.yaml"),
            Err(PollerError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_replay_config() {
        let config = ReplayConfig::new("a.csv", "volume").with_loop(false);
        assert!(!config.loop_replay);
        assert_eq!(ReplayConfig::default().object, "replay");
    }
}
