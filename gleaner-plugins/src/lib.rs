// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Gleaner Plugins - Matrix transformation plugins
//!
//! Plugins run after a collector has filled its [`Matrix`](gleaner::Matrix)
//! and before exporters read it. Each one may rewrite labels, hide
//! instances, derive metrics in place, or return new matrices.
//!
//! ## Built-in plugins
//!
//! | Name | Effect |
//! |------|--------|
//! | `LabelAgent` | split/join/replace labels, include/exclude instances, labels to numbers |
//! | `Aggregator` | sum or average metrics per label value |
//! | `Max` | group maximum per metric |
//! | `MetricAgent` | arithmetic between metrics |
//! | `ChangeLog` | create/update/delete events between polls |
//! | `FlexGroup` | roll constituent volumes up into their flexgroup |
//! | `DaysTillFull` | forecast of days until a volume is full |
//! | `VolumeSnapLock` | seconds and display form of retention periods |
//!
//! ## Quick Start
//!
//! ```rust
//! use gleaner::{Matrix, Node};
//! use gleaner_plugins::{DataMap, PluginChain, Registry, Remote};
//!
//! let plugins = Node::from_yaml_str("plugins", "- Aggregator:\n    - node\n").unwrap();
//! let mut chain = PluginChain::build(
//!     Registry::global(),
//!     "ZapiPerf",
//!     "disk",
//!     &plugins,
//!     &Node::new("disk"),
//!     &Remote::default(),
//! );
//!
//! let mut disk = Matrix::new("ZapiPerf", "disk", "disk");
//! disk.new_metric_f64("reads").unwrap();
//! for (key, node, reads) in [("d1", "n1", 10.0), ("d2", "n1", 5.0)] {
//!     disk.new_instance(key).unwrap().set_label("node", node);
//!     disk.lazy_set_value("reads", key, reads).unwrap();
//! }
//!
//! let mut data = DataMap::new();
//! data.insert("disk".into(), disk);
//! let out = chain.run(&mut data);
//! assert_eq!(out.matrices[0].lazy_value_f64("reads", "n1"), Some(15.0));
//! ```

pub mod aggregator;
pub mod chain;
pub mod changelog;
pub mod days_till_full;
pub mod error;
pub mod flexgroup;
pub mod label_agent;
pub mod max;
pub mod metric_agent;
pub mod plugin;
pub mod registry;
pub mod snaplock;

pub use aggregator::Aggregator;
pub use chain::{ChainOutput, PluginChain};
pub use changelog::ChangeLog;
pub use days_till_full::DaysTillFull;
pub use error::{PluginError, Result};
pub use flexgroup::FlexGroup;
pub use label_agent::LabelAgent;
pub use max::Max;
pub use metric_agent::MetricAgent;
pub use plugin::{
    DataMap, Invocation, Metadata, Plugin, PluginContext, PluginOutput, Remote,
};
pub use registry::{Constructor, Registry};
pub use snaplock::VolumeSnapLock;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
