// Gleaner Poller - Poll loop, replay collector and exporters
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Gleaner Poller
//!
//! Runs one async poll task per object: a [`Collector`] produces the
//! object's matrix, the perf engine derives counters when a schema is
//! configured, the plugin chain transforms it and every [`Exporter`]
//! publishes the result.
//!
//! The bundled [`ReplayCollector`] feeds recorded polls from a CSV dataset.

pub mod collector;
pub mod config;
pub mod error;
pub mod exporter;
pub mod poll;
pub mod replay;
pub mod runtime;

pub use collector::{Collector, FetchFuture};
pub use config::{ObjectConfig, PollerConfig, ReplayConfig};
pub use error::{PollerError, Result};
pub use exporter::{Exporter, JsonLinesExporter, LogExporter};
pub use poll::{PollOutcome, PollStats, PollTask};
pub use replay::{DatasetInfo, ReplayCollector};
pub use runtime::{build_task, run, Output};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
