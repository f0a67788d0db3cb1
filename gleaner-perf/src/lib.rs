// Gleaner Perf - Performance counter delta engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Gleaner Perf
//!
//! Storage performance counters arrive as monotonically growing raw values.
//! [`PerfEngine`] keeps the previous poll and turns each new poll into
//! exportable values according to the counter's property:
//!
//! | Property | Output |
//! |----------|--------|
//! | `raw` | the sample as is |
//! | `delta` | `current - previous` |
//! | `rate` | delta per elapsed second |
//! | `average` | delta divided by the delta of its base counter |
//! | `percent` | average times 100 |
//!
//! Latency averages are dropped when their base counter moved less than
//! [`PerfConfig::latency_io_reqd`].
//!
//! ## Quick Start
//!
//! ```rust
//! use gleaner::{Property, With};
//! use gleaner_perf::{set_timestamp, CounterMeta, CounterSchema, PerfConfig, PerfEngine};
//!
//! let mut schema = CounterSchema::new();
//! schema.insert(CounterMeta::new("total_ops", Property::Rate));
//! let mut engine = PerfEngine::new("volume", schema, PerfConfig::default());
//!
//! let mut template = engine.build_matrix("ZapiPerf", &["total_ops"]).unwrap();
//! template.new_instance("vol0").unwrap();
//! let poll = |ops: f64, ts: f64| {
//!     let mut m = template.clone_with(&With::all());
//!     m.lazy_set_value("total_ops", "vol0", ops).unwrap();
//!     set_timestamp(&mut m, ts).unwrap();
//!     m
//! };
//!
//! assert!(engine.cook(poll(1000.0, 60.0)).unwrap().is_none());
//! let cooked = engine.cook(poll(4000.0, 120.0)).unwrap().unwrap();
//! assert_eq!(cooked.lazy_value_f64("total_ops", "vol0"), Some(50.0));
//! ```

pub mod config;
pub mod counter;
pub mod engine;
pub mod error;

pub use config::PerfConfig;
pub use counter::{CounterMeta, CounterSchema};
pub use engine::{set_timestamp, PerfEngine};
pub use error::{PerfError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
