//! # Gleaner - tabular metric model for infrastructure pollers
//!
//! A [`Matrix`] holds the state of one monitored object (`volume`, `node`,
//! `cdp_neighbor`, ...) at one poll: typed metric columns indexed by
//! instance rows, plus labels and export options. Collectors fill it,
//! plugins transform it, exporters read it.
//!
//! ## Key Features
//!
//! - **Typed columns**: int32/int64/uint8/uint32/uint64/float32/float64
//! - **Per-cell record flags**: unset cells are never exported
//! - **Counter properties**: raw/delta/rate/average/percent with base counters
//! - **Selective cloning**: copy only the metrics and labels you need
//!
//! ## Quick Start
//!
//! ```rust
//! use gleaner::{Matrix, Property, With};
//!
//! let mut volume = Matrix::new("ZapiPerf", "volume", "volume");
//! let ops = volume.new_metric_f64("total_ops").unwrap();
//! ops.set_property(Property::Rate);
//!
//! let vol0 = volume.new_instance("vol0").unwrap();
//! vol0.set_label("svm", "vs1");
//! volume.lazy_set_value("total_ops", "vol0", 1200.0).unwrap();
//!
//! let snapshot = volume.clone_with(&With::all());
//! assert_eq!(snapshot.lazy_value_f64("total_ops", "vol0"), Some(1200.0));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   Matrix   ┌──────────────────────────┐  [Matrix]  ┌──────────┐
//! │ Collector │ ─────────▶ │ Plugin chain             │ ─────────▶ │ Exporter │
//! │ (fetch)   │            │ LabelAgent → Aggregator  │            │          │
//! └───────────┘            │ → ChangeLog → ...        │            └──────────┘
//!                          └──────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`matrix`]: the Matrix and its clone selector
//! - [`metric`]: typed columns and vector arithmetic
//! - [`instance`]: rows and label bags
//! - [`value`]: numeric types, cell values and counter properties
//! - [`export`]: instance key/label split for exporters
//! - [`node`]: parameter tree loaded from YAML
//! - [`duration`]: poll-interval strings

pub mod duration;
pub mod error;
pub mod export;
pub mod instance;
mod lazy;
pub mod matrix;
pub mod metric;
pub mod node;
pub mod value;

// Re-exports for convenient access
pub use duration::parse_duration;
pub use error::{MatrixError, Result};
pub use export::ExportOptions;
pub use instance::Instance;
pub use matrix::{Matrix, With};
pub use metric::{CellIndex, Metric};
pub use node::Node;
pub use value::{DataType, Property, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the artificial timestamp metric added by performance collectors
pub const TIMESTAMP_METRIC: &str = "timestamp";
