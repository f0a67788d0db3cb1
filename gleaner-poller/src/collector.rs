// Gleaner Poller - Collector contract
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Producers of matrices.
//!
//! A collector talks to a device (or replays a dataset) and returns the
//! state of one object at one poll. Transport, authentication and endpoint
//! parsing live behind this trait.

use crate::error::Result;
use gleaner::Matrix;
use std::future::Future;
use std::pin::Pin;

/// Future returned by [`Collector::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Matrix>> + Send + 'a>>;

/// Produces one matrix per poll for a single object.
pub trait Collector: Send {
    /// Collector name, e.g. `Rest` or `Replay`
    fn name(&self) -> &str;

    /// Object the produced matrices describe
    fn object(&self) -> &str;

    /// Poll the device once
    fn fetch(&mut self) -> FetchFuture<'_>;
}
