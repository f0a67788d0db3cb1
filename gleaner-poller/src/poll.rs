// Gleaner Poller - Poll loop
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-object poll task.
//!
//! Each poll runs `fetch → perf engine → plugin chain → exporters` to
//! completion before the next tick is awaited, so polls of one object never
//! overlap.

use crate::collector::Collector;
use crate::error::{PollerError, Result};
use crate::exporter::Exporter;
use gleaner::{ExportOptions, Matrix};
use gleaner_perf::PerfEngine;
use gleaner_plugins::{DataMap, PluginChain};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Counters of one poll task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub polls: u64,
    pub timeouts: u64,
    pub errors: u64,
    /// Plugins that failed, summed over polls
    pub plugin_errors: u64,
    pub exported: u64,
}

/// What one poll produced.
#[derive(Debug, Default)]
pub struct PollOutcome {
    /// Object matrix followed by plugin output; empty while the perf
    /// engine primes its cache
    pub matrices: Vec<Matrix>,
    /// Data points handed to exporters
    pub exported: usize,
}

/// Poll loop of one object.
pub struct PollTask {
    object: String,
    collector: Box<dyn Collector>,
    perf: Option<PerfEngine>,
    chain: PluginChain,
    exporters: Vec<Box<dyn Exporter>>,
    client_timeout: Duration,
    global_labels: HashMap<String, String>,
    export_options: Option<ExportOptions>,
    stats: PollStats,
}

impl PollTask {
    pub fn new(collector: Box<dyn Collector>, client_timeout: Duration) -> Self {
        Self {
            object: collector.object().to_string(),
            collector,
            perf: None,
            chain: PluginChain::new(),
            exporters: Vec::new(),
            client_timeout,
            global_labels: HashMap::new(),
            export_options: None,
            stats: PollStats::default(),
        }
    }

    /// Derive perf counters before the plugin chain runs
    pub fn with_perf(mut self, engine: PerfEngine) -> Self {
        self.perf = Some(engine);
        self
    }

    pub fn with_chain(mut self, chain: PluginChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_exporter(mut self, exporter: Box<dyn Exporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    /// Labels merged into every fetched matrix
    pub fn with_global_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.global_labels.insert(key.into(), value.into());
        self
    }

    /// Export options for fetched matrices that carry none
    pub fn with_export_options(mut self, options: ExportOptions) -> Self {
        self.export_options = Some(options);
        self
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn stats(&self) -> PollStats {
        self.stats
    }

    pub fn perf(&self) -> Option<&PerfEngine> {
        self.perf.as_ref()
    }

    /// Run one poll to completion
    ///
    /// A timed-out or failed fetch leaves the perf cache untouched, so the
    /// next successful poll is diffed against the last good one.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        self.stats.polls += 1;
        let started = Instant::now();

        let result = timeout(self.client_timeout, self.collector.fetch()).await;
        let fetched = match result {
            Ok(Ok(matrix)) => matrix,
            Ok(Err(e)) => {
                self.stats.errors += 1;
                return Err(e);
            }
            Err(_) => {
                self.stats.timeouts += 1;
                return Err(PollerError::Timeout {
                    object: self.object.clone(),
                    timeout: self.client_timeout,
                });
            }
        };

        let mut matrix = match self.perf.as_mut() {
            None => fetched,
            Some(engine) => match engine.cook(fetched) {
                Ok(Some(cooked)) => cooked,
                Ok(None) => {
                    debug!(object = %self.object, "perf cache primed");
                    return Ok(PollOutcome::default());
                }
                Err(e) => {
                    self.stats.errors += 1;
                    return Err(e.into());
                }
            },
        };
        matrix.set_global_labels(&self.global_labels);
        if !matrix.has_export_options() {
            if let Some(options) = &self.export_options {
                matrix.set_export_options(options.clone());
            }
        }

        let mut data = DataMap::new();
        data.insert(self.object.clone(), matrix);
        let chained = self.chain.run(&mut data);
        self.stats.plugin_errors += chained.errors as u64;

        let mut matrices: Vec<Matrix> = data.into_values().collect();
        matrices.extend(chained.matrices);

        let mut exported = 0;
        for exporter in &mut self.exporters {
            for m in &matrices {
                match exporter.export(m) {
                    Ok(n) => exported += n,
                    Err(e) => {
                        warn!(object = %self.object, exporter = exporter.name(), error = %e, "export failed")
                    }
                }
            }
        }
        self.stats.exported += exported as u64;

        debug!(
            object = %self.object,
            matrices = matrices.len(),
            exported,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "poll complete"
        );
        Ok(PollOutcome { matrices, exported })
    }

    /// Poll every `every` until `limit` polls ran (forever when `None`)
    pub async fn run(mut self, every: Duration, limit: Option<u64>) -> PollStats {
        let mut ticker = interval(every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            object = %self.object,
            collector = self.collector.name(),
            interval_ms = every.as_millis() as u64,
            plugins = ?self.chain.names(),
            "starting poll task"
        );

        loop {
            if limit.map_or(false, |l| self.stats.polls >= l) {
                break;
            }
            ticker.tick().await;
            match self.poll_once().await {
                Ok(_) => {}
                Err(e @ PollerError::Timeout { .. }) => {
                    warn!(object = %self.object, error = %e, "poll timed out")
                }
                Err(e) => warn!(object = %self.object, error = %e, "poll failed"),
            }
        }

        info!(object = %self.object, stats = ?self.stats, "poll task stopped");
        self.stats
    }
}

impl std::fmt::Debug for PollTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollTask")
            .field("object", &self.object)
            .field("collector", &self.collector.name())
            .field("perf", &self.perf.is_some())
            .field("chain", &self.chain)
            .field("stats", &self.stats)
            .finish()
    }
}
