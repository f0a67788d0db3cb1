// Gleaner Poller - Task wiring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Builds one poll task per configured object and runs them side by side.

use crate::config::{ObjectConfig, PollerConfig, ReplayConfig};
use crate::error::{PollerError, Result};
use crate::exporter::{Exporter, JsonLinesExporter, LogExporter};
use crate::poll::{PollStats, PollTask};
use crate::replay::ReplayCollector;
use gleaner_perf::{CounterSchema, PerfConfig, PerfEngine};
use gleaner_plugins::{PluginChain, Registry, Remote};
use std::path::PathBuf;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Where published data points go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// JSON lines on stdout
    Stdout,
    /// One `<object>.jsonl` file per object
    Directory(PathBuf),
    /// Summary log lines only
    Log,
}

impl Output {
    fn exporter(&self, object: &str) -> Result<Box<dyn Exporter>> {
        Ok(match self {
            Output::Stdout => Box::new(JsonLinesExporter::new(std::io::stdout())),
            Output::Directory(dir) => {
                std::fs::create_dir_all(dir)?;
                Box::new(JsonLinesExporter::append_to(dir.join(format!("{}.jsonl", object)))?)
            }
            Output::Log => Box::new(LogExporter),
        })
    }
}

/// Assemble the poll task of `object`
///
/// Replay is the only bundled collector, so the object needs a `csv`
/// dataset. A `counters` schema routes its polls through the perf engine.
pub fn build_task(
    poller: &PollerConfig,
    object: &ObjectConfig,
    registry: &Registry,
    output: &Output,
) -> Result<PollTask> {
    let csv = object
        .csv
        .clone()
        .ok_or_else(|| PollerError::Config(format!("object {} has no csv dataset", object.name)))?;
    let mut collector = ReplayCollector::from_csv(ReplayConfig::new(csv, object.name.as_str()))?;

    let perf = match &object.counters {
        None => None,
        Some(path) => {
            let yaml = std::fs::read_to_string(path)?;
            let schema = CounterSchema::from_yaml_str(&yaml)?;
            collector = collector.with_schema(&schema);
            let config = PerfConfig::from_node(&object.params)?;
            Some(PerfEngine::new(object.name.as_str(), schema, config))
        }
    };

    let remote = Remote {
        name: poller.name.clone(),
        ..Remote::default()
    };
    let chain = PluginChain::build(
        registry,
        "Replay",
        &object.name,
        &object.plugins,
        &object.params,
        &remote,
    );

    let mut task = PollTask::new(Box::new(collector), poller.client_timeout)
        .with_chain(chain)
        .with_global_label("datacenter", poller.name.as_str())
        .with_exporter(output.exporter(&object.name)?);
    if let Some(engine) = perf {
        task = task.with_perf(engine);
    }
    if let Some(options) = &object.export_options {
        task = task.with_export_options(options.clone());
    }
    Ok(task)
}

/// Run every object until `limit` polls each, or until Ctrl-C
///
/// Objects whose task cannot be built are logged and skipped.
pub async fn run(
    config: PollerConfig,
    output: Output,
    limit: Option<u64>,
) -> Result<Vec<(String, PollStats)>> {
    let registry = Registry::global();
    let mut tasks = JoinSet::new();
    for object in &config.objects {
        match build_task(&config, object, registry, &output) {
            Ok(task) => {
                let every = config.poll_interval;
                tasks.spawn(async move {
                    let name = task.object().to_string();
                    let stats = task.run(every, limit).await;
                    (name, stats)
                });
            }
            Err(e) => error!(object = %object.name, error = %e, "object disabled"),
        }
    }
    if tasks.is_empty() {
        return Err(PollerError::Config("no object could be started".into()));
    }
    info!(poller = %config.name, objects = tasks.len(), "poller started");

    let mut finished = Vec::new();
    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                Some(Ok(result)) => finished.push(result),
                Some(Err(e)) => warn!(error = %e, "poll task aborted"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                tasks.shutdown().await;
                break;
            }
        }
    }
    Ok(finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_object_without_dataset() {
        let poller = PollerConfig::default();
        let object = ObjectConfig::new("volume");
        let err = build_task(&poller, &object, Registry::global(), &Output::Log).unwrap_err();
        assert!(matches!(err, PollerError::Config(_)));
    }

    #[test]
    fn test_output_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let out = Output::Directory(dir.path().join("nested"));
        let exporter = out.exporter("volume").unwrap();
        assert_eq!(exporter.name(), "JsonLines");
        assert!(Path::new(&dir.path().join("nested/volume.jsonl")).exists());
    }
}
