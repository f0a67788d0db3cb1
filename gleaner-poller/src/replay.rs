// Gleaner Poller - Dataset replay collector
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Replay collector that feeds recorded polls from a CSV dataset.
//!
//! One row per cell:
//!
//! ```text
//! poll,timestamp,instance,metric,value,labels
//! 1,1700000000,vol0,total_ops,1000,node=n1;svm=vs0
//! 1,1700000000,vol1,total_ops,250,node=n2;svm=vs0
//! 2,1700000060,vol0,total_ops,4000,
//! ```
//!
//! Rows sharing a `poll` number form one matrix. An empty `value` leaves the
//! cell unrecorded. Labels are read the first time an instance shows up in a
//! poll; an empty `labels` field reuses the instance's last known labels.

use crate::collector::{Collector, FetchFuture};
use crate::config::ReplayConfig;
use crate::error::{PollerError, Result};
use gleaner::{DataType, Matrix, Property, TIMESTAMP_METRIC};
use gleaner_perf::CounterSchema;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Dataset row for replay.
#[derive(Debug, Clone, Deserialize)]
struct Row {
    poll: u64,
    timestamp: f64,
    instance: String,
    metric: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    labels: String,
}

/// Summary of a loaded dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    pub polls: usize,
    pub instances: usize,
    pub metrics: usize,
}

/// Collector replaying a CSV dataset, one recorded poll per fetch.
#[derive(Debug)]
pub struct ReplayCollector {
    config: ReplayConfig,
    polls: Vec<Matrix>,
    position: usize,
    delay: Option<Duration>,
}

impl ReplayCollector {
    /// Load a dataset from `config.csv_path`.
    pub fn from_csv(config: ReplayConfig) -> Result<Self> {
        if !config.csv_path.exists() {
            return Err(PollerError::FileNotFound(config.csv_path.display().to_string()));
        }
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&config.csv_path)?;
        Self::from_reader(config, reader)
    }

    /// Load a dataset from any CSV reader; `config.csv_path` is ignored.
    pub fn from_reader<R: std::io::Read>(
        config: ReplayConfig,
        mut reader: csv::Reader<R>,
    ) -> Result<Self> {
        let mut polls: BTreeMap<u64, Matrix> = BTreeMap::new();
        let mut known: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for (i, result) in reader.deserialize::<Row>().enumerate() {
            let row = result?;
            // header is line 1
            let line = i as u64 + 2;
            let matrix = match polls.entry(row.poll) {
                std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::btree_map::Entry::Vacant(e) => {
                    e.insert(Self::empty_matrix(&config.object)?)
                }
            };
            Self::apply_row(matrix, &row, line, &mut known)?;
        }

        if polls.is_empty() {
            return Err(PollerError::EmptyDataset);
        }

        let collector = Self {
            config,
            polls: polls.into_values().collect(),
            position: 0,
            delay: None,
        };
        let info = collector.dataset_info();
        info!(
            "Loaded dataset for {}: {} polls, {} instances, {} metrics",
            collector.config.object, info.polls, info.instances, info.metrics
        );
        Ok(collector)
    }

    /// Annotate every replayed metric with its counter metadata, so the
    /// polls can go through the perf engine
    pub fn with_schema(mut self, schema: &CounterSchema) -> Self {
        for matrix in &mut self.polls {
            for (key, metric) in matrix.metrics_iter_mut() {
                if key == TIMESTAMP_METRIC {
                    continue;
                }
                let Some(meta) = schema.get(key) else {
                    warn!("({}) counter {} not in schema, kept raw", self.config.object, key);
                    continue;
                };
                metric.set_property(meta.property);
                if let Some(denominator) = &meta.denominator {
                    metric.set_comment(denominator.as_str());
                }
                if !meta.unit.is_empty() {
                    metric.set_label("unit", meta.unit.as_str());
                }
            }
        }
        self
    }

    /// Sleep this long before answering each fetch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn dataset_info(&self) -> DatasetInfo {
        let mut instances = std::collections::HashSet::new();
        let mut metrics = std::collections::HashSet::new();
        for m in &self.polls {
            instances.extend(m.instances().keys());
            metrics.extend(m.metrics().keys().filter(|k| k.as_str() != TIMESTAMP_METRIC));
        }
        DatasetInfo {
            polls: self.polls.len(),
            instances: instances.len(),
            metrics: metrics.len(),
        }
    }

    /// Index of the next poll to replay
    pub fn position(&self) -> usize {
        self.position
    }

    fn empty_matrix(object: &str) -> Result<Matrix> {
        let mut matrix = Matrix::new("Replay", object, object);
        let timestamp = matrix.new_metric_f64(TIMESTAMP_METRIC)?;
        timestamp.set_property(Property::Raw);
        timestamp.set_exportable(false);
        Ok(matrix)
    }

    fn apply_row(
        matrix: &mut Matrix,
        row: &Row,
        line: u64,
        known: &mut HashMap<String, Vec<(String, String)>>,
    ) -> Result<()> {
        if row.instance.is_empty() || row.metric.is_empty() {
            return Err(PollerError::InvalidRow {
                line,
                reason: "instance and metric are required".into(),
            });
        }

        if matrix.instance(&row.instance).is_none() {
            let mut labels = parse_labels(&row.labels).map_err(|reason| PollerError::InvalidRow {
                line,
                reason,
            })?;
            if labels.is_empty() {
                labels = known.get(&row.instance).cloned().unwrap_or_default();
            } else {
                known.insert(row.instance.clone(), labels.clone());
            }
            let instance = matrix.new_instance(row.instance.as_str())?;
            for (k, v) in labels {
                instance.set_label(k, v);
            }
        }
        matrix.lazy_set_value(TIMESTAMP_METRIC, &row.instance, row.timestamp)?;

        matrix.metric_or_insert(&row.metric, DataType::Float64);
        if row.value.is_empty() {
            return Ok(());
        }
        let value: f64 = row.value.parse().map_err(|_| PollerError::InvalidRow {
            line,
            reason: format!("value {:?} is not a number", row.value),
        })?;
        matrix.lazy_set_value(&row.metric, &row.instance, value)?;
        Ok(())
    }
}

/// Parse `k=v;k=v`
fn parse_labels(raw: &str) -> std::result::Result<Vec<(String, String)>, String> {
    raw.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| format!("label {:?} is not key=value", pair))
        })
        .collect()
}

impl Collector for ReplayCollector {
    fn name(&self) -> &str {
        "Replay"
    }

    fn object(&self) -> &str {
        &self.config.object
    }

    fn fetch(&mut self) -> FetchFuture<'_> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                sleep(delay).await;
            }
            if self.position >= self.polls.len() {
                if !self.config.loop_replay {
                    return Err(PollerError::Collector(format!(
                        "replay of {} exhausted after {} polls",
                        self.config.object,
                        self.polls.len()
                    )));
                }
                info!("Dataset for {} complete, looping...", self.config.object);
                self.position = 0;
            }
            let matrix = self.polls[self.position].clone();
            debug!(
                "Replaying poll {}/{} of {}",
                self.position + 1,
                self.polls.len(),
                self.config.object
            );
            self.position += 1;
            Ok(matrix)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
poll,timestamp,instance,metric,value,labels
1,100,vol0,ops,10,node=n1;svm=vs0
1,100,vol1,ops,20,node=n2
2,160,vol0,ops,40,
2,160,vol1,ops,,
";

    fn collector(csv: &str, loop_replay: bool) -> Result<ReplayCollector> {
        let config = ReplayConfig::new("", "volume").with_loop(loop_replay);
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(csv.as_bytes());
        ReplayCollector::from_reader(config, reader)
    }

    #[test]
    fn test_parse_labels() {
        let labels = parse_labels("node=n1; svm = vs0;").unwrap();
        let expected = vec![
            ("node".to_string(), "n1".to_string()),
            ("svm".to_string(), "vs0".to_string()),
        ];
        assert_eq!(labels, expected);
        assert!(parse_labels("").unwrap().is_empty());
        assert!(parse_labels("node").is_err());
    }

    #[test]
    fn test_dataset_info() {
        let c = collector(CSV, true).unwrap();
        assert_eq!(
            c.dataset_info(),
            DatasetInfo {
                polls: 2,
                instances: 2,
                metrics: 1
            }
        );
    }

    #[test]
    fn test_empty_and_invalid() {
        assert!(matches!(
            collector("poll,timestamp,instance,metric,value,labels\n", true),
            Err(PollerError::EmptyDataset)
        ));
        let bad = "poll,timestamp,instance,metric,value,labels\n1,100,vol0,ops,lots,\n";
        assert!(matches!(
            collector(bad, true),
            Err(PollerError::InvalidRow { line: 2, .. })
        ));
        assert!(matches!(
            ReplayCollector::from_csv(ReplayConfig::new("/nonexistent.csv", "volume")),
            Err(PollerError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_replays_in_order() {
        let mut c = collector(CSV, false).unwrap();

        let first = c.fetch().await.unwrap();
        assert_eq!(first.object, "volume");
        assert_eq!(first.lazy_value_f64("ops", "vol1"), Some(20.0));
        assert_eq!(first.instance("vol0").unwrap().label("svm"), Some("vs0"));
        assert_eq!(first.lazy_value_f64(TIMESTAMP_METRIC, "vol0"), Some(100.0));

        let second = c.fetch().await.unwrap();
        assert_eq!(second.lazy_value_f64("ops", "vol0"), Some(40.0));
        assert_eq!(second.instance("vol0").unwrap().label("node"), Some("n1"));
        assert_eq!(second.lazy_value_f64("ops", "vol1"), None);

        assert!(matches!(c.fetch().await, Err(PollerError::Collector(_))));
    }

    #[tokio::test]
    async fn test_loop_replay() {
        let mut c = collector(CSV, true).unwrap();
        c.fetch().await.unwrap();
        c.fetch().await.unwrap();
        let again = c.fetch().await.unwrap();
        assert_eq!(again.lazy_value_f64("ops", "vol0"), Some(10.0));
        assert_eq!(c.position(), 1);
    }

    #[test]
    fn test_with_schema() {
        let schema = CounterSchema::from_records([("ops", "", "rate", "per_sec", "")]).unwrap();
        let c = collector(CSV, true).unwrap().with_schema(&schema);
        let metric = c.polls[0].metric("ops").unwrap();
        assert_eq!(metric.property(), Some(Property::Rate));
        assert_eq!(metric.label("unit"), Some("per_sec"));
    }
}
