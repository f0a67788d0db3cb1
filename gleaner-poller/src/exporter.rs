// Gleaner Poller - Exporters
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Exporters: consumers of the matrices a poll produced.
//!
//! Non-exportable matrices, metrics and instances are skipped, as are cells
//! not recorded this poll.

use crate::error::Result;
use gleaner::Matrix;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Sink for published matrices.
pub trait Exporter: Send {
    fn name(&self) -> &str;

    /// Publish one matrix; returns the number of exported data points
    fn export(&mut self, matrix: &Matrix) -> Result<usize>;
}

/// One exported data point.
#[derive(Debug, Serialize)]
struct Point<'a> {
    object: &'a str,
    metric: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    keys: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
    value: f64,
}

/// Every recorded, exportable cell of `matrix` as a data point, in key order
fn points(matrix: &Matrix) -> Vec<Point<'_>> {
    if !matrix.is_exportable() {
        return Vec::new();
    }
    let options = matrix.export_options();

    let mut instances: Vec<_> = matrix
        .instances()
        .iter()
        .filter(|(_, i)| i.is_exportable())
        .collect();
    instances.sort_by(|a, b| a.0.cmp(b.0));
    let mut metrics: Vec<_> = matrix
        .metrics()
        .iter()
        .filter(|(_, m)| m.is_exportable())
        .collect();
    metrics.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = Vec::new();
    for (_, instance) in &instances {
        let (keys, free) = options.split_labels(instance.labels());
        for (_, metric) in &metrics {
            let Some(value) = metric.value_f64(*instance) else {
                continue;
            };
            let mut labels: BTreeMap<String, String> = matrix
                .global_labels()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            labels.extend(free.iter().map(|(k, v)| (k.clone(), v.clone())));
            labels.extend(metric.labels().iter().map(|(k, v)| (k.clone(), v.clone())));
            out.push(Point {
                object: &matrix.object,
                metric: metric.name(),
                keys: keys.clone(),
                labels,
                value,
            });
        }
    }
    out
}

/// Writes one JSON object per data point and line.
pub struct JsonLinesExporter<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesExporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesExporter<BufWriter<File>> {
    /// Append to `path`, creating it when missing
    pub fn append_to(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> Exporter for JsonLinesExporter<W> {
    fn name(&self) -> &str {
        "JsonLines"
    }

    fn export(&mut self, matrix: &Matrix) -> Result<usize> {
        let points = points(matrix);
        // one write per matrix keeps lines whole on shared writers like stdout
        let mut buf = Vec::new();
        for point in &points {
            serde_json::to_writer(&mut buf, point)?;
            buf.push(b'\n');
        }
        self.writer.write_all(&buf)?;
        self.writer.flush()?;
        Ok(points.len())
    }
}

/// Logs a one-line summary per matrix.
#[derive(Debug, Default)]
pub struct LogExporter;

impl Exporter for LogExporter {
    fn name(&self) -> &str {
        "Log"
    }

    fn export(&mut self, matrix: &Matrix) -> Result<usize> {
        let count = points(matrix).len();
        info!(
            object = %matrix.object,
            uuid = %matrix.uuid,
            instances = matrix.instance_count(),
            metrics = matrix.metrics().len(),
            points = count,
            "exported"
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner::ExportOptions;

    fn matrix() -> Matrix {
        let mut m = Matrix::new("Test", "volume", "volume");
        m.set_global_label("datacenter", "dc1");
        m.set_export_options(ExportOptions::with_keys(["volume"]));
        m.new_metric_f64("read_ops").unwrap().set_name("read");
        let hidden = m.new_metric_f64("timestamp").unwrap();
        hidden.set_exportable(false);

        let v0 = m.new_instance("v0").unwrap();
        v0.set_label("volume", "vol0");
        v0.set_label("state", "online");
        m.new_instance("v1").unwrap().set_label("volume", "vol1");
        m.new_instance("v2").unwrap().set_exportable(false);

        m.lazy_set_value("read_ops", "v0", 1.5).unwrap();
        m.lazy_set_value("timestamp", "v0", 100.0).unwrap();
        m.lazy_set_value("read_ops", "v2", 7.0).unwrap();
        m
    }

    #[test]
    fn test_json_lines() {
        let mut exporter = JsonLinesExporter::new(Vec::new());
        assert_eq!(exporter.export(&matrix()).unwrap(), 1);

        let text = String::from_utf8(exporter.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let point: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(point["object"], "volume");
        assert_eq!(point["metric"], "read");
        assert_eq!(point["keys"]["volume"], "vol0");
        assert_eq!(point["labels"]["datacenter"], "dc1");
        assert!(point["labels"].get("state").is_none());
        assert_eq!(point["value"], 1.5);
    }

    #[test]
    fn test_non_exportable_matrix() {
        let mut m = matrix();
        m.set_exportable(false);
        let mut exporter = JsonLinesExporter::new(Vec::new());
        assert_eq!(exporter.export(&m).unwrap(), 0);
        assert!(exporter.into_inner().is_empty());
    }

    #[test]
    fn test_append_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.jsonl");
        for _ in 0..2 {
            let mut exporter = JsonLinesExporter::append_to(&path).unwrap();
            exporter.export(&matrix()).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_log_exporter_counts() {
        assert_eq!(LogExporter.export(&matrix()).unwrap(), 1);
    }
}
