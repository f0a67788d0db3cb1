// Gleaner Perf - Performance counter delta engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! PerfEngine - turns raw counter samples into deltas, rates and averages.

use crate::config::PerfConfig;
use crate::counter::CounterSchema;
use crate::error::{PerfError, Result};
use chrono::Utc;
use gleaner::{Matrix, Property, With, TIMESTAMP_METRIC};
use log::{debug, trace, warn};

/// Two-pass delta engine of one perf object.
///
/// Keeps the raw matrix of the previous poll. Every counter except `raw`
/// ones is reduced to `current - previous`; `average` and `percent`
/// counters are then divided by their (already reduced) base counter and
/// `rate` counters by the elapsed seconds.
#[derive(Debug)]
pub struct PerfEngine {
    object: String,
    schema: CounterSchema,
    config: PerfConfig,
    previous: Option<Matrix>,
}

impl PerfEngine {
    /// Create an engine; inconsistent base counters in `schema` are logged
    pub fn new(object: impl Into<String>, schema: CounterSchema, config: PerfConfig) -> Self {
        let object = object.into();
        for problem in schema.check_denominators() {
            warn!("({}) {}", object, problem);
        }
        debug!(
            "({}) {} counters, latency_io_reqd={}",
            object,
            schema.len(),
            config.latency_io_reqd
        );
        Self {
            object,
            schema,
            config,
            previous: None,
        }
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn schema(&self) -> &CounterSchema {
        &self.schema
    }

    pub fn config(&self) -> &PerfConfig {
        &self.config
    }

    /// True once a poll has been cached
    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    /// Forget the cached poll; the next [`cook`](Self::cook) starts over
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Empty matrix with one float64 metric per named counter and the
    /// hidden `timestamp` metric
    pub fn build_matrix(&self, uuid: &str, counters: &[&str]) -> Result<Matrix> {
        let mut matrix = Matrix::new(uuid, self.object.as_str(), self.object.as_str());
        for name in counters {
            let meta = self.schema.require(name)?;
            let metric = matrix.new_metric_f64(meta.name.as_str())?;
            metric.set_property(meta.property);
            if let Some(denominator) = &meta.denominator {
                metric.set_comment(denominator.as_str());
            }
            if !meta.unit.is_empty() {
                metric.set_label("unit", meta.unit.as_str());
            }
        }
        let timestamp = matrix.new_metric_f64(TIMESTAMP_METRIC)?;
        timestamp.set_property(Property::Raw);
        timestamp.set_exportable(false);
        Ok(matrix)
    }

    /// Process one raw poll
    ///
    /// Returns `None` on the first poll, which only primes the cache.
    pub fn cook(&mut self, mut raw: Matrix) -> Result<Option<Matrix>> {
        Self::fill_timestamp(&self.object, &mut raw)?;

        let Some(prev) = self.previous.replace(raw.clone_with(&With::all())) else {
            debug!("({}) first poll, cached {} instances", self.object, raw.instance_count());
            return Ok(None);
        };

        let mut cooked = raw;
        let prev_index = cooked.index_map(&prev);

        let skips = self.delta(&mut cooked, &prev, TIMESTAMP_METRIC, &prev_index)?;
        if skips > 0 {
            debug!("({}) {} instances without a previous timestamp", self.object, skips);
        }

        let mut rates = Vec::new();
        for key in Self::order(&cooked) {
            let property = cooked
                .metric(&key)
                .and_then(|m| m.property())
                .unwrap_or(Property::Raw);
            if property == Property::Raw {
                continue;
            }

            self.delta(&mut cooked, &prev, &key, &prev_index)?;
            match property {
                Property::Rate => rates.push(key),
                Property::Average | Property::Percent => {
                    self.ratio(&mut cooked, &key, property)?;
                }
                Property::Delta | Property::Raw => {}
            }
        }

        for key in rates {
            self.rate(&mut cooked, &key)?;
        }
        Ok(Some(cooked))
    }

    /// Metric keys in evaluation order: base counters before ratio counters
    fn order(matrix: &Matrix) -> Vec<String> {
        let mut keys: Vec<&String> = matrix
            .metrics()
            .keys()
            .filter(|k| k.as_str() != TIMESTAMP_METRIC)
            .collect();
        keys.sort();
        let (plain, ratios): (Vec<&String>, Vec<&String>) = keys
            .into_iter()
            .partition(|k| matrix.metric(k).map_or(true, |m| m.comment().is_empty()));
        plain.into_iter().chain(ratios).cloned().collect()
    }

    /// Stamp cells the device left empty with the wall clock
    fn fill_timestamp(object: &str, raw: &mut Matrix) -> Result<()> {
        let indices: Vec<usize> = raw.instances().values().map(|i| i.index()).collect();
        let Some(ts) = raw.metric_mut(TIMESTAMP_METRIC) else {
            return Err(PerfError::MissingTimestamp(object.to_string()));
        };
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        for i in indices {
            if !ts.is_recorded(i) {
                ts.set_value_f64(i, now)?;
            }
        }
        Ok(())
    }

    fn delta(
        &self,
        cooked: &mut Matrix,
        prev: &Matrix,
        key: &str,
        prev_index: &[Option<usize>],
    ) -> Result<usize> {
        let Some(metric) = cooked.metric_mut(key) else {
            return Ok(0);
        };
        match prev.metric(key) {
            Some(prev_metric) => {
                let skips = metric.delta(prev_metric, prev_index)?;
                trace!("({}) {} delta skipped {} cells", self.object, key, skips);
                Ok(skips)
            }
            None => {
                warn!("({}) {} missing from previous poll", self.object, key);
                for i in 0..metric.len() {
                    metric.set_value_nan(i);
                }
                Ok(metric.len())
            }
        }
    }

    fn ratio(&self, cooked: &mut Matrix, key: &str, property: Property) -> Result<()> {
        let Some(mut metric) = cooked.remove_metric(key) else {
            return Ok(());
        };
        let denominator = metric.comment().to_string();
        match cooked.metric(&denominator) {
            None => warn!(
                "({}) {} base counter {:?} not found",
                self.object, key, denominator
            ),
            Some(base) => {
                let skips = if metric.name().ends_with("latency") {
                    metric.divide_with_threshold(base, self.config.latency_io_reqd)?
                } else {
                    metric.divide(base)?
                };
                if property == Property::Percent {
                    metric.multiply_by_scalar(100.0);
                }
                trace!("({}) {} / {} skipped {} cells", self.object, key, denominator, skips);
            }
        }
        cooked.put_metric(key, metric)?;
        Ok(())
    }

    fn rate(&self, cooked: &mut Matrix, key: &str) -> Result<()> {
        let Some(mut metric) = cooked.remove_metric(key) else {
            return Ok(());
        };
        // no elapsed time, no rate
        let result = match cooked.metric(TIMESTAMP_METRIC) {
            Some(ts) => metric.divide_with_threshold(ts, f64::MIN_POSITIVE).map(|skips| {
                trace!("({}) {} rate skipped {} cells", self.object, key, skips);
            }),
            None => Ok(()),
        };
        cooked.put_metric(key, metric)?;
        result.map_err(PerfError::from)
    }
}

/// Set the `timestamp` cell of every instance to `seconds`
pub fn set_timestamp(matrix: &mut Matrix, seconds: f64) -> Result<()> {
    let indices: Vec<usize> = matrix.instances().values().map(|i| i.index()).collect();
    let object = matrix.object.clone();
    let ts = matrix
        .metric_mut(TIMESTAMP_METRIC)
        .ok_or(PerfError::MissingTimestamp(object))?;
    for i in indices {
        ts.set_value_f64(i, seconds)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::CounterMeta;

    fn engine() -> PerfEngine {
        let mut schema = CounterSchema::new();
        schema.insert(CounterMeta::new("ops", Property::Rate));
        schema.insert(CounterMeta::new("lat", Property::Average).with_denominator("ops"));
        schema.insert(CounterMeta::new("size", Property::Raw).with_unit("b"));
        PerfEngine::new("volume", schema, PerfConfig::default())
    }

    #[test]
    fn test_build_matrix() {
        let e = engine();
        let m = e.build_matrix("ZapiPerf", &["ops", "lat", "size"]).unwrap();
        assert_eq!(m.metrics().len(), 4);
        assert_eq!(m.metric("lat").unwrap().comment(), "ops");
        assert_eq!(m.metric("lat").unwrap().property(), Some(Property::Average));
        assert_eq!(m.metric("size").unwrap().label("unit"), Some("b"));
        assert!(!m.metric(TIMESTAMP_METRIC).unwrap().is_exportable());
        assert!(matches!(
            e.build_matrix("ZapiPerf", &["nope"]),
            Err(PerfError::UnknownCounter(_))
        ));
    }

    #[test]
    fn test_order_puts_bases_first() {
        let e = engine();
        let m = e.build_matrix("ZapiPerf", &["lat", "ops", "size"]).unwrap();
        let order = PerfEngine::order(&m);
        assert_eq!(order, vec!["ops", "size", "lat"]);
    }

    #[test]
    fn test_missing_timestamp() {
        let mut e = engine();
        let m = Matrix::new("ZapiPerf", "volume", "volume");
        assert!(matches!(e.cook(m), Err(PerfError::MissingTimestamp(_))));
    }

    #[test]
    fn test_unrecorded_timestamp_uses_wall_clock() {
        let mut e = engine();
        let mut m = e.build_matrix("ZapiPerf", &["ops"]).unwrap();
        m.new_instance("v1").unwrap();
        assert!(e.cook(m).unwrap().is_none());
        assert!(e.has_previous());
        e.reset();
        assert!(!e.has_previous());
    }
}
