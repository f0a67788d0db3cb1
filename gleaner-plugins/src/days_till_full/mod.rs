// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Days-Till-Full forecaster
//!
//! Fits used capacity against elapsed days per volume with recursive least
//! squares and a forgetting factor of 0.98, then exports how many days remain
//! until the fit reaches the total capacity, clamped to `[0, 365]`.
//!
//! ```yaml
//! DaysTillFull:
//!   schedule:
//!     - data: 24h
//!   counters:
//!     - used: size_used
//!     - total: size_total
//!     - metric: days_to_full
//! ```

pub mod algebra;

use crate::error::{PluginError, Result};
use crate::plugin::{DataMap, Plugin, PluginContext, PluginOutput, Remote};
use algebra::Mat;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::HashMap;
use std::time::Duration;

/// Inverse of the forgetting factor 0.98
pub const LAMBDA_INV: f32 = 1.020_408_2;

/// Forecast horizon in days, also returned when no fill date is predictable
pub const MAX_DAYS: f32 = 365.0;

/// Default plugin interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(24 * 3600);

const MILLIS_IN_DAY: f64 = 24.0 * 3600.0 * 1000.0;

/// Recursive least-squares fit of `used = b + m * day`
#[derive(Debug, Clone)]
pub struct Forecaster {
    init_time: DateTime<Utc>,
    a: Mat,
    w: Mat,
    observations: u64,
}

impl Forecaster {
    pub fn new(init_time: DateTime<Utc>) -> Self {
        Self {
            init_time,
            a: Mat::identity(2),
            w: Mat::zeros(2, 1),
            observations: 0,
        }
    }

    /// Days since the first observation, rounded to two decimals
    pub fn day_index(&self, now: DateTime<Utc>) -> f32 {
        let days = (now - self.init_time).num_milliseconds() as f64 / MILLIS_IN_DAY;
        ((days * 100.0).round() / 100.0) as f32
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    /// Fold in one `(day, used)` sample
    pub fn add_observation(&mut self, day: f32, used: f32) {
        let x = Mat::column(&[1.0, day]);
        if self.update(&x, used).is_none() {
            warn!("forecaster shape mismatch, sample dropped");
            return;
        }
        self.observations += 1;
    }

    fn update(&mut self, x: &Mat, value: f32) -> Option<()> {
        let xt = x.t();
        let z = self.a.scale(LAMBDA_INV).dot(x)?;
        let alpha = xt.dot(&z)?.add_scalar(1.0).reciprocal().flt()?;

        let correction = xt.dot(&self.w.plus(&z.scale(value))?)?.flt()?;
        let w = self.w.plus(&z.scale(value - alpha * correction))?;
        let a = self.a.minus(&z.scale(alpha).dot(&z.t())?)?;
        self.w = w;
        self.a = a;
        Some(())
    }

    /// Day index at which the fit reaches `total`; [`MAX_DAYS`] when the
    /// slope gives no finite answer
    pub fn predict(&self, total: f32) -> f32 {
        let (Some(intercept), Some(slope)) = (self.w.get(0, 0), self.w.get(1, 0)) else {
            return MAX_DAYS;
        };
        let day = (total - intercept) / slope;
        if day.is_finite() {
            day
        } else {
            MAX_DAYS
        }
    }

    /// Whole days from `current` until full, within `[0, 365]`
    pub fn days_to_full(&self, total: f32, current: f32) -> f32 {
        let predicted = self.predict(total).max(0.0);
        (predicted - current).trunc().clamp(0.0, MAX_DAYS)
    }
}

/// One `used`/`total`/`metric` triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtfRule {
    pub used: String,
    pub total: String,
    pub metric: String,
}

/// Storage exhaustion forecaster plugin
pub struct DaysTillFull {
    ctx: PluginContext,
    rules: Vec<DtfRule>,
    forecasters: HashMap<String, Forecaster>,
}

impl DaysTillFull {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            ctx,
            rules: Vec::new(),
            forecasters: HashMap::new(),
        }
    }

    /// Rules from the `counters` children; a rule is complete once all of
    /// `used`, `total` and `metric` have been seen
    fn parse_rules(&mut self) {
        let Some(counters) = self.ctx.params.child("counters") else {
            return;
        };
        let (mut used, mut total, mut metric) = (None, None, None);
        for child in counters.children() {
            let content = child.content().to_string();
            match child.name() {
                "used" => used = Some(content),
                "total" => total = Some(content),
                "metric" => metric = Some(content),
                other => warn!("{} unknown counter field {}", self.ctx.prefix(), other),
            }
            if let (Some(u), Some(t), Some(m)) = (&used, &total, &metric) {
                self.rules.push(DtfRule {
                    used: u.clone(),
                    total: t.clone(),
                    metric: m.clone(),
                });
                (used, total, metric) = (None, None, None);
            }
        }
    }

    pub fn rules(&self) -> &[DtfRule] {
        &self.rules
    }

    /// Add one observation per exportable volume and write the forecast for
    /// volumes that have been seen before
    pub fn observe(&mut self, data: &mut DataMap, now: DateTime<Utc>) -> Result<()> {
        let matrix = self.ctx.matrix(data)?;

        for rule in &self.rules {
            let (Some(used_key), Some(total_key)) = (
                matrix.display_metric_key(&rule.used).map(String::from),
                matrix.display_metric_key(&rule.total).map(String::from),
            ) else {
                warn!(
                    "{} metric does not exist used={} total={}",
                    self.ctx.prefix(),
                    rule.used,
                    rule.total
                );
                continue;
            };

            let mut results = Vec::new();
            for (key, instance) in matrix.instances() {
                if !instance.is_exportable() {
                    continue;
                }
                let used = matrix.metric(&used_key).and_then(|m| m.value_f64(instance));
                let total = matrix.metric(&total_key).and_then(|m| m.value_f64(instance));
                let (Some(used), Some(total)) = (used, total) else {
                    continue;
                };

                let id = match instance.label("uuid") {
                    Some(uuid) if !uuid.is_empty() => uuid.to_string(),
                    _ => key.clone(),
                };
                let forecaster = self
                    .forecasters
                    .entry(format!("{}/{}", rule.metric, id))
                    .or_insert_with(|| Forecaster::new(now));
                let day = forecaster.day_index(now);
                forecaster.add_observation(day, used as f32);

                if forecaster.observations() > 1 {
                    results.push((instance.index(), forecaster.days_to_full(total as f32, day)));
                }
            }

            if results.is_empty() {
                continue;
            }
            let target = matrix.metric_or_insert(&rule.metric, gleaner::DataType::Float64);
            for (index, days) in results {
                target.set_value_f64(index, f64::from(days))?;
            }
        }
        Ok(())
    }
}

impl Plugin for DaysTillFull {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    fn init(&mut self, _remote: &Remote) -> Result<()> {
        self.parse_rules();
        if self.rules.is_empty() {
            return Err(PluginError::MissingParam("valid rules".into()));
        }
        let rate = self.ctx.set_plugin_interval(Some(DEFAULT_INTERVAL));
        debug!(
            "{} parsed {} rules, invocation rate {}",
            self.ctx.prefix(),
            self.rules.len(),
            rate
        );
        Ok(())
    }

    fn run(&mut self, data: &mut DataMap) -> Result<PluginOutput> {
        if self.ctx.invocation_mut().tick() {
            self.observe(data, Utc::now())?;
        }
        Ok(PluginOutput::none())
    }
}
