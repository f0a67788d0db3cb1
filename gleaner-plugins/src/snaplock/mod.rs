// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Volume SnapLock retention labels
//!
//! Each retention label holding an ISO-8601 duration gets two companions:
//! `<label>_seconds` and a readable `<label>_display`.

pub mod duration;

use crate::error::{PluginError, Result};
use crate::plugin::{DataMap, Plugin, PluginContext, PluginOutput, Remote};
use duration::DurationParser;
use log::debug;

/// Labels rewritten on every volume
pub const DURATION_LABELS: [&str; 4] = [
    "minimum_retention_period",
    "default_retention_period",
    "maximum_retention_period",
    "autocommit_period",
];

pub struct VolumeSnapLock {
    ctx: PluginContext,
    parser: Option<DurationParser>,
}

impl VolumeSnapLock {
    pub fn new(ctx: PluginContext) -> Self {
        Self { ctx, parser: None }
    }

    fn days_param(&self, name: &str, default: i64) -> Result<i64> {
        match self.ctx.params.child_content(name) {
            None => Ok(default),
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(PluginError::invalid_param(name, "expected a positive day count")),
            },
        }
    }
}

impl Plugin for VolumeSnapLock {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    fn init(&mut self, _remote: &Remote) -> Result<()> {
        let per_year = self.days_param("days_per_year", DurationParser::DEFAULT_DAYS_PER_YEAR)?;
        let per_month = self.days_param("days_per_month", DurationParser::DEFAULT_DAYS_PER_MONTH)?;
        self.parser = Some(DurationParser::new(per_year, per_month)?);
        Ok(())
    }

    fn run(&mut self, data: &mut DataMap) -> Result<PluginOutput> {
        let Some(parser) = &self.parser else {
            return Ok(PluginOutput::none());
        };
        let matrix = self.ctx.matrix(data)?;

        for (_, instance) in matrix.instances_iter_mut() {
            for field in DURATION_LABELS {
                let raw = instance.label_or_empty(field).to_string();
                if raw.is_empty() {
                    continue;
                }
                match parser.parse(&raw) {
                    Ok(r) => {
                        instance.set_label(format!("{}_seconds", field), r.seconds.to_string());
                        instance.set_label(format!("{}_display", field), r.display);
                    }
                    Err(e) => debug!(
                        "{} {}={:?} on {}: {}",
                        self.ctx.prefix(),
                        field,
                        raw,
                        instance.label_or_empty("uuid"),
                        e
                    ),
                }
            }
        }
        Ok(PluginOutput::none())
    }
}
