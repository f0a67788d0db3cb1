// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Single-unit ISO-8601 durations: `PnY`, `PnM`, `PnD`, `PTnH`, `PTnM`,
//! plus `infinite` and `none`.

use regex::Regex;
use thiserror::Error;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Why a retention duration was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    /// Combined units such as `P1Y10M`, or no unit at all
    #[error("unsupported duration (must be a single unit): {0:?}")]
    Unsupported(String),

    #[error("duration out of range: {0:?}")]
    Overflow(String),
}

/// Seconds and display form of a duration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retention {
    /// `-1` for infinite
    pub seconds: i64,
    pub display: String,
}

impl Retention {
    fn new(seconds: i64, display: impl Into<String>) -> Self {
        Self {
            seconds,
            display: display.into(),
        }
    }

    fn counted(n: i64, unit_seconds: i64, word: &str, raw: &str) -> Result<Self, DurationError> {
        let seconds = n
            .checked_mul(unit_seconds)
            .ok_or_else(|| DurationError::Overflow(raw.to_string()))?;
        let suffix = if n == 1 { "" } else { "s" };
        Ok(Self::new(seconds, format!("{} {}{}", n, word, suffix)))
    }
}

/// Duration parser with configurable calendar lengths
#[derive(Debug, Clone)]
pub struct DurationParser {
    date: Regex,
    time: Regex,
    days_per_year: i64,
    days_per_month: i64,
}

impl DurationParser {
    pub const DEFAULT_DAYS_PER_YEAR: i64 = 365;
    pub const DEFAULT_DAYS_PER_MONTH: i64 = 30;

    pub fn new(days_per_year: i64, days_per_month: i64) -> Result<Self, regex::Error> {
        Ok(Self {
            date: Regex::new(r"^P(\d+)([YMD])$")?,
            time: Regex::new(r"^PT(\d+)([HM])$")?,
            days_per_year,
            days_per_month,
        })
    }

    pub fn parse(&self, raw: &str) -> Result<Retention, DurationError> {
        let upper = raw.trim().to_uppercase();
        match upper.as_str() {
            "" => return Err(DurationError::Empty),
            "INFINITE" => return Ok(Retention::new(-1, "infinite")),
            "NONE" => return Ok(Retention::new(0, "none")),
            _ => {}
        }

        let count = |digits: &str| {
            digits
                .parse::<i64>()
                .map_err(|_| DurationError::Overflow(raw.to_string()))
        };

        if let Some(caps) = self.date.captures(&upper) {
            let n = count(&caps[1])?;
            return match &caps[2] {
                "Y" => Retention::counted(n, self.days_per_year * DAY, "year", raw),
                "M" => Retention::counted(n, self.days_per_month * DAY, "month", raw),
                _ => Retention::counted(n, DAY, "day", raw),
            };
        }
        if let Some(caps) = self.time.captures(&upper) {
            let n = count(&caps[1])?;
            return match &caps[2] {
                "H" => Retention::counted(n, HOUR, "hour", raw),
                _ => Retention::counted(n, MINUTE, "minute", raw),
            };
        }
        Err(DurationError::Unsupported(raw.to_string()))
    }
}
