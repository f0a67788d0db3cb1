//! Poll-interval strings (`6m`, `30s`, `1h30m`, `500ms`)

use crate::error::{MatrixError, Result};
use std::time::Duration;

/// Parse a schedule or timeout string
///
/// Accepts a sequence of `<number><unit>` terms with units `ns`, `us`, `µs`,
/// `ms`, `s`, `m`, `h`. A bare number is read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    let invalid = |reason: &str| MatrixError::invalid_param(format!("duration {:?}", input), reason);

    if s.is_empty() {
        return Err(invalid("empty"));
    }
    if let Ok(secs) = s.parse::<f64>() {
        if secs < 0.0 || !secs.is_finite() {
            return Err(invalid("negative or not finite"));
        }
        return Ok(Duration::from_secs_f64(secs));
    }

    let mut total = 0.0_f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| invalid("missing unit"))?;
        if num_end == 0 {
            return Err(invalid("expected a number"));
        }
        let number: f64 = rest[..num_end]
            .parse()
            .map_err(|_| invalid("bad number"))?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let factor = match &rest[..unit_end] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid("unknown unit")),
        };
        total += number * factor;
        rest = &rest[unit_end..];
    }
    Ok(Duration::from_secs_f64(total))
}
