//! Human duration strings (`500ms`, `30s`, `5m`, `1h`) for config fields.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};

/// Parse a duration such as `30s` or `5m`. A bare number is read as seconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let s = raw.trim();
    if s.is_empty() {
        bail!("empty duration");
    }
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| anyhow!("invalid duration '{raw}'"))?;
    let secs_per_unit = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(value)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        other => bail!("unknown duration unit '{other}' in '{raw}'"),
    };
    let secs = value
        .checked_mul(secs_per_unit)
        .ok_or_else(|| anyhow!("duration '{raw}' is too large"))?;
    Ok(Duration::from_secs(secs))
}

/// Render a duration in the largest unit that divides it exactly.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        return format!("{ms}ms");
    }
    let secs = d.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// serde adapter for `Option<Duration>` fields.
pub mod option {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&format_duration(*d)),
            None => s.serialize_none(),
        }
    }

    /// Either `30` (seconds) or a unit string like `30s`.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Secs(u64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        match Option::<RawDuration>::deserialize(d)? {
            None => Ok(None),
            Some(RawDuration::Secs(secs)) => Ok(Some(Duration::from_secs(secs))),
            Some(RawDuration::Text(s)) => parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
