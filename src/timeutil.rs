// src/timeutil.rs
//! Bucket-width parsing and bucket-start arithmetic.
//!
//! A granularity string decodes as `<N>m` (minutes) or `<N>h` (hours).
//! Bucket starts floor the timestamp's minute-of-hour to the nearest
//! multiple of the granularity and zero out seconds and sub-second
//! precision.

use anyhow::{bail, Result};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Fixed bucket width, stored in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Granularity {
    minutes: u32,
}

impl Granularity {
    pub fn from_minutes(minutes: u32) -> Result<Self> {
        if minutes == 0 {
            bail!("granularity must be at least one minute");
        }
        Ok(Self { minutes })
    }

    /// Parse `"5m"`, `"1h"`, `"60m"`, ...
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(num) = s.strip_suffix('m') {
            match num.parse() {
                Ok(n) => Self::from_minutes(n),
                Err(_) => bail!("invalid bucket size: {s}"),
            }
        } else if let Some(num) = s.strip_suffix('h') {
            match num.parse::<u32>() {
                Ok(n) => Self::from_minutes(n * 60),
                Err(_) => bail!("invalid bucket size: {s}"),
            }
        } else {
            bail!("invalid bucket size: {s}")
        }
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn as_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.minutes as i64)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minutes % 60 == 0 {
            write!(f, "{}h", self.minutes / 60)
        } else {
            write!(f, "{}m", self.minutes)
        }
    }
}

impl FromStr for Granularity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// Serialize through the string form so API payloads carry "5m" / "1h".
impl Serialize for Granularity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Granularity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Floor a timestamp to its bucket start: minute-of-hour rounded down to a
/// multiple of the granularity, seconds and nanos zeroed.
pub fn bucket_floor(ts: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    let minutes = granularity.minutes().clamp(1, 60);
    let floored = ts.minute() - (ts.minute() % minutes);
    ts.with_minute(floored)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, h, m, s).unwrap()
    }

    #[test]
    fn parse_minutes_and_hours() {
        assert_eq!(Granularity::parse("1m").unwrap().minutes(), 1);
        assert_eq!(Granularity::parse("5m").unwrap().minutes(), 5);
        assert_eq!(Granularity::parse("2h").unwrap().minutes(), 120);
        assert_eq!(Granularity::parse("60m").unwrap().minutes(), 60);
        assert!(Granularity::parse("5x").is_err());
        assert!(Granularity::parse("").is_err());
        assert!(Granularity::parse("0m").is_err());
    }

    #[test]
    fn display_round_trips() {
        assert_eq!(Granularity::parse("5m").unwrap().to_string(), "5m");
        assert_eq!(Granularity::parse("60m").unwrap().to_string(), "1h");
        assert_eq!(Granularity::parse("90m").unwrap().to_string(), "90m");
    }

    #[test]
    fn floors_minute_47_to_45_at_5m() {
        let g = Granularity::parse("5m").unwrap();
        assert_eq!(bucket_floor(at(9, 47, 33), g), at(9, 45, 0));
    }

    #[test]
    fn floors_minute_47_to_0_at_60m() {
        let g = Granularity::parse("60m").unwrap();
        assert_eq!(bucket_floor(at(9, 47, 33), g), at(9, 0, 0));
    }

    #[test]
    fn flooring_is_idempotent() {
        let g = Granularity::parse("5m").unwrap();
        let once = bucket_floor(at(17, 59, 59), g);
        assert_eq!(bucket_floor(once, g), once);
    }

    #[test]
    fn zeroes_subsecond_precision() {
        let g = Granularity::parse("1m").unwrap();
        let ts = at(6, 30, 12) + chrono::Duration::nanoseconds(987_654);
        assert_eq!(bucket_floor(ts, g), at(6, 30, 0));
    }

    #[test]
    fn granularity_serde_uses_string_form() {
        let g = Granularity::parse("5m").unwrap();
        assert_eq!(serde_json::to_string(&g).unwrap(), r#""5m""#);
        let back: Granularity = serde_json::from_str(r#""1h""#).unwrap();
        assert_eq!(back.minutes(), 60);
    }
}
