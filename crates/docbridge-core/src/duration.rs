//! Serde helpers for human-readable durations.
//!
//! Accepts `"500ms"`, `"10s"`, `"5m"`, `"24h"`, or bare seconds. Use with
//! `#[serde(with = "docbridge_core::duration")]`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize a duration as milliseconds or seconds.
pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    };
    serializer.serialize_str(&s)
}

/// Deserialize a duration from a string or an integer number of seconds.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Secs(n) => Ok(Duration::from_secs(n)),
        Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse a duration string.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let number = |digits: &str| -> Result<u64, String> {
        digits
            .trim()
            .parse()
            .map_err(|_| format!("invalid duration: {s:?}"))
    };

    if let Some(stripped) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(number(stripped)?))
    } else if let Some(stripped) = s.strip_suffix('s') {
        Ok(Duration::from_secs(number(stripped)?))
    } else if let Some(stripped) = s.strip_suffix('m') {
        Ok(Duration::from_secs(number(stripped)? * 60))
    } else if let Some(stripped) = s.strip_suffix('h') {
        Ok(Duration::from_secs(number(stripped)? * 3600))
    } else {
        Ok(Duration::from_secs(number(s)?))
    }
}
