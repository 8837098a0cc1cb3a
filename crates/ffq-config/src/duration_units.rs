// SPDX-License-Identifier: Apache-2.0

//! Support for duration expressions like "5 mins" or "30 sec" in configuration files.

use std::time::Duration;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};

use crate::error::Error;

#[derive(Deserialize)]
#[serde(untagged)]
enum Value {
    Number(u64),
    String(String),
}

/// Parse a duration expression such as `"5 mins"`, `"30 sec"` or `"1 hour"`.
///
/// `"0"` (with or without a unit) disables the corresponding behavior. Negative
/// durations are unrepresentable and rejected by the grammar itself.
pub fn parse(expression: &str) -> Result<Duration, Error> {
    // humantime wants `5mins`, not `5 mins`; group boundaries survive the strip
    // because digit/alpha transitions delimit them.
    let normalized: String = expression.split_whitespace().collect();
    if normalized == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(&normalized).map_err(|e| Error::InvalidDuration {
        expression: expression.to_string(),
        details: format!("{e}"),
    })
}

/// Deserialize a duration specified either as a number (in milliseconds) or as
/// a string expression (e.g. "5 mins").
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(millis) => Ok(Duration::from_millis(millis)),
        Value::String(text) => parse(&text).map_err(DeError::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::parse;
    use std::time::Duration;

    #[test]
    fn parses_spaced_expressions() {
        assert_eq!(parse("5 mins").expect("5 mins"), Duration::from_secs(300));
        assert_eq!(parse("30 sec").expect("30 sec"), Duration::from_secs(30));
        assert_eq!(parse("1 hour").expect("1 hour"), Duration::from_secs(3600));
    }

    #[test]
    fn zero_disables() {
        assert_eq!(parse("0").expect("bare zero"), Duration::ZERO);
        assert_eq!(parse("0 mins").expect("0 mins"), Duration::ZERO);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("five minutes").is_err());
        assert!(parse("-5 mins").is_err());
    }
}
