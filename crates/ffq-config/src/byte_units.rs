// SPDX-License-Identifier: Apache-2.0

//! Support for byte units like "KB / KiB", "MB / MiB", "GB / GiB" in configuration files.

use byte_unit::Byte;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};

use crate::error::Error;

#[derive(Deserialize)]
#[serde(untagged)]
enum Value {
    Number(u64),
    String(String),
}

/// Parse a data-size expression such as `"1 GB"` or `"512 MiB"` into bytes.
///
/// A bare number is taken as bytes. `0` disables the corresponding threshold.
pub fn parse(expression: &str) -> Result<u64, Error> {
    let parsed: Byte = expression
        .trim()
        .parse()
        .map_err(|e| Error::InvalidByteSize {
            expression: expression.to_string(),
            details: format!("{e}"),
        })?;

    let bytes = parsed.as_u128();
    if bytes > u64::MAX as u128 {
        return Err(Error::InvalidByteSize {
            expression: expression.to_string(),
            details: format!("{bytes} bytes exceeds u64::MAX"),
        });
    }
    Ok(bytes as u64)
}

/// Deserialize a byte size that can be specified either as a number (in bytes)
/// or as a string with units (e.g. "1 GB", "2 MiB"). Zero disables the threshold.
pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(value) => Ok(value),
        Value::String(text) => parse(&text).map_err(DeError::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::{deserialize, parse};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "deserialize")]
        value: u64,
    }

    fn de_yaml(input: &str) -> Result<Holder, serde_yaml::Error> {
        serde_yaml::from_str::<Holder>(input)
    }

    #[test]
    fn parses_number_as_bytes() {
        let cfg = de_yaml("value: 1024").expect("should parse numeric bytes");
        assert_eq!(cfg.value, 1024);
    }

    #[test]
    fn parses_string_with_units() {
        // 1 KiB == 1024 bytes
        let cfg = de_yaml("value: 1 KiB").expect("should parse 1 KiB");
        assert_eq!(cfg.value, 1024);

        let cfg = de_yaml("value: '1 GB'").expect("should parse 1 GB");
        assert_eq!(cfg.value, 1_000_000_000);
    }

    #[test]
    fn missing_value_is_zero() {
        let cfg = de_yaml("{}").expect("should parse with missing field as 0");
        assert_eq!(cfg.value, 0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("one gigabyte").is_err());
        assert!(de_yaml("value: lots").is_err());
    }

    #[test]
    fn parses_no_space_units() {
        assert_eq!(parse("10MB").expect("should parse 10MB"), 10_000_000);
        assert_eq!(parse("0.5 KiB").expect("should parse 0.5 KiB"), 512);
    }
}
