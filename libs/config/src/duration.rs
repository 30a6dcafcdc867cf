//! Duration notation
//!
//! Configs use the standard `"30s"` / `"1h"` / `"72h"` notation.

use std::time::Duration;

use thiserror::Error;

/// Error for malformed duration strings
#[derive(Debug, Error)]
#[error("Invalid duration '{input}': {message}")]
pub struct DurationError {
    pub input: String,
    pub message: String,
}

/// Parse a human duration such as `"30s"`, `"5m"`, or `"1h"`
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    humantime::parse_duration(input).map_err(|err| DurationError {
        input: input.to_string(),
        message: err.to_string(),
    })
}

/// Parse an optional duration field from a config value
///
/// Accepts a string in human notation or a bare number of seconds.
pub fn duration_field(
    value: &serde_json::Value,
    field: &str,
) -> Result<Option<Duration>, DurationError> {
    match value.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => parse_duration(s).map(Some),
        Some(serde_json::Value::Number(n)) => {
            n.as_u64()
                .map(Duration::from_secs)
                .map(Some)
                .ok_or_else(|| DurationError {
                    input: n.to_string(),
                    message: "expected a non-negative number of seconds".to_string(),
                })
        }
        Some(other) => Err(DurationError {
            input: other.to_string(),
            message: "expected a duration string or seconds".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_notation() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("72h").unwrap(), Duration::from_secs(259_200));
    }

    #[test]
    fn test_invalid_notation() {
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_duration_field_variants() {
        let config = json!({"idle": "90s", "acquire": 5});
        assert_eq!(
            duration_field(&config, "idle").unwrap(),
            Some(Duration::from_secs(90))
        );
        assert_eq!(
            duration_field(&config, "acquire").unwrap(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(duration_field(&config, "missing").unwrap(), None);
    }
}
