use crate::errors::Error;
use crate::ping::protocol::ProtocolKind;
use serde::Deserialize;

/// Most history entries returned when the request does not say.
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 500;

// Numeric parameters arrive as strings so that bad input gets the JSON error envelope rather
// than the framework's plain-text query rejection.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerQuery {
    pub batch_size: Option<String>,
    pub protocol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProtocolQuery {
    pub protocol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<String>,
}

/// An absent or empty `protocol` parameter means "all protocols".
pub fn parse_protocol(raw: Option<&str>) -> Result<Option<ProtocolKind>, Error> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<ProtocolKind>().map(Some).map_err(|e| Error::BadRequest {
            message: format!("{e}. Expected one of: mongodb, postgres, redis"),
        }),
    }
}

/// Parse an optional integer parameter, falling back to `default` when it is absent.
pub fn parse_count(name: &str, raw: Option<&str>, default: i64) -> Result<i64, Error> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value.parse::<i64>().map_err(|_| Error::BadRequest {
            message: format!("{name} must be an integer, got '{value}'"),
        }),
    }
}
