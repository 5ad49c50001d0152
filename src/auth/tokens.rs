//! Usage: Bearer-token expiry inspection (payload decode + `exp` claim).

use crate::shared::time::now_unix_seconds;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::Value;

/// Whether the token's `exp` claim is already in the past.
///
/// A token that is absent, blank, not three period-delimited segments, not
/// decodable, or missing a numeric `exp` counts as expired. Never panics.
pub fn is_token_expired(token: Option<&str>) -> bool {
    is_token_expired_at(token, now_unix_seconds())
}

pub(crate) fn is_token_expired_at(token: Option<&str>, now_unix: i64) -> bool {
    let Some(token) = token.map(str::trim).filter(|v| !v.is_empty()) else {
        return true;
    };
    let Some(payload) = decode_payload_segment(token) else {
        return true;
    };
    let Ok(json) = serde_json::from_slice::<Value>(&payload) else {
        return true;
    };
    let Some(exp) = json.get("exp").and_then(parse_i64_lossy) else {
        return true;
    };
    exp < now_unix
}

fn decode_payload_segment(token: &str) -> Option<Vec<u8>> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() < 3 {
        return None;
    }
    let payload_part = parts[1];
    URL_SAFE_NO_PAD
        .decode(payload_part)
        .ok()
        .or_else(|| URL_SAFE.decode(payload_part).ok())
}

fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
