//! Usage: Client configuration sourced from environment variables at startup.

use crate::shared::error::AppResult;
use std::env;
use std::time::Duration;

const API_URL_ENV: &str = "BEARER_GUARD_API_URL";
const API_TIMEOUT_ENV: &str = "BEARER_GUARD_API_TIMEOUT_MS";
const REQUEST_TIMEOUT_DEFAULT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            request_timeout,
        }
    }

    pub fn from_env() -> AppResult<Self> {
        Self::from_env_get(|key| env::var(key).ok())
    }

    fn from_env_get(mut get: impl FnMut(&str) -> Option<String>) -> AppResult<Self> {
        let base_url = get(API_URL_ENV)
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("CONFIG_MISSING: {API_URL_ENV} is required"))?;

        let request_timeout = get(API_TIMEOUT_ENV)
            .as_deref()
            .and_then(parse_u64_trimmed)
            .filter(|v| *v > 0)
            .map(Duration::from_millis)
            .unwrap_or(REQUEST_TIMEOUT_DEFAULT);

        Ok(Self {
            base_url: normalize_base_url(&base_url),
            request_timeout,
        })
    }
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn parse_u64_trimmed(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<u64>().ok()
}
