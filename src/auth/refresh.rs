//! Usage: Credential refresh protocol (refresh-token call, persistence, failure cleanup).

use crate::auth::navigation::LoginNavigator;
use crate::config::ClientConfig;
use crate::shared::error::AppResult;
use crate::shared::security::mask_token;
use crate::store::{
    CredentialPair, CredentialStore, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER,
};
use reqwest::header;
use serde_json::Value;

pub(crate) const REFRESH_PATH: &str = "/api/users/refresh";
const ERROR_BODY_SNIPPET_MAX_CHARS: usize = 500;

/// Run the refresh protocol. Any failure wipes the stored credentials and
/// redirects to login before the error is propagated.
pub(crate) async fn refresh_credentials(
    client: &reqwest::Client,
    config: &ClientConfig,
    store: &CredentialStore,
    navigator: &dyn LoginNavigator,
) -> AppResult<String> {
    tracing::debug!("refreshing access token");
    match try_refresh(client, config, store).await {
        Ok(access_token) => {
            tracing::info!(access_token = %mask_token(&access_token), "access token refreshed");
            Ok(access_token)
        }
        Err(err) => {
            tracing::warn!("token refresh failed: {}", err);
            clear_credentials_best_effort(store);
            navigator.redirect_to_login();
            Err(err)
        }
    }
}

async fn try_refresh(
    client: &reqwest::Client,
    config: &ClientConfig,
    store: &CredentialStore,
) -> AppResult<String> {
    // The refresh call authenticates with the refresh token, never the
    // (expired) access token.
    let refresh_token = store
        .refresh_token()?
        .ok_or_else(|| "AUTH_NO_REFRESH_TOKEN: no refresh token available".to_string())?;

    let url = format!("{}{}", config.base_url, REFRESH_PATH);
    let response = client
        .get(url)
        .bearer_auth(&refresh_token)
        .header(header::CONTENT_TYPE, "application/json")
        .send()
        .await
        .map_err(|e| format!("AUTH_REFRESH_FAILED: refresh request failed: {e}"))?;

    let credentials = parse_refresh_response(response).await?;
    store.save_credentials(&credentials)?;
    Ok(credentials.access_token)
}

async fn parse_refresh_response(response: reqwest::Response) -> AppResult<CredentialPair> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("AUTH_REFRESH_FAILED: refresh response read failed: {e}"))?;

    if !status.is_success() {
        let snippet = sanitize_error_body_snippet(&body);
        return Err(format!(
            "AUTH_REFRESH_FAILED: refresh endpoint returned status={} body={snippet}",
            status.as_u16()
        )
        .into());
    }

    credentials_from_body(&body)
}

fn credentials_from_body(body: &str) -> AppResult<CredentialPair> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| format!("AUTH_REFRESH_INVALID_RESPONSE: refresh response json invalid: {e}"))?;

    let access_token = required_text_field(&value, "acessToken")?;
    let refresh_token = required_text_field(&value, "refreshToken")?;
    let user = value.get("result").cloned().ok_or_else(|| {
        "AUTH_REFRESH_INVALID_RESPONSE: refresh response missing result".to_string()
    })?;

    Ok(CredentialPair {
        access_token,
        refresh_token,
        user,
    })
}

fn required_text_field(value: &Value, field: &str) -> AppResult<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            format!("AUTH_REFRESH_INVALID_RESPONSE: refresh response missing {field}").into()
        })
}

/// Delete every credential key, logging instead of failing on store errors.
pub(crate) fn clear_credentials_best_effort(store: &CredentialStore) {
    for key in [KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER] {
        if let Err(err) = store.delete(key) {
            tracing::warn!(key = %key, "failed to clear credential: {}", err);
        }
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lc = key.trim().to_ascii_lowercase();
    key_lc.contains("token") || key_lc.contains("secret") || key_lc == "authorization"
}

fn redact_sensitive_json_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if is_sensitive_key(key) {
                    if let Some(raw) = nested.as_str() {
                        *nested = Value::String(mask_token(raw));
                        continue;
                    }
                }
                redact_sensitive_json_fields(nested);
            }
        }
        Value::Array(items) => {
            for nested in items {
                redact_sensitive_json_fields(nested);
            }
        }
        _ => {}
    }
}

fn sanitize_error_body_snippet(body: &str) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_sensitive_json_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(ERROR_BODY_SNIPPET_MAX_CHARS).collect();
        }
    }
    body.chars().take(ERROR_BODY_SNIPPET_MAX_CHARS).collect()
}
