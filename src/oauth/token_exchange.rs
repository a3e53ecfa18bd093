//! Usage: OAuth token endpoint client (authorization_code grant with HTTP Basic client auth).

use crate::domain::authorization::AuthorizationRequest;
use crate::domain::credentials::{TokenSet, DEFAULT_EXPIRES_IN_SECONDS};
use crate::shared::error::{AppError, AppResult, ErrorKind};
use crate::shared::security::mask_token;
use crate::shared::time::Clock;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const ERROR_SNIPPET_MAX_CHARS: usize = 500;

#[derive(Clone)]
pub struct TokenExchangeClient {
    http: reqwest::Client,
    token_url: String,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchangeClient")
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

impl TokenExchangeClient {
    pub fn new(
        token_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("spotify-setup/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| format!("INTERNAL_ERROR: oauth http client init failed: {e}"))?;
        Ok(Self::with_http_client(http, token_url, clock))
    }

    pub fn with_http_client(
        http: reqwest::Client,
        token_url: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into().trim().to_string(),
            clock,
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Trade `code` for a token set. One request, no retries.
    pub async fn exchange(&self, code: &str, request: &AuthorizationRequest) -> AppResult<TokenSet> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code.trim()),
            ("redirect_uri", request.redirect_uri()),
        ];

        tracing::info!(token_url = %self.token_url, "exchanging authorization code for tokens");
        let response = self
            .http
            .post(&self.token_url)
            .header(
                AUTHORIZATION,
                basic_auth_header(request.client_id(), request.client_secret()),
            )
            .header(ACCEPT, "application/json")
            .form(&form[..])
            .send()
            .await
            .map_err(|e| network_error("oauth token exchange request failed", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| network_error("oauth token response read failed", e))?;

        parse_token_response(status.as_u16(), &body, self.clock.now_unix_seconds())
    }
}

fn network_error(context: &str, err: reqwest::Error) -> AppError {
    let detail = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "transport error"
    };
    AppError::new(ErrorKind::Network, format!("{context}: {detail}: {err}")).with_source(err)
}

pub(crate) fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    let encoded = STANDARD.encode(format!("{client_id}:{client_secret}"));
    format!("Basic {encoded}")
}

fn parse_token_response(status: u16, body: &str, issued_at: i64) -> AppResult<TokenSet> {
    if status != 200 {
        let description = parse_error_description(body)
            .unwrap_or_else(|| sanitize_error_body_snippet(body));
        tracing::warn!(status, description = %description, "oauth token exchange rejected");
        return Err(AppError::new(ErrorKind::Exchange, description).with_status(status));
    }

    let value: Value = serde_json::from_str(body).map_err(|e| {
        AppError::new(
            ErrorKind::Exchange,
            format!("oauth token response json invalid: {e}"),
        )
        .with_status(status)
    })?;

    let access_token = required_str(&value, "access_token", status)?;
    let refresh_token = required_str(&value, "refresh_token", status)?;
    let expires_in = value
        .get("expires_in")
        .and_then(parse_i64_lossy)
        .map(|v| u64::try_from(v).unwrap_or(0))
        .unwrap_or(DEFAULT_EXPIRES_IN_SECONDS);

    let tokens = TokenSet::new(access_token, refresh_token, expires_in, issued_at);
    tracing::info!(
        access_token = %mask_token(tokens.access_token()),
        expires_in,
        expiry_time = tokens.expiry_time(),
        "oauth token exchange succeeded"
    );
    Ok(tokens)
}

fn required_str(value: &Value, key: &str, status: u16) -> AppResult<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::new(
                ErrorKind::Exchange,
                format!("oauth token response missing {key}"),
            )
            .with_status(status)
        })
}

fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn parse_error_description(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error_description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
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
        Value::Array(items) => items.iter_mut().for_each(redact_sensitive_json_fields),
        _ => {}
    }
}

/// Raw error body for display, with token-like JSON fields masked.
fn sanitize_error_body_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(mut value) = serde_json::from_str::<Value>(trimmed) {
        redact_sensitive_json_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(ERROR_SNIPPET_MAX_CHARS).collect();
        }
    }
    trimmed.chars().take(ERROR_SNIPPET_MAX_CHARS).collect()
}
