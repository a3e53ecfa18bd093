//! Usage: One-shot localhost callback listener for the OAuth authorization code redirect.
//!
//! The first well-formed redirect (`code` or `error` on the callback path) decides the result.
//! Every request, including duplicates and favicon probes, still gets a complete response.

use crate::shared::error::{AppError, AppResult, ErrorKind};
use crate::shared::mutex_ext::MutexExt;
use crate::shared::security::constant_time_eq;
use axum::extract::{RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const SUCCESS_HTML: &str = "<html><head><title>Authorization Successful</title></head>\
<body style=\"font-family: Arial, sans-serif; text-align: center; padding: 50px; background: #1DB954;\">\
<h1 style=\"color: white;\">&#10003; Authorization Successful!</h1>\
<p style=\"color: white; font-size: 18px;\">You can close this window and return to the setup utility.</p>\
</body></html>";
const INVALID_BODY: &str = "Invalid callback";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Outcome of one authorization attempt as seen by the redirect listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    Code(String),
    ProviderError { code: String, description: String },
    Timeout,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CallbackPayload {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn parse_callback_query(query: &str) -> CallbackPayload {
    let mut payload = CallbackPayload::default();
    let Ok(url) = reqwest::Url::parse(&format!("http://127.0.0.1/?{query}")) else {
        return payload;
    };
    for (key, value) in url.query_pairs() {
        let slot = match key.as_ref() {
            "code" => &mut payload.code,
            "state" => &mut payload.state,
            "error" => &mut payload.error,
            "error_description" => &mut payload.error_description,
            _ => continue,
        };
        // Repeated keys: keep the first value.
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }
    payload
}

fn classify(
    payload: CallbackPayload,
    expected_state: Option<&str>,
) -> Result<CallbackResult, &'static str> {
    let code = payload.code.filter(|v| !v.is_empty());
    let error = payload.error.filter(|v| !v.is_empty());
    if code.is_none() && error.is_none() {
        return Err("missing code/error");
    }
    if let Some(expected) = expected_state {
        let state = payload.state.as_deref().ok_or("missing state")?;
        if !constant_time_eq(state.as_bytes(), expected.as_bytes()) {
            return Err("state mismatch");
        }
    }

    match (code, error) {
        (Some(code), _) => Ok(CallbackResult::Code(code)),
        (None, Some(code)) => Ok(CallbackResult::ProviderError {
            code,
            description: payload.error_description.unwrap_or_default(),
        }),
        (None, None) => Err("missing code/error"),
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn error_html(error: &str) -> String {
    format!(
        "<html><head><title>Authorization Failed</title></head>\
<body style=\"font-family: Arial, sans-serif; text-align: center; padding: 50px; background: #E74C3C;\">\
<h1 style=\"color: white;\">&#10007; Authorization Failed</h1>\
<p style=\"color: white; font-size: 18px;\">Error: {}</p>\
<p style=\"color: white;\">Please close this window and try again.</p>\
</body></html>",
        escape_html(error)
    )
}

fn html_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CONNECTION, "close"),
        ],
        body,
    )
        .into_response()
}

fn invalid_response() -> Response {
    (
        StatusCode::BAD_REQUEST,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CONNECTION, "close"),
        ],
        INVALID_BODY,
    )
        .into_response()
}

struct CallbackState {
    port: u16,
    expected_state: Option<String>,
    slot: Mutex<Option<oneshot::Sender<CallbackResult>>>,
}

impl CallbackState {
    /// Store `result` if nothing was captured yet. Returns whether this call won.
    fn offer(&self, result: CallbackResult) -> bool {
        let Some(sender) = self.slot.lock_or_recover().take() else {
            tracing::info!(
                port = self.port,
                "oauth redirect ignored: result already captured"
            );
            return false;
        };
        let kind = match &result {
            CallbackResult::Code(_) => "code",
            CallbackResult::ProviderError { .. } => "provider_error",
            CallbackResult::Timeout => "timeout",
        };
        tracing::info!(port = self.port, kind, "oauth redirect captured");
        if sender.send(result).is_err() {
            tracing::warn!(port = self.port, "oauth redirect captured after waiter left");
        }
        true
    }
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    RawQuery(query): RawQuery,
) -> Response {
    let payload = parse_callback_query(query.as_deref().unwrap_or_default());
    match classify(payload, state.expected_state.as_deref()) {
        Ok(result) => {
            let response = match &result {
                CallbackResult::ProviderError { code, .. } => {
                    html_response(StatusCode::BAD_REQUEST, error_html(code))
                }
                _ => html_response(StatusCode::OK, SUCCESS_HTML.to_string()),
            };
            state.offer(result);
            response
        }
        Err(reason) => {
            tracing::debug!(port = state.port, reason, "oauth callback request rejected");
            invalid_response()
        }
    }
}

async fn handle_invalid() -> Response {
    invalid_response()
}

/// A bound redirect listener. The port is held until [`CallbackListener::stop`] or drop.
pub struct CallbackListener {
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
    result_rx: Option<oneshot::Receiver<CallbackResult>>,
    outcome: Option<CallbackResult>,
}

impl std::fmt::Debug for CallbackListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackListener")
            .field("port", &self.port)
            .field("running", &self.is_running())
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl CallbackListener {
    /// Bind `host:port` once and start serving `callback_path`.
    ///
    /// No retry and no fallback port: the redirect URI registered with the provider must match.
    pub async fn start(
        host: &str,
        port: u16,
        callback_path: &str,
        expected_state: Option<String>,
    ) -> AppResult<Self> {
        let std_listener = std::net::TcpListener::bind((host, port)).map_err(|e| {
            let message = if e.kind() == std::io::ErrorKind::AddrInUse {
                format!("port {port} is already in use")
            } else {
                format!("oauth callback bind failed on {host}:{port}: {e}")
            };
            AppError::new(ErrorKind::Bind, message).with_source(e)
        })?;
        std_listener
            .set_nonblocking(true)
            .map_err(|e| format!("INTERNAL_ERROR: oauth callback listener setup failed: {e}"))?;
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| format!("INTERNAL_ERROR: oauth callback listener setup failed: {e}"))?;
        let bound_port = listener
            .local_addr()
            .map_err(|e| format!("INTERNAL_ERROR: oauth callback local_addr failed: {e}"))?
            .port();

        let (result_tx, result_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = Arc::new(CallbackState {
            port: bound_port,
            expected_state,
            slot: Mutex::new(Some(result_tx)),
        });
        let app = Router::new()
            .route(callback_path, get(handle_callback).fallback(handle_invalid))
            .fallback(handle_invalid)
            .with_state(state);

        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(err) = serve.await {
                tracing::error!(port = bound_port, "oauth callback server error: {}", err);
            }
        });
        tracing::info!(port = bound_port, callback_path, "oauth callback listener started");

        Ok(Self {
            port: bound_port,
            shutdown: Some(shutdown_tx),
            server: Some(server),
            result_rx: Some(result_rx),
            outcome: None,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&self) -> bool {
        self.server.as_ref().is_some_and(|s| !s.is_finished())
    }

    /// Wait for the first captured redirect, or `Timeout` once `timeout` passes.
    ///
    /// The outcome is fixed by the first call; later calls return the same value.
    pub async fn await_result(&mut self, timeout: Duration) -> CallbackResult {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let outcome = match self.result_rx.take() {
            Some(rx) => match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => {
                    tracing::warn!(port = self.port, "oauth callback server ended before any redirect");
                    CallbackResult::Timeout
                }
                Err(_) => CallbackResult::Timeout,
            },
            None => CallbackResult::Timeout,
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Stop serving and release the port. Safe to call more than once.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let Some(mut server) = self.server.take() else {
            return;
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
            tracing::warn!(port = self.port, "oauth callback server did not drain in time; aborting");
            server.abort();
            let _ = server.await;
        }
        tracing::info!(port = self.port, "oauth callback listener stopped");
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}
