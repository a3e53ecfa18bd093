//! Usage: One authorization attempt end to end (listener, browser hand-off, wait, exchange, save).
//!
//! State flow:
//! `Idle -> ListenerStarted -> AwaitingRedirect -> CodeReceived -> ExchangeInFlight -> Completed`,
//! with terminal exits `BindFailed`, `ProviderErrorReceived`, `TimedOut`, `ExchangeFailed`,
//! `StorageFailed`, and `Aborted`.

use crate::domain::authorization::AuthorizationRequest;
use crate::domain::credentials::{CredentialRecord, TokenSet};
use crate::infra::credential_store::CredentialStore;
use crate::infra::settings::SetupSettings;
use crate::oauth::browser::BrowserOpener;
use crate::oauth::callback_server::{CallbackListener, CallbackResult};
use crate::oauth::provider;
use crate::oauth::token_exchange::TokenExchangeClient;
use crate::shared::blocking;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    ListenerStarted,
    AwaitingRedirect,
    CodeReceived,
    ProviderErrorReceived,
    TimedOut,
    ExchangeInFlight,
    Completed,
    ExchangeFailed,
    StorageFailed,
    BindFailed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ProviderErrorReceived
                | Self::TimedOut
                | Self::Completed
                | Self::ExchangeFailed
                | Self::StorageFailed
                | Self::BindFailed
                | Self::Aborted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ListenerStarted => "listener_started",
            Self::AwaitingRedirect => "awaiting_redirect",
            Self::CodeReceived => "code_received",
            Self::ProviderErrorReceived => "provider_error_received",
            Self::TimedOut => "timed_out",
            Self::ExchangeInFlight => "exchange_in_flight",
            Self::Completed => "completed",
            Self::ExchangeFailed => "exchange_failed",
            Self::StorageFailed => "storage_failed",
            Self::BindFailed => "bind_failed",
            Self::Aborted => "aborted",
        }
    }
}

/// Presentation hooks: a log pane and transition notifications.
pub trait SessionObserver: Send + Sync {
    fn on_transition(&self, _from: SessionState, _to: SessionState) {}

    fn on_log(&self, _message: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// The subset of [`SetupSettings`] one session needs.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub callback_host: String,
    pub callback_port: u16,
    pub callback_path: String,
    pub callback_timeout: Duration,
    pub auth_url: String,
    pub credentials_path: PathBuf,
}

impl SessionSettings {
    pub fn from_setup(settings: &SetupSettings) -> AppResult<Self> {
        Ok(Self {
            callback_host: settings.callback_host.trim().to_string(),
            callback_port: settings.callback_port,
            callback_path: settings.callback_path.clone(),
            callback_timeout: settings.callback_timeout(),
            auth_url: settings.auth_url.clone(),
            credentials_path: settings.credentials_path()?,
        })
    }

    pub fn redirect_uri(&self) -> String {
        provider::make_redirect_uri(&self.callback_host, self.callback_port, &self.callback_path)
    }
}

/// Successful run: where the artifact went and what it contains.
#[derive(Debug, Clone)]
pub struct SetupOutcome {
    pub credentials_path: PathBuf,
    pub tokens: TokenSet,
}

pub struct AuthSession {
    settings: SessionSettings,
    exchange: TokenExchangeClient,
    store: CredentialStore,
    browser: Arc<dyn BrowserOpener>,
    observer: Arc<dyn SessionObserver>,
    state: SessionState,
    request: Option<AuthorizationRequest>,
    listener: Option<CallbackListener>,
    authorize_url: Option<String>,
    callback_result: Option<CallbackResult>,
    tokens: Option<TokenSet>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("state", &self.state)
            .field("settings", &self.settings)
            .field("request", &self.request)
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    pub fn new(
        settings: SessionSettings,
        exchange: TokenExchangeClient,
        store: CredentialStore,
        browser: Arc<dyn BrowserOpener>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            settings,
            exchange,
            store,
            browser,
            observer,
            state: SessionState::Idle,
            request: None,
            listener: None,
            authorize_url: None,
            callback_result: None,
            tokens: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn authorize_url(&self) -> Option<&str> {
        self.authorize_url.as_deref()
    }

    pub fn callback_result(&self) -> Option<&CallbackResult> {
        self.callback_result.as_ref()
    }

    /// Tokens from a successful exchange; still available when saving them failed.
    pub fn tokens(&self) -> Option<&TokenSet> {
        self.tokens.as_ref()
    }

    pub fn request(&self) -> Option<&AuthorizationRequest> {
        self.request.as_ref()
    }

    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(CallbackListener::is_running)
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::info!(from = from.as_str(), to = to.as_str(), "auth session transition");
        self.observer.on_transition(from, to);
    }

    fn log(&self, message: &str) {
        self.observer.on_log(message);
    }

    async fn stop_listener(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.stop().await;
        }
    }

    /// Start the attempt: validate input, bind the listener, and hand the URL to the browser.
    ///
    /// Returns the authorization URL. Validation failures leave the session `Idle`.
    pub async fn begin(&mut self, request: AuthorizationRequest) -> AppResult<String> {
        if self.state != SessionState::Idle {
            return Err(AppError::new(
                ErrorKind::Validation,
                format!("auth session already started (state={})", self.state.as_str()),
            ));
        }
        request.validate()?;
        let expected_redirect = self.settings.redirect_uri();
        if request.redirect_uri() != expected_redirect {
            return Err(AppError::new(
                ErrorKind::Validation,
                format!(
                    "redirect_uri {} does not match the callback listener {expected_redirect}",
                    request.redirect_uri()
                ),
            ));
        }
        let auth_url = provider::build_authorize_url(&self.settings.auth_url, &request)?;

        let listener = match CallbackListener::start(
            &self.settings.callback_host,
            self.settings.callback_port,
            &self.settings.callback_path,
            request.state_nonce().map(str::to_string),
        )
        .await
        {
            Ok(listener) => listener,
            Err(err) => {
                self.log(&format!("✗ Error: {}", err.message()));
                self.transition(SessionState::BindFailed);
                return Err(err);
            }
        };
        self.log(&format!(
            "✓ Local callback server started on port {}",
            listener.port()
        ));
        self.listener = Some(listener);
        self.request = Some(request);
        self.transition(SessionState::ListenerStarted);

        self.log("✓ Authorization URL built");
        if let Some(request) = &self.request {
            self.log(&format!("   Scopes: {}", request.scopes().join(" ")));
        }
        match self.browser.open(&auth_url) {
            Ok(()) => self.log("✓ Browser opened for authorization"),
            Err(err) => {
                tracing::warn!("browser open failed, continuing with manual url: {}", err);
                self.log("✗ Could not open the browser; open the authorization URL manually");
            }
        }
        self.authorize_url = Some(auth_url.clone());
        self.transition(SessionState::AwaitingRedirect);
        self.log("   Waiting for user to authorize...");
        Ok(auth_url)
    }

    /// Block until the redirect arrives or the timeout passes, then release the port.
    pub async fn await_callback(&mut self) -> AppResult<CallbackResult> {
        if let Some(result) = &self.callback_result {
            return Ok(result.clone());
        }
        let timeout = self.settings.callback_timeout;
        let Some(listener) = self.listener.as_mut() else {
            return Err(AppError::new(
                ErrorKind::Validation,
                format!("auth session is not awaiting a redirect (state={})", self.state.as_str()),
            ));
        };

        let result = listener.await_result(timeout).await;
        self.stop_listener().await;
        self.callback_result = Some(result.clone());

        match &result {
            CallbackResult::Code(_) => {
                self.log("✓ Authorization code received");
                self.transition(SessionState::CodeReceived);
            }
            CallbackResult::ProviderError { code, description } => {
                self.log(&format!("✗ Authorization failed: {code}"));
                if !description.is_empty() {
                    self.log(&format!("   {description}"));
                }
                self.transition(SessionState::ProviderErrorReceived);
            }
            CallbackResult::Timeout => {
                self.log(&format!(
                    "✗ Authorization timed out ({} seconds)",
                    timeout.as_secs()
                ));
                self.transition(SessionState::TimedOut);
            }
        }
        Ok(result)
    }

    /// Drive the attempt to a terminal state: wait, exchange the code, persist the record.
    pub async fn finish(&mut self) -> AppResult<SetupOutcome> {
        let code = match self.await_callback().await? {
            CallbackResult::Code(code) => code,
            // The description stays on `callback_result()`.
            CallbackResult::ProviderError { code, .. } => {
                return Err(AppError::new(ErrorKind::Provider, code));
            }
            CallbackResult::Timeout => {
                return Err(AppError::new(
                    ErrorKind::Timeout,
                    format!(
                        "no authorization redirect within {} seconds",
                        self.settings.callback_timeout.as_secs()
                    ),
                ));
            }
        };
        if self.state != SessionState::CodeReceived {
            return Err(AppError::new(
                ErrorKind::Validation,
                format!("auth session already finished (state={})", self.state.as_str()),
            ));
        }
        let request = self
            .request
            .clone()
            .ok_or_else(|| "INTERNAL_ERROR: auth session lost its request".to_string())?;

        self.transition(SessionState::ExchangeInFlight);
        self.log("   Exchanging code for tokens...");
        let tokens = match self.exchange.exchange(&code, &request).await {
            Ok(tokens) => tokens,
            Err(err) => {
                if err.kind() == ErrorKind::Network {
                    self.log(&format!("✗ Network error: {}", err.message()));
                } else {
                    self.log(&format!("✗ Token exchange failed: {}", err.message()));
                }
                self.transition(SessionState::ExchangeFailed);
                return Err(err);
            }
        };
        self.log("✓ Tokens obtained successfully");
        self.log(&format!(
            "   Access token expires in: {} seconds ({} minutes)",
            tokens.expires_in_seconds(),
            tokens.expires_in_seconds() / 60
        ));
        self.tokens = Some(tokens.clone());

        let record = CredentialRecord::new(
            request.client_id(),
            request.client_secret(),
            tokens.clone(),
        );
        let store = self.store.clone();
        let path = self.settings.credentials_path.clone();
        let saved = blocking::run("save_credentials", move || store.save(&record, &path)).await;
        if let Err(err) = saved {
            self.log(&format!("✗ Failed to write credentials: {}", err.message()));
            self.transition(SessionState::StorageFailed);
            return Err(err);
        }

        self.log(&format!(
            "✓ Credentials written to: {}",
            self.settings.credentials_path.display()
        ));
        self.transition(SessionState::Completed);
        Ok(SetupOutcome {
            credentials_path: self.settings.credentials_path.clone(),
            tokens,
        })
    }

    /// `begin` followed by `finish`.
    pub async fn run(&mut self, request: AuthorizationRequest) -> AppResult<SetupOutcome> {
        self.begin(request).await?;
        self.finish().await
    }

    /// Cancel the attempt and release the port from any state.
    pub async fn abort(&mut self) {
        self.stop_listener().await;
        if !self.state.is_terminal() {
            self.log("Authorization cancelled");
            self.transition(SessionState::Aborted);
        }
    }
}
