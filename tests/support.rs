use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use spotify_setup_lib::oauth::browser::BrowserOpener;
use spotify_setup_lib::shared::time::FixedClock;
use spotify_setup_lib::{
    AppResult, AuthSession, CredentialStore, SessionObserver, SessionSettings, SessionState,
    TokenExchangeClient,
};
use tokio::sync::oneshot;

/// Fixed "now" for every test clock.
#[allow(dead_code)]
pub const NOW: i64 = 1_700_000_000;

#[allow(dead_code)]
pub const TOKEN_OK_BODY: &str =
    r#"{"access_token":"AT1","token_type":"Bearer","scope":"user-read-currently-playing","expires_in":3600,"refresh_token":"RT1"}"#;

#[allow(dead_code)]
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral");
    listener.local_addr().expect("local addr").port()
}

#[allow(dead_code)]
pub fn assert_rebindable(port: u16) {
    std::net::TcpListener::bind(("127.0.0.1", port)).expect("port released");
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("http client")
}

#[derive(Debug, Clone)]
pub struct RecordedTokenRequest {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub form: HashMap<String, String>,
}

struct FakeTokenState {
    status: u16,
    body: String,
    calls: Mutex<Vec<RecordedTokenRequest>>,
}

async fn token_handler(
    State(state): State<Arc<FakeTokenState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.calls.lock().expect("calls").push(RecordedTokenRequest {
        authorization: header_str(header::AUTHORIZATION),
        content_type: header_str(header::CONTENT_TYPE),
        form,
    });
    (
        StatusCode::from_u16(state.status).expect("status"),
        [(header::CONTENT_TYPE, "application/json")],
        state.body.clone(),
    )
}

/// In-process stand-in for the Spotify token endpoint.
pub struct FakeTokenServer {
    pub url: String,
    state: Arc<FakeTokenState>,
    shutdown: Option<oneshot::Sender<()>>,
}

#[allow(dead_code)]
impl FakeTokenServer {
    pub async fn start(status: u16, body: &str) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind token server");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(FakeTokenState {
            status,
            body: body.to_string(),
            calls: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/api/token", post(token_handler))
            .with_state(state.clone());
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await;
        });
        Self {
            url: format!("http://{addr}/api/token"),
            state,
            shutdown: Some(tx),
        }
    }

    pub fn calls(&self) -> Vec<RecordedTokenRequest> {
        self.state.calls.lock().expect("calls").clone()
    }
}

impl Drop for FakeTokenServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Plays the provider: on `open`, sends each configured query to the URL's `redirect_uri`.
#[derive(Clone, Default)]
pub struct RedirectingBrowser {
    queries: Vec<String>,
    echo_state: bool,
    statuses: Arc<Mutex<Vec<u16>>>,
    opened: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl RedirectingBrowser {
    pub fn new<I, S>(queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queries: queries.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Append the authorization URL's `state` to every redirect.
    pub fn echoing_state(mut self) -> Self {
        self.echo_state = true;
        self
    }

    pub fn statuses(&self) -> Vec<u16> {
        self.statuses.lock().expect("statuses").clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().expect("opened").clone()
    }
}

impl BrowserOpener for RedirectingBrowser {
    fn open(&self, url: &str) -> AppResult<()> {
        self.opened.lock().expect("opened").push(url.to_string());

        let parsed = reqwest::Url::parse(url).expect("authorize url");
        let param = |key: &str| {
            parsed
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };
        let redirect_uri = param("redirect_uri").expect("redirect_uri param");
        let state = param("state");

        let targets: Vec<String> = self
            .queries
            .iter()
            .map(|q| match (&state, self.echo_state) {
                (Some(s), true) => format!("{redirect_uri}?{q}&state={s}"),
                _ => format!("{redirect_uri}?{q}"),
            })
            .collect();
        let statuses = self.statuses.clone();
        tokio::spawn(async move {
            let client = http_client();
            for target in targets {
                if let Ok(resp) = client.get(&target).send().await {
                    statuses.lock().expect("statuses").push(resp.status().as_u16());
                }
            }
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub transitions: Mutex<Vec<SessionState>>,
    pub lines: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingObserver {
    pub fn states(&self) -> Vec<SessionState> {
        self.transitions.lock().expect("transitions").clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("lines").clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_transition(&self, _from: SessionState, to: SessionState) {
        self.transitions.lock().expect("transitions").push(to);
    }

    fn on_log(&self, message: &str) {
        self.lines.lock().expect("lines").push(message.to_string());
    }
}

#[allow(dead_code)]
pub struct SessionHarness {
    pub port: u16,
    pub session: AuthSession,
    pub observer: Arc<RecordingObserver>,
}

#[allow(dead_code)]
impl SessionHarness {
    pub fn new(
        port: u16,
        credentials_path: &Path,
        token_url: &str,
        callback_timeout: Duration,
        browser: Arc<dyn BrowserOpener>,
    ) -> Self {
        let clock = Arc::new(FixedClock(NOW));
        let observer = Arc::new(RecordingObserver::default());
        let session = AuthSession::new(
            SessionSettings {
                callback_host: "127.0.0.1".to_string(),
                callback_port: port,
                callback_path: "/callback".to_string(),
                callback_timeout,
                auth_url: "https://accounts.spotify.com/authorize".to_string(),
                credentials_path: credentials_path.to_path_buf(),
            },
            TokenExchangeClient::with_http_client(http_client(), token_url, clock.clone()),
            CredentialStore::new(clock),
            browser,
            observer.clone(),
        );
        Self {
            port,
            session,
            observer,
        }
    }

    pub fn redirect_uri(&self) -> String {
        self.session.settings().redirect_uri()
    }
}
