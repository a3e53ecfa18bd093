mod support;

use std::sync::Arc;
use std::time::Duration;

use spotify_setup_lib::infra::credential_store::{self, read_file};
use spotify_setup_lib::oauth::browser::NoBrowser;
use spotify_setup_lib::{AuthorizationRequest, CallbackResult, ErrorKind, SessionState};
use support::{
    assert_rebindable, free_port, FakeTokenServer, RedirectingBrowser, SessionHarness, NOW,
    TOKEN_OK_BODY,
};

const WAIT: Duration = Duration::from_secs(10);
const SHORT_WAIT: Duration = Duration::from_millis(300);

fn request(harness: &SessionHarness, id: &str, secret: &str) -> AuthorizationRequest {
    AuthorizationRequest::new(
        id,
        secret,
        harness.redirect_uri(),
        ["user-read-currently-playing", "user-modify-playback-state"],
    )
}

#[tokio::test]
async fn full_flow_writes_vault_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds = dir.path().join("@Vault").join("SpotifyCredentials.inc");
    let token = FakeTokenServer::start(200, TOKEN_OK_BODY).await;
    let browser = RedirectingBrowser::new(["code=AUTHCODE"]);
    let mut h = SessionHarness::new(free_port(), &creds, &token.url, WAIT, Arc::new(browser.clone()));

    let req = request(&h, "abc", "xyz");
    let outcome = h.session.run(req).await.expect("setup completes");

    assert_eq!(h.session.state(), SessionState::Completed);
    assert_eq!(outcome.credentials_path, creds);
    assert_eq!(outcome.tokens.expiry_time(), NOW + 3600);

    let vars = read_file(&creds).expect("read").expect("artifact exists");
    assert_eq!(vars[credential_store::KEY_CLIENT_ID], "abc");
    assert_eq!(vars[credential_store::KEY_CLIENT_SECRET], "xyz");
    assert_eq!(vars[credential_store::KEY_ACCESS_TOKEN], "AT1");
    assert_eq!(vars[credential_store::KEY_REFRESH_TOKEN], "RT1");
    assert_eq!(
        vars[credential_store::KEY_TOKEN_EXPIRY],
        (NOW + 3600).to_string()
    );

    let calls = token.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.authorization.as_deref(), Some("Basic YWJjOnh5eg=="));
    assert!(call
        .content_type
        .as_deref()
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded")));
    assert_eq!(call.form["grant_type"], "authorization_code");
    assert_eq!(call.form["code"], "AUTHCODE");
    assert_eq!(call.form["redirect_uri"], h.redirect_uri());
    assert!(!call.form.contains_key("client_secret"));

    let opened = browser.opened();
    assert_eq!(opened.len(), 1);
    assert!(opened[0].starts_with("https://accounts.spotify.com/authorize?"));
    assert!(opened[0].contains("show_dialog=true"));

    assert_eq!(
        h.observer.states(),
        vec![
            SessionState::ListenerStarted,
            SessionState::AwaitingRedirect,
            SessionState::CodeReceived,
            SessionState::ExchangeInFlight,
            SessionState::Completed,
        ]
    );
    assert!(h
        .observer
        .lines()
        .iter()
        .any(|l| l.contains("Access token expires in: 3600 seconds (60 minutes)")));
    assert_rebindable(h.port);
}

#[tokio::test]
async fn exchange_rejection_leaves_no_artifact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds = dir.path().join("SpotifyCredentials.inc");
    let token = FakeTokenServer::start(
        400,
        r#"{"error":"invalid_grant","error_description":"Code expired"}"#,
    )
    .await;
    let browser = RedirectingBrowser::new(["code=STALE"]);
    let mut h = SessionHarness::new(free_port(), &creds, &token.url, WAIT, Arc::new(browser));

    let req = request(&h, "abc", "xyz");
    let err = h.session.run(req).await.expect_err("exchange rejected");

    assert_eq!(err.kind(), ErrorKind::Exchange);
    assert_eq!(err.message(), "Code expired");
    assert_eq!(err.status(), Some(400));
    assert_eq!(h.session.state(), SessionState::ExchangeFailed);
    assert!(h.session.tokens().is_none());
    assert!(!creds.exists());
    assert_eq!(token.calls().len(), 1);
}

#[tokio::test]
async fn provider_error_skips_exchange() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds = dir.path().join("SpotifyCredentials.inc");
    let token = FakeTokenServer::start(200, TOKEN_OK_BODY).await;
    let browser = RedirectingBrowser::new(["error=access_denied"]);
    let mut h = SessionHarness::new(free_port(), &creds, &token.url, WAIT, Arc::new(browser));

    let req = request(&h, "abc", "xyz");
    let err = h.session.run(req).await.expect_err("user denied");

    assert_eq!(err.kind(), ErrorKind::Provider);
    assert_eq!(err.message(), "access_denied");
    assert_eq!(h.session.state(), SessionState::ProviderErrorReceived);
    assert!(token.calls().is_empty());
    assert!(!creds.exists());
    assert_rebindable(h.port);
}

#[tokio::test]
async fn no_redirect_times_out_and_releases_port() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds = dir.path().join("SpotifyCredentials.inc");
    let token = FakeTokenServer::start(200, TOKEN_OK_BODY).await;
    let mut h = SessionHarness::new(free_port(), &creds, &token.url, SHORT_WAIT, Arc::new(NoBrowser));

    let req = request(&h, "abc", "xyz");
    let err = h.session.run(req).await.expect_err("timeout");

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(h.session.state(), SessionState::TimedOut);
    assert!(!h.session.is_listening());
    assert!(token.calls().is_empty());
    assert_rebindable(h.port);
}

#[tokio::test]
async fn busy_port_fails_with_bind_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds = dir.path().join("SpotifyCredentials.inc");
    let token = FakeTokenServer::start(200, TOKEN_OK_BODY).await;
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").expect("occupy port");
    let port = occupied.local_addr().expect("addr").port();
    let mut h = SessionHarness::new(port, &creds, &token.url, WAIT, Arc::new(NoBrowser));

    let req = request(&h, "abc", "xyz");
    let err = h.session.begin(req).await.expect_err("port busy");

    assert_eq!(err.kind(), ErrorKind::Bind);
    assert!(err.message().contains(&port.to_string()));
    assert!(err.kind().hint().is_some());
    assert_eq!(h.session.state(), SessionState::BindFailed);
    assert!(h.session.authorize_url().is_none());
}

#[tokio::test]
async fn second_session_on_same_port_fails_while_first_listens() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds = dir.path().join("SpotifyCredentials.inc");
    let token = FakeTokenServer::start(200, TOKEN_OK_BODY).await;
    let port = free_port();
    let mut first = SessionHarness::new(port, &creds, &token.url, WAIT, Arc::new(NoBrowser));
    let mut second = SessionHarness::new(port, &creds, &token.url, WAIT, Arc::new(NoBrowser));

    let req = request(&first, "abc", "xyz");
    first.session.begin(req).await.expect("first binds");
    let req = request(&second, "abc", "xyz");
    let err = second.session.begin(req).await.expect_err("second fails");
    assert_eq!(err.kind(), ErrorKind::Bind);

    first.session.abort().await;
    assert_eq!(first.session.state(), SessionState::Aborted);
    assert_rebindable(port);
}

#[tokio::test]
async fn missing_secret_is_rejected_before_listening() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds = dir.path().join("SpotifyCredentials.inc");
    let token = FakeTokenServer::start(200, TOKEN_OK_BODY).await;
    let browser = RedirectingBrowser::new(["code=AUTHCODE"]);
    let mut h = SessionHarness::new(free_port(), &creds, &token.url, WAIT, Arc::new(browser.clone()));

    let req = request(&h, "abc", "   ");
    let err = h.session.begin(req).await.expect_err("validation");

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.observer.states().is_empty());
    assert!(browser.opened().is_empty());
    assert_rebindable(h.port);
}

#[tokio::test]
async fn first_redirect_wins() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds = dir.path().join("SpotifyCredentials.inc");
    let token = FakeTokenServer::start(200, TOKEN_OK_BODY).await;
    let browser = RedirectingBrowser::new(["code=FIRST", "code=SECOND"]);
    let mut h = SessionHarness::new(free_port(), &creds, &token.url, WAIT, Arc::new(browser));

    let req = request(&h, "abc", "xyz");
    h.session.run(req).await.expect("setup completes");

    let calls = token.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].form["code"], "FIRST");
}

#[tokio::test]
async fn storage_failure_keeps_tokens_for_manual_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    // The vault "directory" is a regular file, so the artifact cannot be created.
    let blocker = dir.path().join("@Vault");
    std::fs::write(&blocker, "not a directory").expect("seed blocker");
    let creds = blocker.join("SpotifyCredentials.inc");
    let token = FakeTokenServer::start(200, TOKEN_OK_BODY).await;
    let browser = RedirectingBrowser::new(["code=AUTHCODE"]);
    let mut h = SessionHarness::new(free_port(), &creds, &token.url, WAIT, Arc::new(browser));

    let req = request(&h, "abc", "xyz");
    let err = h.session.run(req).await.expect_err("storage fails");

    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(h.session.state(), SessionState::StorageFailed);
    let tokens = h.session.tokens().expect("tokens kept");
    assert_eq!(tokens.access_token(), "AT1");
    assert_eq!(tokens.refresh_token(), "RT1");
    assert_eq!(
        std::fs::read_to_string(&blocker).expect("blocker intact"),
        "not a directory"
    );
}

#[tokio::test]
async fn state_nonce_is_round_tripped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds = dir.path().join("SpotifyCredentials.inc");
    let token = FakeTokenServer::start(200, TOKEN_OK_BODY).await;
    let browser = RedirectingBrowser::new(["code=AUTHCODE"]).echoing_state();
    let mut h = SessionHarness::new(free_port(), &creds, &token.url, WAIT, Arc::new(browser));

    let req = request(&h, "abc", "xyz").with_generated_state();
    let outcome = h.session.run(req).await.expect("setup completes");
    assert_eq!(outcome.tokens.access_token(), "AT1");
    assert!(h
        .session
        .authorize_url()
        .is_some_and(|u| u.contains("state=")));
}

#[tokio::test]
async fn state_mismatch_is_ignored_until_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds = dir.path().join("SpotifyCredentials.inc");
    let token = FakeTokenServer::start(200, TOKEN_OK_BODY).await;
    let browser = RedirectingBrowser::new(["code=FORGED&state=wrong"]);
    let mut h = SessionHarness::new(
        free_port(),
        &creds,
        &token.url,
        SHORT_WAIT,
        Arc::new(browser.clone()),
    );

    let req = request(&h, "abc", "xyz").with_state_nonce("expected-nonce");
    let err = h.session.run(req).await.expect_err("forged redirect ignored");

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(browser.statuses(), vec![400]);
    assert!(token.calls().is_empty());
}

#[tokio::test]
async fn unreachable_token_endpoint_is_a_network_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds = dir.path().join("SpotifyCredentials.inc");
    // Nothing listens on a freshly released ephemeral port.
    let dead_token_url = format!("http://127.0.0.1:{}/api/token", free_port());
    let browser = RedirectingBrowser::new(["code=AUTHCODE"]);
    let mut h = SessionHarness::new(free_port(), &creds, &dead_token_url, WAIT, Arc::new(browser));

    let req = request(&h, "abc", "xyz");
    let err = h.session.run(req).await.expect_err("token endpoint down");

    assert_eq!(err.kind(), ErrorKind::Network);
    assert_ne!(err.kind(), ErrorKind::Exchange);
    assert!(err.status().is_none());
    assert_eq!(h.session.state(), SessionState::ExchangeFailed);
    assert!(h.session.tokens().is_none());
    assert!(!creds.exists());
    assert!(h
        .observer
        .lines()
        .iter()
        .any(|l| l.starts_with("✗ Network error:")));
}

#[tokio::test]
async fn redirect_uri_not_served_by_listener_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds = dir.path().join("SpotifyCredentials.inc");
    let token = FakeTokenServer::start(200, TOKEN_OK_BODY).await;
    let browser = RedirectingBrowser::new(["code=AUTHCODE"]);
    let mut h = SessionHarness::new(free_port(), &creds, &token.url, WAIT, Arc::new(browser.clone()));

    let req = AuthorizationRequest::new(
        "abc",
        "xyz",
        "http://127.0.0.1:1/elsewhere",
        ["user-read-currently-playing"],
    );
    let err = h.session.begin(req).await.expect_err("mismatched redirect_uri");

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(browser.opened().is_empty());
    assert!(token.calls().is_empty());
    assert_rebindable(h.port);
}

#[tokio::test]
async fn provider_error_code_is_verbatim_and_description_kept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds = dir.path().join("SpotifyCredentials.inc");
    let token = FakeTokenServer::start(200, TOKEN_OK_BODY).await;
    let browser =
        RedirectingBrowser::new(["error=access_denied&error_description=User+denied+access"]);
    let mut h = SessionHarness::new(free_port(), &creds, &token.url, WAIT, Arc::new(browser));

    let req = request(&h, "abc", "xyz");
    let err = h.session.run(req).await.expect_err("user denied");

    assert_eq!(err.kind(), ErrorKind::Provider);
    assert_eq!(err.message(), "access_denied");
    match h.session.callback_result() {
        Some(CallbackResult::ProviderError { code, description }) => {
            assert_eq!(code, "access_denied");
            assert_eq!(description, "User denied access");
        }
        other => panic!("unexpected callback result: {other:?}"),
    }
    assert!(h
        .observer
        .lines()
        .iter()
        .any(|l| l.contains("User denied access")));
}
