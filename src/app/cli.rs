//! Usage: `spotify-setup` command-line front end.
//!
//! - `spotify-setup`                      # same as `authorize`
//! - `spotify-setup authorize`            # run the OAuth flow and write the vault file
//! - `spotify-setup status`               # inspect the existing vault file
//! - `spotify-setup dashboard`            # open the Spotify Developer Dashboard

use crate::domain::authorization::AuthorizationRequest;
use crate::domain::credentials::TokenSet;
use crate::infra::credential_store::{self, CredentialStore};
use crate::infra::settings::{self, SetupSettings};
use crate::oauth::browser::{BrowserOpener, NoBrowser, SystemBrowser};
use crate::oauth::callback_server::CallbackResult;
use crate::oauth::provider;
use crate::oauth::session::{
    AuthSession, SessionObserver, SessionSettings, SessionState, SetupOutcome,
};
use crate::oauth::token_exchange::TokenExchangeClient;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use crate::shared::security::mask_token;
use crate::shared::time::{format_local_timestamp, Clock, SystemClock};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const BANNER_RULE: &str = "============================================================";

#[derive(Parser, Debug)]
#[command(name = "spotify-setup")]
#[command(about = "One-time Spotify authorization for the SpotifyNowPlaying Rainmeter skin")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Path to a TOML settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub authorize: AuthorizeArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Authorize with Spotify and write SpotifyCredentials.inc (default)
    Authorize(AuthorizeArgs),
    /// Show what the existing credentials file contains
    Status(StatusArgs),
    /// Open the Spotify Developer Dashboard to create an app
    Dashboard,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AuthorizeArgs {
    /// Spotify app Client ID
    #[arg(long, env = "SPOTIFY_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Spotify app Client Secret
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Write into this directory instead of the Rainmeter @Vault folder
    #[arg(long)]
    pub vault_dir: Option<PathBuf>,

    /// Print the authorization URL instead of launching a browser
    #[arg(long)]
    pub no_browser: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {
    /// Read from this directory instead of the Rainmeter @Vault folder
    #[arg(long)]
    pub vault_dir: Option<PathBuf>,
}

/// Prints session progress the way the setup window's log pane did.
struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn on_transition(&self, _from: SessionState, to: SessionState) {
        tracing::debug!(state = to.as_str(), "session state");
    }

    fn on_log(&self, message: &str) {
        println!("{message}");
    }
}

pub fn main_with_args(cli: Cli) -> ExitCode {
    let settings = match settings::read(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => return report_error(&err),
    };
    let _guard = match crate::app::logging::init(settings.log_dir.as_deref(), cli.verbose) {
        Ok(guard) => guard,
        Err(err) => return report_error(&err),
    };

    let result = match cli.command {
        Some(Command::Authorize(args)) => authorize(settings, args),
        None => authorize(settings, cli.authorize),
        Some(Command::Status(args)) => status(settings, args),
        Some(Command::Dashboard) => dashboard(),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(&err),
    }
}

fn build_runtime() -> AppResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::new(ErrorKind::Internal, format!("tokio runtime init failed: {e}")))
}

fn prompt_missing(value: Option<String>, label: &str, hidden: bool) -> AppResult<String> {
    if let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        return Ok(value);
    }
    let answer = if hidden {
        dialoguer::Password::new().with_prompt(label).interact()
    } else {
        dialoguer::Input::<String>::new()
            .with_prompt(label)
            .allow_empty(true)
            .interact_text()
    };
    answer.map_err(|e| AppError::new(ErrorKind::Validation, format!("failed to read {label}: {e}")))
}

/// Request for the configured listener, with a fresh `state` nonce.
fn build_request(
    settings: &SetupSettings,
    client_id: String,
    client_secret: String,
) -> AppResult<AuthorizationRequest> {
    let request = AuthorizationRequest::new(
        client_id,
        client_secret,
        settings.redirect_uri(),
        settings.scopes.iter().cloned(),
    )
    .with_generated_state();
    request.validate().map_err(|_| {
        AppError::new(
            ErrorKind::Validation,
            "Please enter both Client ID and Client Secret",
        )
    })?;
    Ok(request)
}

fn authorize(mut settings: SetupSettings, args: AuthorizeArgs) -> AppResult<()> {
    if args.vault_dir.is_some() {
        settings.vault_dir = args.vault_dir.clone();
    }
    settings.validate()?;

    let client_id = prompt_missing(args.client_id, "Client ID", false)?;
    let client_secret = prompt_missing(args.client_secret, "Client Secret", true)?;
    let request = build_request(&settings, client_id, client_secret)?;

    let session_settings = SessionSettings::from_setup(&settings)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let exchange = TokenExchangeClient::new(
        settings.token_url.clone(),
        settings.http_connect_timeout(),
        settings.http_request_timeout(),
        clock.clone(),
    )?;
    let browser: Arc<dyn BrowserOpener> = if args.no_browser {
        Arc::new(NoBrowser)
    } else {
        Arc::new(SystemBrowser)
    };
    let mut session = AuthSession::new(
        session_settings,
        exchange,
        CredentialStore::new(clock),
        browser,
        Arc::new(ConsoleObserver),
    );

    println!();
    println!("{BANNER_RULE}");
    println!("Starting OAuth 2.0 Authorization Flow...");
    println!("{BANNER_RULE}");

    let runtime = build_runtime()?;
    let result = runtime.block_on(run_session(&mut session, request));

    match result {
        Ok(outcome) => {
            println!();
            println!("{BANNER_RULE}");
            println!("✓✓✓ SETUP COMPLETE! ✓✓✓");
            println!("{BANNER_RULE}");
            println!();
            println!("Credentials: {}", outcome.credentials_path.display());
            println!(
                "Access token expires in {} seconds ({} minutes).",
                outcome.tokens.expires_in_seconds(),
                outcome.tokens.expires_in_seconds() / 60
            );
            println!();
            println!("Next steps:");
            println!("1. Open Rainmeter");
            println!("2. Load the 'SpotifyNowPlaying' skin");
            println!("3. Enjoy your Spotify integration!");
            println!();
            println!("Note: Tokens will auto-refresh every ~55 minutes.");
            Ok(())
        }
        Err(err) => {
            if let Some(CallbackResult::ProviderError { description, .. }) =
                session.callback_result()
            {
                if !description.is_empty() {
                    eprintln!("   Spotify says: {description}");
                }
            }
            if err.kind() == ErrorKind::Storage {
                if let (Some(tokens), Some(request)) = (session.tokens(), session.request()) {
                    print_manual_entry(request, tokens);
                }
            }
            Err(err)
        }
    }
}

async fn run_session(
    session: &mut AuthSession,
    request: AuthorizationRequest,
) -> AppResult<SetupOutcome> {
    let url = session.begin(request).await?;
    println!();
    println!("If the browser did not open, visit this URL:");
    println!("   {url}");
    println!();

    let finished = tokio::select! {
        outcome = session.finish() => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };
    match finished {
        Some(outcome) => outcome,
        None => {
            session.abort().await;
            Err(AppError::new(ErrorKind::Cancelled, "authorization cancelled"))
        }
    }
}

fn print_manual_entry(request: &AuthorizationRequest, tokens: &TokenSet) {
    eprintln!();
    eprintln!("The tokens were obtained but could not be saved.");
    eprintln!("Add these lines under [Variables] in SpotifyCredentials.inc by hand:");
    eprintln!("{}={}", credential_store::KEY_CLIENT_ID, request.client_id());
    eprintln!("{}={}", credential_store::KEY_CLIENT_SECRET, request.client_secret());
    eprintln!("{}={}", credential_store::KEY_ACCESS_TOKEN, tokens.access_token());
    eprintln!("{}={}", credential_store::KEY_REFRESH_TOKEN, tokens.refresh_token());
    eprintln!("{}={}", credential_store::KEY_TOKEN_EXPIRY, tokens.expiry_time());
}

fn status(mut settings: SetupSettings, args: StatusArgs) -> AppResult<()> {
    if args.vault_dir.is_some() {
        settings.vault_dir = args.vault_dir;
    }
    let path = settings.credentials_path()?;
    let Some(vars) = credential_store::read_file(&path)? else {
        return Err(AppError::new(
            ErrorKind::Storage,
            format!("no credentials file at {}; run `spotify-setup authorize`", path.display()),
        ));
    };

    println!("Credentials: {}", path.display());
    for key in [
        credential_store::KEY_CLIENT_ID,
        credential_store::KEY_CLIENT_SECRET,
        credential_store::KEY_ACCESS_TOKEN,
        credential_store::KEY_REFRESH_TOKEN,
    ] {
        let shown = vars
            .get(key)
            .map(|v| mask_token(v))
            .unwrap_or_else(|| "(missing)".to_string());
        println!("  {key}={shown}");
    }

    match vars
        .get(credential_store::KEY_TOKEN_EXPIRY)
        .and_then(|v| v.parse::<i64>().ok())
    {
        Some(expiry) => {
            let expired = SystemClock.now_unix_seconds() >= expiry;
            println!(
                "  {}={expiry} ({})",
                credential_store::KEY_TOKEN_EXPIRY,
                format_local_timestamp(expiry)
            );
            println!(
                "  access token expired: {}",
                if expired { "yes" } else { "no" }
            );
        }
        None => println!("  {}=(missing)", credential_store::KEY_TOKEN_EXPIRY),
    }
    Ok(())
}

fn dashboard() -> AppResult<()> {
    SystemBrowser.open(provider::SPOTIFY_DEVELOPER_DASHBOARD_URL)?;
    println!("✓ Opened Spotify Developer Dashboard in browser");
    println!("   {}", provider::SPOTIFY_DEVELOPER_DASHBOARD_URL);
    Ok(())
}

fn report_error(err: &AppError) -> ExitCode {
    tracing::debug!(code = err.code(), "command failed: {}", err.message());
    eprintln!("✗ {err}");
    if let Some(status) = err.status() {
        eprintln!("   HTTP status: {status}");
    }
    if let Some(hint) = err.kind().hint() {
        eprintln!("   {hint}");
    }
    ExitCode::from(1)
}
