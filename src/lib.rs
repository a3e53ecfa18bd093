//! Usage: One-shot Spotify OAuth setup that writes `@Vault/SpotifyCredentials.inc` for the
//! SpotifyNowPlaying Rainmeter skin.

pub mod app;
pub mod domain;
pub mod infra;
pub mod oauth;
pub mod shared;

pub use domain::authorization::AuthorizationRequest;
pub use domain::credentials::{CredentialRecord, TokenSet};
pub use infra::credential_store::CredentialStore;
pub use infra::settings::SetupSettings;
pub use oauth::callback_server::{CallbackListener, CallbackResult};
pub use oauth::session::{AuthSession, SessionObserver, SessionSettings, SessionState, SetupOutcome};
pub use oauth::token_exchange::TokenExchangeClient;
pub use shared::error::{AppError, AppResult, ErrorKind};

use clap::Parser;
use std::process::ExitCode;

pub fn run() -> ExitCode {
    let cli = app::cli::Cli::parse();
    app::cli::main_with_args(cli)
}
