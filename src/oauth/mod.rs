//! Usage: Spotify authorization-code flow (provider constants, callback listener, exchange, session).

pub mod browser;
pub mod callback_server;
pub mod provider;
pub mod session;
pub mod token_exchange;
