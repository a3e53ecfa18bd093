//! Usage: Persistence and settings adapters.

pub mod credential_store;
pub mod settings;
