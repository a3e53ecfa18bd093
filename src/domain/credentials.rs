//! Usage: Token set returned by the exchange and the credential record persisted to the vault.

use crate::shared::security::mask_token;
use std::fmt;

pub const DEFAULT_EXPIRES_IN_SECONDS: u64 = 3600;

#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    access_token: String,
    refresh_token: String,
    expires_in_seconds: u64,
    issued_at: i64,
}

impl TokenSet {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_seconds: u64,
        issued_at: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_in_seconds,
            issued_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn expires_in_seconds(&self) -> u64 {
        self.expires_in_seconds
    }

    /// Unix seconds at which the token set was issued.
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Unix seconds at which the access token expires.
    pub fn expiry_time(&self) -> i64 {
        let lifetime = i64::try_from(self.expires_in_seconds).unwrap_or(i64::MAX);
        self.issued_at.saturating_add(lifetime)
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &mask_token(&self.refresh_token))
            .field("expires_in_seconds", &self.expires_in_seconds)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Durable artifact contents: client credentials plus the obtained tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub client_id: String,
    pub client_secret: String,
    pub tokens: TokenSet,
}

impl CredentialRecord {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tokens: TokenSet,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tokens,
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("client_id", &self.client_id)
            .field("client_secret", &mask_token(&self.client_secret))
            .field("tokens", &self.tokens)
            .finish()
    }
}
