//! Usage: Authorization request inputs for one OAuth attempt.

use crate::shared::error::{AppError, AppResult, ErrorKind};
use crate::shared::security::mask_token;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

/// Immutable inputs of a single authorization attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    state_nonce: Option<String>,
}

impl AuthorizationRequest {
    /// Build a request. Inputs are trimmed; duplicate scopes are dropped keeping first position.
    pub fn new<I, S>(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scopes: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered: Vec<String> = Vec::new();
        for scope in scopes {
            let scope = scope.into().trim().to_string();
            if !scope.is_empty() && !ordered.contains(&scope) {
                ordered.push(scope);
            }
        }

        Self {
            client_id: client_id.into().trim().to_string(),
            client_secret: client_secret.into().trim().to_string(),
            redirect_uri: redirect_uri.into().trim().to_string(),
            scopes: ordered,
            state_nonce: None,
        }
    }

    #[must_use]
    pub fn with_state_nonce(mut self, nonce: impl Into<String>) -> Self {
        let nonce = nonce.into();
        self.state_nonce = (!nonce.trim().is_empty()).then(|| nonce.trim().to_string());
        self
    }

    /// Attach a fresh 256-bit random `state` value.
    #[must_use]
    pub fn with_generated_state(self) -> Self {
        self.with_state_nonce(generate_state_nonce())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(AppError::new(
                ErrorKind::Validation,
                "client id and client secret are required",
            ));
        }
        if has_control_chars(&self.client_id) || has_control_chars(&self.client_secret) {
            return Err(AppError::new(
                ErrorKind::Validation,
                "client id and client secret must not contain control characters",
            ));
        }
        if self.redirect_uri.is_empty() {
            return Err(AppError::new(ErrorKind::Validation, "redirect uri is required"));
        }
        Ok(())
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn state_nonce(&self) -> Option<&str> {
        self.state_nonce.as_deref()
    }
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("client_id", &self.client_id)
            .field("client_secret", &mask_token(&self.client_secret))
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("state_nonce", &self.state_nonce.as_deref().map(mask_token))
            .finish()
    }
}

pub(crate) fn has_control_chars(value: &str) -> bool {
    value.chars().any(char::is_control)
}

fn generate_state_nonce() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
