//! Usage: Rainmeter `@Vault` credentials artifact (exact render format, atomic save, read-back).
//!
//! The skin's TokenManager.lua re-reads and rewrites these keys when it refreshes tokens, so
//! key names, comments, and section layout must stay byte-compatible.

use crate::domain::authorization::has_control_chars;
use crate::domain::credentials::CredentialRecord;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use crate::shared::fs::write_file_atomic;
use crate::shared::time::{format_local_timestamp, Clock};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub const SECTION_NAME: &str = "Variables";
pub const KEY_CLIENT_ID: &str = "SpotifyClientID";
pub const KEY_CLIENT_SECRET: &str = "SpotifyClientSecret";
pub const KEY_ACCESS_TOKEN: &str = "SpotifyAccessToken";
pub const KEY_REFRESH_TOKEN: &str = "SpotifyRefreshToken";
pub const KEY_TOKEN_EXPIRY: &str = "SpotifyTokenExpiry";

#[cfg(windows)]
const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
const LINE_ENDING: &str = "\n";

const RULE: &str = ";==============================================================================";

#[derive(Clone)]
pub struct CredentialStore {
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

impl CredentialStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn render(&self, record: &CredentialRecord) -> AppResult<String> {
        let fields = [
            (KEY_CLIENT_ID, record.client_id.as_str()),
            (KEY_CLIENT_SECRET, record.client_secret.as_str()),
            (KEY_ACCESS_TOKEN, record.tokens.access_token()),
            (KEY_REFRESH_TOKEN, record.tokens.refresh_token()),
        ];
        for (key, value) in fields {
            if value.is_empty() || has_control_chars(value) {
                return Err(AppError::new(
                    ErrorKind::Storage,
                    format!("{key} is empty or contains control characters"),
                ));
            }
        }

        let generated_at = format_local_timestamp(self.clock.now_unix_seconds());
        let lines = [
            RULE.to_string(),
            "; Spotify API Credentials".to_string(),
            RULE.to_string(),
            format!("; Auto-generated by SpotifySetup.exe on {generated_at}"),
            ";".to_string(),
            "; SECURITY WARNING:".to_string(),
            "; - NEVER commit this file to version control".to_string(),
            "; - NEVER share this file publicly".to_string(),
            "; - Keep this file in the @Vault folder (excluded from .rmskin distribution)"
                .to_string(),
            RULE.to_string(),
            String::new(),
            format!("[{SECTION_NAME}]"),
            "; OAuth 2.0 Credentials".to_string(),
            format!("{KEY_CLIENT_ID}={}", record.client_id),
            format!("{KEY_CLIENT_SECRET}={}", record.client_secret),
            String::new(),
            "; Access Token (expires every hour, auto-refreshed by TokenManager.lua)".to_string(),
            format!("{KEY_ACCESS_TOKEN}={}", record.tokens.access_token()),
            String::new(),
            "; Refresh Token (long-lived, use to get new access tokens)".to_string(),
            format!("{KEY_REFRESH_TOKEN}={}", record.tokens.refresh_token()),
            String::new(),
            "; Token Expiry (Unix timestamp, updated on each refresh)".to_string(),
            format!("{KEY_TOKEN_EXPIRY}={}", record.tokens.expiry_time()),
            String::new(),
            RULE.to_string(),
            "; DO NOT manually edit SpotifyAccessToken, SpotifyRefreshToken, or SpotifyTokenExpiry"
                .to_string(),
            "; These values are automatically managed by the skin's TokenManager.lua script"
                .to_string(),
            RULE.to_string(),
        ];

        let mut out = lines.join(LINE_ENDING);
        out.push_str(LINE_ENDING);
        Ok(out)
    }

    /// Render `record` and atomically replace the artifact at `target_path`.
    pub fn save(&self, record: &CredentialRecord, target_path: &Path) -> AppResult<()> {
        let content = self.render(record)?;
        write_file_atomic(target_path, content.as_bytes())
            .map_err(|reason| AppError::new(ErrorKind::Storage, reason))?;
        tracing::info!(
            path = %target_path.display(),
            expiry_time = record.tokens.expiry_time(),
            "credentials written"
        );
        Ok(())
    }
}

/// Key/value pairs of the `[Variables]` section; comments and other sections are skipped.
pub fn read_variables(content: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    let mut in_section = false;
    for raw in content.lines() {
        let line = raw.trim_end_matches('\r').trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim().eq_ignore_ascii_case(SECTION_NAME);
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            vars.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    vars
}

pub fn read_file(path: &Path) -> AppResult<Option<BTreeMap<String, String>>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(read_variables(&content))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::new(
            ErrorKind::Storage,
            format!("failed to read {}: {e}", path.display()),
        )),
    }
}
