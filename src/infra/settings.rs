//! Usage: Setup settings (TOML schema, defaults, validation, vault path resolution).

use crate::oauth::provider;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CALLBACK_HOST: &str = "127.0.0.1";
pub const DEFAULT_CALLBACK_PORT: u16 = 8888;
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";
pub const DEFAULT_CALLBACK_TIMEOUT_SECONDS: u64 = 120;
pub const DEFAULT_CREDENTIALS_FILE_NAME: &str = "SpotifyCredentials.inc";
const DEFAULT_HTTP_CONNECT_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_HTTP_REQUEST_TIMEOUT_SECONDS: u64 = 30;
const MAX_CALLBACK_TIMEOUT_SECONDS: u64 = 60 * 60;
const MAX_HTTP_TIMEOUT_SECONDS: u64 = 10 * 60;
const CONFIG_DIR_NAME: &str = "spotify-setup";
const CONFIG_FILE_NAME: &str = "config.toml";
const VAULT_DIR_NAME: &str = "@Vault";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupSettings {
    pub callback_host: String,
    pub callback_port: u16,
    pub callback_path: String,
    pub callback_timeout_seconds: u64,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub http_connect_timeout_seconds: u64,
    pub http_request_timeout_seconds: u64,
    pub vault_dir: Option<PathBuf>,
    pub credentials_file_name: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for SetupSettings {
    fn default() -> Self {
        Self {
            callback_host: DEFAULT_CALLBACK_HOST.to_string(),
            callback_port: DEFAULT_CALLBACK_PORT,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            callback_timeout_seconds: DEFAULT_CALLBACK_TIMEOUT_SECONDS,
            auth_url: provider::SPOTIFY_AUTH_URL.to_string(),
            token_url: provider::SPOTIFY_TOKEN_URL.to_string(),
            scopes: provider::SPOTIFY_SCOPES.iter().map(|s| s.to_string()).collect(),
            http_connect_timeout_seconds: DEFAULT_HTTP_CONNECT_TIMEOUT_SECONDS,
            http_request_timeout_seconds: DEFAULT_HTTP_REQUEST_TIMEOUT_SECONDS,
            vault_dir: None,
            credentials_file_name: DEFAULT_CREDENTIALS_FILE_NAME.to_string(),
            log_dir: None,
        }
    }
}

impl SetupSettings {
    pub fn validate(&self) -> AppResult<()> {
        let host: IpAddr = self
            .callback_host
            .trim()
            .parse()
            .map_err(|_| config_error("callback_host must be an IP address"))?;
        if !host.is_loopback() {
            return Err(config_error("callback_host must be a loopback address"));
        }
        if !self.callback_path.starts_with('/') {
            return Err(config_error("callback_path must start with '/'"));
        }
        if self.callback_timeout_seconds == 0
            || self.callback_timeout_seconds > MAX_CALLBACK_TIMEOUT_SECONDS
        {
            return Err(config_error(format!(
                "callback_timeout_seconds must be within 1..={MAX_CALLBACK_TIMEOUT_SECONDS}"
            )));
        }
        for (name, value) in [
            ("http_connect_timeout_seconds", self.http_connect_timeout_seconds),
            ("http_request_timeout_seconds", self.http_request_timeout_seconds),
        ] {
            if value == 0 || value > MAX_HTTP_TIMEOUT_SECONDS {
                return Err(config_error(format!(
                    "{name} must be within 1..={MAX_HTTP_TIMEOUT_SECONDS}"
                )));
            }
        }
        for (name, value) in [("auth_url", &self.auth_url), ("token_url", &self.token_url)] {
            reqwest::Url::parse(value.trim())
                .map_err(|e| config_error(format!("{name} is not a valid url: {e}")))?;
        }
        if self.scopes.iter().all(|s| s.trim().is_empty()) {
            return Err(config_error("scopes must not be empty"));
        }
        let file_name = self.credentials_file_name.trim();
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return Err(config_error(
                "credentials_file_name must be a plain, non-empty file name",
            ));
        }
        Ok(())
    }

    pub fn redirect_uri(&self) -> String {
        provider::make_redirect_uri(
            self.callback_host.trim(),
            self.callback_port,
            &self.callback_path,
        )
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_seconds)
    }

    pub fn http_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http_connect_timeout_seconds)
    }

    pub fn http_request_timeout(&self) -> Duration {
        Duration::from_secs(self.http_request_timeout_seconds)
    }

    /// Vault directory: the configured one, else `@Vault` inside the Rainmeter Skins folder.
    ///
    /// The Skins folder itself must already exist; only `@Vault` is created on save.
    pub fn resolve_vault_dir(&self) -> AppResult<PathBuf> {
        if let Some(dir) = &self.vault_dir {
            return Ok(dir.clone());
        }
        let skins = rainmeter_skins_dir().ok_or_else(|| {
            AppError::new(ErrorKind::Storage, "home directory could not be determined")
        })?;
        if !skins.is_dir() {
            return Err(AppError::new(
                ErrorKind::Storage,
                format!(
                    "Rainmeter Skins folder not found at {}; install Rainmeter or create the @Vault folder manually and pass --vault-dir",
                    skins.display()
                ),
            ));
        }
        Ok(skins.join(VAULT_DIR_NAME))
    }

    pub fn credentials_path(&self) -> AppResult<PathBuf> {
        Ok(self
            .resolve_vault_dir()?
            .join(self.credentials_file_name.trim()))
    }
}

/// `~/Documents/Rainmeter/Skins`.
pub fn rainmeter_skins_dir() -> Option<PathBuf> {
    let documents = dirs::document_dir().or_else(|| dirs::home_dir().map(|h| h.join("Documents")))?;
    Some(documents.join("Rainmeter").join("Skins"))
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn parse(content: &str) -> AppResult<SetupSettings> {
    let settings: SetupSettings = toml::from_str(content)
        .map_err(|e| config_error(format!("invalid settings file: {e}")))?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from `path`, or from the default config location when it exists.
///
/// An explicit path that cannot be read is an error; a missing default file means defaults.
pub fn read(path: Option<&Path>) -> AppResult<SetupSettings> {
    let (path, explicit) = match path {
        Some(p) => (Some(p.to_path_buf()), true),
        None => (default_config_path(), false),
    };
    let Some(path) = path else {
        return Ok(SetupSettings::default());
    };
    if !explicit && !path.exists() {
        return Ok(SetupSettings::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| config_error(format!("failed to read {}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "loaded setup settings");
    parse(&content)
}

fn config_error(message: impl Into<String>) -> AppError {
    AppError::new(ErrorKind::Config, message)
}
