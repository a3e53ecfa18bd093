//! Usage: Spotify OAuth endpoints, scopes, and authorization URL construction.

use crate::domain::authorization::AuthorizationRequest;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use std::net::{IpAddr, SocketAddr};

pub const SPOTIFY_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const SPOTIFY_DEVELOPER_DASHBOARD_URL: &str = "https://developer.spotify.com/dashboard";
pub const SPOTIFY_SCOPES: &[&str] = &["user-read-currently-playing", "user-modify-playback-state"];

/// Spotify's flag that makes the consent screen appear even for an existing grant.
const FORCE_CONSENT_PARAM: (&str, &str) = ("show_dialog", "true");

/// `http://host:port/path`; IPv6 literals are bracketed.
pub fn make_redirect_uri(host: &str, port: u16, callback_path: &str) -> String {
    match host.parse::<IpAddr>() {
        Ok(ip) => format!("http://{}{callback_path}", SocketAddr::new(ip, port)),
        Err(_) => format!("http://{host}:{port}{callback_path}"),
    }
}

pub fn build_authorize_url(auth_url: &str, request: &AuthorizationRequest) -> AppResult<String> {
    let mut url = reqwest::Url::parse(auth_url.trim()).map_err(|e| {
        AppError::new(ErrorKind::Config, format!("invalid oauth auth url: {e}"))
    })?;
    {
        let scope = request.scopes().join(" ");
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", request.client_id());
        query.append_pair("response_type", "code");
        query.append_pair("redirect_uri", request.redirect_uri());
        query.append_pair("scope", &scope);
        query.append_pair(FORCE_CONSENT_PARAM.0, FORCE_CONSENT_PARAM.1);
        if let Some(state) = request.state_nonce() {
            query.append_pair("state", state);
        }
    }
    Ok(url.to_string())
}
