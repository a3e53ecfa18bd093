//! Usage: Unified setup error model (maps internal failures to `CODE: message` strings).

use std::sync::Arc;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Bind,
    Provider,
    Timeout,
    Network,
    Exchange,
    Storage,
    Config,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Bind => "BIND_ERROR",
            Self::Provider => "PROVIDER_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Network => "NETWORK_ERROR",
            Self::Exchange => "EXCHANGE_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::Config => "CONFIG_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        let kind = match code {
            "VALIDATION_ERROR" => Self::Validation,
            "BIND_ERROR" => Self::Bind,
            "PROVIDER_ERROR" => Self::Provider,
            "TIMEOUT" => Self::Timeout,
            "NETWORK_ERROR" => Self::Network,
            "EXCHANGE_ERROR" => Self::Exchange,
            "STORAGE_ERROR" => Self::Storage,
            "CONFIG_ERROR" => Self::Config,
            "CANCELLED" => Self::Cancelled,
            "INTERNAL_ERROR" => Self::Internal,
            _ => return None,
        };
        Some(kind)
    }

    /// Short guidance shown next to the error message.
    pub fn hint(self) -> Option<&'static str> {
        match self {
            Self::Validation => Some("Please enter both Client ID and Client Secret."),
            Self::Bind => {
                Some("Please close any application using this port and try again.")
            }
            Self::Timeout => Some("Authorization timed out. Please try again."),
            Self::Exchange => {
                Some("Authorization codes are single-use; restart the setup to get a new one.")
            }
            Self::Storage => Some("The tokens below can be copied into the file manually."),
            Self::Cancelled => Some("Nothing was written. Run the setup again when ready."),
            Self::Provider | Self::Network | Self::Config | Self::Internal => None,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {message}", kind.code())]
pub struct AppError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status returned by the token endpoint, for exchange failures.
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

fn split_code_message(raw: &str) -> Option<(&str, &str)> {
    let msg = raw.trim();
    let msg = msg.strip_prefix("Error:").unwrap_or(msg).trim();
    if msg.is_empty() {
        return None;
    }

    let (maybe_code, rest) = msg.split_once(':')?;
    let code = maybe_code.trim();
    if code.is_empty() {
        return None;
    }
    let mut chars = code.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    if !chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_') {
        return None;
    }
    Some((code, rest.trim()))
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        if let Some((code, rest)) = split_code_message(&value) {
            if let Some(kind) = ErrorKind::from_code(code) {
                let message = if rest.is_empty() { value.trim() } else { rest };
                return AppError::new(kind, message.to_string());
            }
        }
        AppError::new(ErrorKind::Internal, value)
    }
}

impl From<&'static str> for AppError {
    fn from(value: &'static str) -> Self {
        AppError::from(value.to_string())
    }
}

impl From<AppError> for String {
    fn from(value: AppError) -> Self {
        value.to_string()
    }
}
