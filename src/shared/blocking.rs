//! Usage: Run blocking work (file IO) on the tokio blocking pool with a stable label.

use crate::shared::error::{AppError, AppResult, ErrorKind};

pub async fn run<T, E>(
    label: &'static str,
    f: impl FnOnce() -> Result<T, E> + Send + 'static,
) -> AppResult<T>
where
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(Into::into),
        Err(join_err) => {
            // Panic payloads may echo secrets from the closure, so only the label is reported.
            if join_err.is_panic() {
                tracing::error!(label, "blocking task panicked");
                return Err(AppError::new(
                    ErrorKind::Internal,
                    format!("{label}: task panicked"),
                ));
            }

            tracing::warn!(label, "blocking task cancelled");
            Err(AppError::new(
                ErrorKind::Internal,
                format!("{label}: task cancelled"),
            ))
        }
    }
}
