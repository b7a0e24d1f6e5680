//! Settlement error taxonomy
//!
//! Callers pattern-match on the variant to decide recoverability instead of
//! string-matching messages: certificate and validation errors are fatal for
//! the request, provider errors carry the upstream status code so 5xx can be
//! retried with backoff while 4xx cannot.

use thiserror::Error;

/// Errors produced by the settlement core
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Certificate material missing or unreadable. Fatal, never retried.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Malformed input, rejected before any network call. Fatal, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Non-2xx response from the payment provider, original status preserved.
    #[error("provider error ({status}): {message}")]
    Api {
        status: u16,
        error_code: Option<String>,
        message: String,
    },

    /// Transport-level failure talking to the provider or a collaborator.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Referenced record does not exist locally.
    #[error("not found: {0}")]
    NotFound(String),

    /// Collaborator failure (renderer, mailer, storage, catalog).
    #[error("{0}")]
    Collaborator(String),
}

impl SettlementError {
    /// Whether a caller-directed retry with backoff is reasonable.
    ///
    /// Only transient provider errors qualify; validation and certificate
    /// failures will fail identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SettlementError::Api { status, .. } => *status >= 500,
            SettlementError::Http(_) => true,
            SettlementError::Certificate(_)
            | SettlementError::Validation(_)
            | SettlementError::Database(_)
            | SettlementError::NotFound(_)
            | SettlementError::Collaborator(_) => false,
        }
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;
