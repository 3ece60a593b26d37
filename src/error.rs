//! Error taxonomy for the bot core.
//!
//! Every failure the passes can observe falls into one of these kinds:
//! transport (no response), API (server answered with an error payload),
//! local quota exhaustion, state-machine misuse, persisted-document I/O,
//! or a missing session. Retryability is a property of the error itself
//! (`is_retryable`), consumed by the retry policy.

use std::path::Path;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// HTTP statuses worth a backed-off retry. Connection-level failures are
/// deliberately excluded: a request that never reached the server is not
/// retried under the current policy.
const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Error)]
pub enum Error {
    /// No response received (connect, timeout, body read).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server responded with an error payload.
    #[error("api error {status_code} ({code}): {message}")]
    Api {
        code: String,
        status_code: u16,
        message: String,
    },

    /// A local daily ceiling was hit; the external service was never called.
    #[error("quota exhausted")]
    QuotaExceeded { kind: &'static str },

    /// The queue state machine was asked to do something it cannot.
    #[error("invalid work item {id}: {detail}")]
    Validation { id: String, detail: String },

    /// A persisted document is missing or unreadable.
    #[error("state document {path}: {detail}")]
    StateIo { path: String, detail: String },

    /// Expected condition: no login session available for a write action.
    #[error("not authenticated")]
    AuthRequired,
}

impl Error {
    pub fn transport(detail: impl Into<String>) -> Self {
        Error::Transport(detail.into())
    }

    pub fn api(code: impl Into<String>, status_code: u16, message: impl Into<String>) -> Self {
        Error::Api {
            code: code.into(),
            status_code,
            message: message.into(),
        }
    }

    pub fn validation(id: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Validation {
            id: id.into(),
            detail: detail.into(),
        }
    }

    pub fn state_io(path: &Path, detail: impl ToString) -> Self {
        Error::StateIo {
            path: path.display().to_string(),
            detail: detail.to_string(),
        }
    }

    /// The HTTP status carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// True iff the retry policy should re-attempt the failed call.
    pub fn is_retryable(&self) -> bool {
        match self.status_code() {
            Some(status) => RETRYABLE_STATUS_CODES.contains(&status),
            None => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Error::api("API_ERROR", status.as_u16(), err.to_string()),
            None => Error::Transport(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        for status in [429, 500, 502, 503, 504] {
            assert!(Error::api("API_ERROR", status, "boom").is_retryable());
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!Error::api("API_ERROR", status, "boom").is_retryable());
        }
    }

    #[test]
    fn transport_is_not_retryable() {
        assert!(!Error::transport("connection refused").is_retryable());
        assert!(!Error::AuthRequired.is_retryable());
        assert!(!Error::QuotaExceeded { kind: "likes" }.is_retryable());
    }

    #[test]
    fn quota_message_is_stable() {
        // The consumer pass records this message verbatim on failed items.
        assert_eq!(
            Error::QuotaExceeded { kind: "likes" }.to_string(),
            "quota exhausted"
        );
    }
}
