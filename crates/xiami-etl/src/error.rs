//! Error types for the export, download and tagging stages.

use thiserror::Error;

/// Errors that can occur while talking to the remote API or writing exports.
#[derive(Debug, Error)]
pub enum EtlError {
    /// The signing cookie is absent from the captured session.
    #[error("cookie '{name}' not found in session; capture a fresh session cookie")]
    MissingCookie { name: String },

    /// The API answered with a non-success code.
    #[error("API error on {path}: {code} {msg} (body: {body})")]
    Api {
        path: String,
        code: String,
        msg: String,
        body: String,
    },

    /// The response did not have the expected envelope shape.
    #[error("unexpected response from {path}: {body}")]
    Envelope { path: String, body: String },

    /// An error propagated from `reqwest`.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// An error propagated from the core domain layer.
    #[error("database error: {0}")]
    Database(#[from] xiami_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tag error: {0}")]
    Tag(#[from] lofty::error::LoftyError),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

/// Response codes meaning the captured session is no longer accepted.
const AUTH_CODES: &[&str] = &["SG_TOKEN_EXPIRED", "SG_TOKEN_EMPTY", "SG_INVALID", "SG_EMPTY"];

impl EtlError {
    /// Returns `true` when the session cookie is missing or rejected and must
    /// be captured again.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::MissingCookie { .. } => true,
            Self::Api { code, .. } => AUTH_CODES.contains(&code.as_str()),
            _ => false,
        }
    }

    /// Returns `true` when the error is transient and the operation may
    /// succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_body()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::Io(_) => true,
            _ => false,
        }
    }
}

/// Convenience alias for ETL results.
pub type EtlResult<T> = std::result::Result<T, EtlError>;
