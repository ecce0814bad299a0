//! Sync engine error types.

use crate::shape::ShapeError;
use thiserror::Error;

/// Result type for cloud operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur while opening, syncing or saving a document.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("bad document format: {0}")]
    BadDocumentFormat(#[from] ShapeError),

    /// Wrong password or tampered document; which one is never revealed.
    #[error("unable to open document: wrong password or corrupted data")]
    BadPassword,

    #[error("no such file: {0}")]
    NoSuchFile(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("session is not unlocked")]
    NotUnlocked,

    #[error("request superseded by a newer sign-in or sign-out")]
    Superseded,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("local storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] ozy_crypto::CryptoError),
}

impl CloudError {
    /// True when retrying, re-prompting or re-authenticating can succeed
    /// without selecting a different file.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            CloudError::BadDocumentFormat(_) | CloudError::NoSuchFile(_) | CloudError::Config(_)
        )
    }

    /// True when the caller should ask for the password again.
    pub fn needs_password(&self) -> bool {
        matches!(self, CloudError::BadPassword)
    }
}

/// Problems with a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("not authenticated")]
    Missing,

    #[error("credential expired or about to expire")]
    Expired,

    #[error("missing required scopes: {}", .0.join(", "))]
    MissingScopes(Vec<String>),

    #[error("credential rejected: {0}")]
    Invalid(String),
}
