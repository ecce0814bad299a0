//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in crypto operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Wrong password, corrupted ciphertext or bad padding. The causes are
    /// not distinguished.
    #[error("decryption failed (wrong password or corrupted data)")]
    Decryption,

    #[error("invalid key derivation parameters: {0}")]
    InvalidParams(String),
}
