//! Encryption layer for Ozy.
//!
//! Turns a user password into symmetric key material and wraps text with it:
//! - PBKDF2-HMAC-SHA512 for key and IV derivation
//! - AES-256-CBC with PKCS#7 padding for encryption
//! - Key material zeroized on drop
//!
//! # Architecture
//!
//! Every encryption uses a fresh **salt pair**:
//!
//! 1. **Key salt**: combined with the password to derive the 32-byte key.
//! 2. **IV salt**: combined with the password to derive the 16-byte IV.
//!
//! Both salts are public and travel next to the ciphertext. Encryption is
//! deterministic for identical inputs, so callers must generate a new salt
//! pair for every write. CBC carries no authentication tag; integrity is
//! checked one layer up by comparing the salts embedded in the plaintext.
//!
//! Decryption failures are deliberately opaque: a wrong password, corrupted
//! ciphertext and bad padding all surface as the same
//! [`CryptoError::Decryption`].

mod cipher;
mod error;
mod key;
mod salt;

pub use cipher::{decrypt, encrypt};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_iv, derive_key, DerivedKey, KdfParams, IV_SIZE, KEY_SIZE, LEGACY_ITERATIONS};
pub use salt::{generate_salt, generate_salt_pair, SaltPair, MAX_SALT_BYTES, MIN_SALT_BYTES};
