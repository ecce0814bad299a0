//! Password-based key derivation.

use crate::error::{CryptoError, CryptoResult};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// CBC initialization vector size in bytes.
pub const IV_SIZE: usize = 16;

/// Iteration count of every document written before the `kdf` envelope
/// field existed. Far below current guidance; kept so those documents open.
pub const LEGACY_ITERATIONS: u32 = 100;

/// PBKDF2 parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KdfParams {
    pub iterations: u32,
}

impl KdfParams {
    /// Parameters of legacy documents (100 iterations).
    pub const fn legacy() -> Self {
        Self {
            iterations: LEGACY_ITERATIONS,
        }
    }

    pub fn new(iterations: u32) -> CryptoResult<Self> {
        let params = Self { iterations };
        params.validate()?;
        Ok(params)
    }

    pub fn is_legacy(&self) -> bool {
        self.iterations == LEGACY_ITERATIONS
    }

    pub fn validate(&self) -> CryptoResult<()> {
        if self.iterations == 0 {
            return Err(CryptoError::InvalidParams(
                "iteration count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::legacy()
    }
}

/// A 256-bit key derived from a password. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Derives the encryption key from `password` and the key salt.
///
/// The salt is used as the UTF-8 bytes of its stored (base64) text, not as
/// the decoded random bytes.
pub fn derive_key(password: &str, salt: &str, params: &KdfParams) -> CryptoResult<DerivedKey> {
    let mut key = [0u8; KEY_SIZE];
    derive_into(password, salt, params, &mut key)?;
    let derived = DerivedKey(key);
    key.zeroize();
    Ok(derived)
}

/// Derives the CBC IV from `password` and the IV salt.
pub fn derive_iv(password: &str, salt: &str, params: &KdfParams) -> CryptoResult<[u8; IV_SIZE]> {
    let mut iv = [0u8; IV_SIZE];
    derive_into(password, salt, params, &mut iv)?;
    Ok(iv)
}

fn derive_into(password: &str, salt: &str, params: &KdfParams, out: &mut [u8]) -> CryptoResult<()> {
    params.validate()?;
    pbkdf2_hmac::<Sha512>(password.as_bytes(), salt.as_bytes(), params.iterations, out);
    Ok(())
}
