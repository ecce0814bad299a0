//! AES-256-CBC encryption keyed by a password and a salt pair.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_iv, derive_key, KdfParams};
use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Encrypts `plaintext` and returns base64 ciphertext.
///
/// Deterministic: the same password, salts and plaintext always give the same
/// ciphertext. Use a fresh salt pair per call.
pub fn encrypt(
    plaintext: &str,
    password: &str,
    key_salt: &str,
    iv_salt: &str,
    params: &KdfParams,
) -> CryptoResult<String> {
    let key = derive_key(password, key_salt, params)?;
    let iv = derive_iv(password, iv_salt, params)?;

    let ciphertext = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| CryptoError::InvalidParams(e.to_string()))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    Ok(STANDARD.encode(ciphertext))
}

/// Decrypts base64 ciphertext produced by [`encrypt`].
///
/// Every failure after key derivation is reported as
/// [`CryptoError::Decryption`].
pub fn decrypt(
    ciphertext_b64: &str,
    password: &str,
    key_salt: &str,
    iv_salt: &str,
    params: &KdfParams,
) -> CryptoResult<String> {
    let ciphertext = STANDARD
        .decode(ciphertext_b64)
        .map_err(|_| CryptoError::Decryption)?;

    let key = derive_key(password, key_salt, params)?;
    let iv = derive_iv(password, iv_salt, params)?;

    let plaintext = Aes256CbcDec::new_from_slices(key.as_bytes(), &iv)
        .map_err(|_| CryptoError::Decryption)?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CryptoError::Decryption)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption)
}
