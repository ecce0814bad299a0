//! Document envelope codec.
//!
//! A stored document is a small JSON envelope:
//!
//! ```json
//! { "salt": ["<key salt>", "<iv salt>"], "revision": "<uuid>", "encrypted": "<base64>" }
//! ```
//!
//! `encrypted` holds the ciphertext of `{"salts": [..], "appState": {..}}`.
//! Repeating the salts inside the ciphertext is the only integrity check CBC
//! gets: after decryption they must match the public ones.
//!
//! Documents written with a non-legacy iteration count also carry
//! `"kdf": {"iterations": n}`. Legacy documents omit it and open with 100.

use crate::error::{CloudError, CloudResult};
use crate::shape::{validate_shape, ShapeError};
use ozy_crypto::{KdfParams, SaltPair};
use ozy_types::SubAppsState;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The envelope as stored on the document host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAppState {
    /// `[key_salt, iv_salt]`.
    pub salt: [String; 2],
    pub revision: String,
    pub encrypted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf: Option<KdfParams>,
}

impl DocumentAppState {
    /// KDF parameters to open this document with.
    pub fn kdf_params(&self) -> KdfParams {
        self.kdf.unwrap_or_default()
    }

    pub fn to_json(&self) -> CloudResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses and validates raw document text.
    pub fn parse(raw: &str) -> Result<Self, ShapeError> {
        validate_shape(raw)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncryptedContent {
    salts: [String; 2],
    app_state: SubAppsState,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncryptedContentRef<'a> {
    salts: &'a [String; 2],
    app_state: &'a SubAppsState,
}

/// Result of a successful unlock.
#[derive(Clone, Debug, PartialEq)]
pub struct UnlockedDocument {
    pub revision: String,
    pub app_state: SubAppsState,
}

/// The password does not open the document, or the document was tampered with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("wrong password or corrupted document")]
pub struct BadPassword;

impl From<BadPassword> for CloudError {
    fn from(_: BadPassword) -> Self {
        CloudError::BadPassword
    }
}

/// Encrypts `app_state` into a new envelope with fresh salts and a fresh
/// revision.
pub fn build_envelope(
    app_state: &SubAppsState,
    password: &str,
    params: &KdfParams,
) -> CloudResult<DocumentAppState> {
    let salt = SaltPair::generate().into_array();
    let plaintext = serde_json::to_string(&EncryptedContentRef {
        salts: &salt,
        app_state,
    })?;
    let encrypted = ozy_crypto::encrypt(&plaintext, password, &salt[0], &salt[1], params)?;

    Ok(DocumentAppState {
        salt,
        revision: Uuid::new_v4().to_string(),
        encrypted,
        kdf: (!params.is_legacy()).then_some(*params),
    })
}

/// Decrypts an envelope with `password`.
///
/// Cipher failure, unparseable plaintext and a salt mismatch are all
/// reported as the same [`BadPassword`].
pub fn unlock(doc: &DocumentAppState, password: &str) -> Result<UnlockedDocument, BadPassword> {
    let [key_salt, iv_salt] = &doc.salt;
    let plaintext = ozy_crypto::decrypt(
        &doc.encrypted,
        password,
        key_salt,
        iv_salt,
        &doc.kdf_params(),
    )
    .map_err(|_| BadPassword)?;

    let content: EncryptedContent = serde_json::from_str(&plaintext).map_err(|_| BadPassword)?;
    if content.salts != doc.salt {
        return Err(BadPassword);
    }

    Ok(UnlockedDocument {
        revision: doc.revision.clone(),
        app_state: content.app_state,
    })
}
