//! Shared types for session and sync operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A bearer credential resolved to a user by the identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    /// Bearer token sent to the document host.
    pub token: String,
    pub expiry: DateTime<Utc>,
    pub granted_scopes: Vec<String>,
    #[serde(default)]
    pub profile: Profile,
}

impl Identity {
    /// Returns true if the credential will expire within the given seconds.
    pub fn expires_within_secs(&self, secs: i64) -> bool {
        Utc::now() + chrono::Duration::seconds(secs) >= self.expiry
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expiry
    }

    /// Scopes from `required` this credential does not grant.
    pub fn missing_scopes(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|scope| !self.granted_scopes.contains(scope))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("granted_scopes", &self.granted_scopes)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Contents of a remote document as returned by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub title: String,
    pub text: String,
}

/// The file a user picked, remembered per user on the local device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSelection {
    pub file_id: String,
    pub file_name: String,
}

/// How the document content is protected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionMethod {
    /// PBKDF2-derived AES-256-CBC keyed by the user's password.
    #[default]
    PasswordPbkdf2,
}

/// A document password. Zeroized on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Transient messages for the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// Another writer changed the document; local state was replaced.
    ExternalChange { revision: String },
    /// The remote revision could not be opened with any known password.
    RemoteUnreadable { revision: String },
    Saved { revision: String },
    SaveFailed { detail: String },
}
