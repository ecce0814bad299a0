//! Bearer credential lifecycle.
//!
//! Resolves bearer tokens to identities through the identity provider and
//! caches them per user. A cached identity is only handed out while it grants
//! every required scope and is not about to expire.

use crate::config::SyncConfig;
use crate::error::{CloudResult, IdentityError};
use crate::transport::IdentityProvider;
use crate::types::Identity;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Resolves and caches identities.
pub struct CredentialManager {
    provider: Arc<dyn IdentityProvider>,
    required_scopes: Vec<String>,
    refresh_margin_secs: i64,
    identities: Arc<RwLock<HashMap<String, Identity>>>,
}

impl CredentialManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        required_scopes: Vec<String>,
        refresh_margin_secs: i64,
    ) -> Self {
        Self {
            provider,
            required_scopes,
            refresh_margin_secs,
            identities: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_config(provider: Arc<dyn IdentityProvider>, config: &SyncConfig) -> Self {
        Self::new(
            provider,
            config.required_scopes.clone(),
            config.credential_refresh_margin_secs,
        )
    }

    /// Resolves a bearer token, checks it and caches the result.
    pub async fn resolve(&self, bearer_token: &str) -> CloudResult<Identity> {
        let identity = self
            .provider
            .resolve_identity(bearer_token)
            .await
            .inspect_err(|e| warn!("identity resolution failed: {e}"))?;

        self.check(&identity)?;

        debug!(
            "resolved identity for user {}, expires at {}",
            identity.user_id, identity.expiry
        );
        self.identities
            .write()
            .await
            .insert(identity.user_id.clone(), identity.clone());
        Ok(identity)
    }

    /// Checks scopes and expiry of an identity.
    pub fn check(&self, identity: &Identity) -> Result<(), IdentityError> {
        let missing = identity.missing_scopes(&self.required_scopes);
        if !missing.is_empty() {
            return Err(IdentityError::MissingScopes(missing));
        }
        if identity.expires_within_secs(self.refresh_margin_secs) {
            return Err(IdentityError::Expired);
        }
        Ok(())
    }

    /// Caches an identity obtained elsewhere (e.g. restored from disk) if it
    /// is still usable.
    pub async fn adopt(&self, identity: Identity) -> Result<(), IdentityError> {
        self.check(&identity)?;
        self.identities
            .write()
            .await
            .insert(identity.user_id.clone(), identity);
        Ok(())
    }

    /// Returns the cached identity for a user if it is still usable.
    pub async fn cached(&self, user_id: &str) -> Result<Identity, IdentityError> {
        let identities = self.identities.read().await;
        let identity = identities.get(user_id).ok_or(IdentityError::Missing)?;
        self.check(identity)?;
        Ok(identity.clone())
    }

    /// Drops one user's identity, or all of them.
    pub async fn clear(&self, user_id: Option<&str>) {
        let mut identities = self.identities.write().await;
        match user_id {
            Some(id) => {
                identities.remove(id);
            }
            None => identities.clear(),
        }
    }

    pub async fn has_valid_identity(&self, user_id: &str) -> bool {
        self.cached(user_id).await.is_ok()
    }
}
