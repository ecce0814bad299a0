//! Remembers which password opened which revision.
//!
//! Lets a returning user skip the password prompt when the remote document
//! is still at a revision this process has already unlocked or written.

use crate::config::TrustCachePolicy;
use crate::types::Password;
use std::collections::HashMap;

/// `revision -> password` map with a retention policy.
#[derive(Debug, Default)]
pub struct TrustCache {
    policy: TrustCachePolicy,
    entries: HashMap<String, Password>,
}

impl TrustCache {
    pub fn new(policy: TrustCachePolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
        }
    }

    /// Records a password for a revision. No-op when the cache is disabled.
    pub fn record(&mut self, revision: impl Into<String>, password: Password) {
        if self.policy == TrustCachePolicy::Disabled {
            return;
        }
        self.entries.insert(revision.into(), password);
    }

    pub fn get(&self, revision: &str) -> Option<&Password> {
        self.entries.get(revision)
    }

    /// Applies the retention policy at sign-out.
    pub fn on_sign_out(&mut self) {
        if self.policy != TrustCachePolicy::RetainAcrossSignOut {
            self.entries.clear();
        }
    }

    pub fn policy(&self) -> TrustCachePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
