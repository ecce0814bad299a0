//! Session state machine.
//!
//! A session walks `SignedOut -> Authenticated -> FileSelected -> Unlocked`.
//! Sign-in is split in two: [`plan_sign_in`] is a pure function that merges
//! an update into the current fields and decides what has to happen, and
//! [`Session::sign_in`] carries the plan out against the transport.
//!
//! All mutation goes through one `tokio::sync::Mutex<SessionState>`. The lock
//! is never held across network I/O. Every sign-in, refresh and save takes a
//! fresh in-flight tag; a response whose tag is no longer the latest is
//! dropped without touching state.

use crate::config::SyncConfig;
use crate::credential_manager::CredentialManager;
use crate::debounce::SaveDebounce;
use crate::document::{build_envelope, unlock, DocumentAppState, UnlockedDocument};
use crate::error::{CloudError, CloudResult, IdentityError};
use crate::local_store::LocalStore;
use crate::shape::validate_shape;
use crate::sync_engine::TimerSlot;
use crate::transport::DocumentTransport;
use crate::trust_cache::TrustCache;
use crate::types::{EncryptionMethod, FileSelection, Identity, Notification, Password};
use ozy_types::SubAppsState;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// ── Fields and updates ──

/// The user-supplied parts of a session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionFields {
    pub identity: Option<Identity>,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    pub password: Option<Password>,
    pub encryption_method: Option<EncryptionMethod>,
}

impl SessionFields {
    /// Shallow merge: every field present in `update` wins.
    pub fn merged(&self, update: SessionUpdate) -> SessionFields {
        SessionFields {
            identity: update.identity.or_else(|| self.identity.clone()),
            file_id: update.file_id.or_else(|| self.file_id.clone()),
            file_name: update.file_name.or_else(|| self.file_name.clone()),
            password: update.password.or_else(|| self.password.clone()),
            encryption_method: update.encryption_method.or(self.encryption_method),
        }
    }

    /// True when any field that decides what gets unlocked differs.
    pub fn unlock_key_differs(&self, other: &SessionFields) -> bool {
        self.identity.as_ref().map(|i| &i.token) != other.identity.as_ref().map(|i| &i.token)
            || self.file_id != other.file_id
            || self.file_name != other.file_name
            || self.password != other.password
    }

    fn has_file(&self) -> bool {
        self.identity.is_some() && self.file_id.is_some() && self.file_name.is_some()
    }

    fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.user_id.as_str())
    }
}

/// A partial update to the session fields.
#[derive(Clone, Debug, Default)]
pub struct SessionUpdate {
    pub identity: Option<Identity>,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    pub password: Option<Password>,
    pub encryption_method: Option<EncryptionMethod>,
}

impl SessionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn file(mut self, file_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self.file_name = Some(file_name.into());
        self
    }

    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn encryption_method(mut self, method: EncryptionMethod) -> Self {
        self.encryption_method = Some(method);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionPhase {
    SignedOut,
    Authenticated,
    FileSelected,
    Unlocked,
}

// ── State ──

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InFlightKind {
    SignIn,
    Refresh,
    Save,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct InFlight {
    pub(crate) tag: u64,
    pub(crate) kind: InFlightKind,
}

/// Everything the session knows, guarded by one lock.
#[derive(Debug)]
pub struct SessionState {
    pub(crate) fields: SessionFields,
    pub(crate) app_state: Option<SubAppsState>,
    pub(crate) last_revision: Option<String>,
    pub(crate) trust_cache: TrustCache,
    pub(crate) notifications: Vec<Notification>,
    pub(crate) debounce: SaveDebounce,
    pub(crate) dirty: bool,
    pub(crate) latest_tag: u64,
    pub(crate) in_flight: Option<InFlight>,
    /// Last remote revision reported as unreadable, to notify once.
    pub(crate) unreadable_revision: Option<String>,
}

impl SessionState {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            fields: SessionFields::default(),
            app_state: None,
            last_revision: None,
            trust_cache: TrustCache::new(config.trust_cache_policy),
            notifications: Vec::new(),
            debounce: SaveDebounce::new(config.save_grace()),
            dirty: false,
            latest_tag: 0,
            in_flight: None,
            unreadable_revision: None,
        }
    }

    pub fn fields(&self) -> &SessionFields {
        &self.fields
    }

    pub fn trust_cache(&self) -> &TrustCache {
        &self.trust_cache
    }

    pub fn is_unlocked(&self) -> bool {
        self.app_state.is_some()
    }

    /// The most complete phase whose fields are all present.
    pub fn phase(&self) -> SessionPhase {
        if self.is_unlocked() {
            SessionPhase::Unlocked
        } else if self.fields.has_file() {
            SessionPhase::FileSelected
        } else if self.fields.identity.is_some() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::SignedOut
        }
    }

    /// Starts a new in-flight operation, superseding any previous one.
    pub(crate) fn issue_tag(&mut self, kind: InFlightKind) -> u64 {
        self.latest_tag += 1;
        self.in_flight = Some(InFlight {
            tag: self.latest_tag,
            kind,
        });
        self.latest_tag
    }

    /// Ends the operation holding `tag`. False if it was superseded.
    pub(crate) fn finish(&mut self, tag: u64) -> bool {
        if self.latest_tag != tag {
            return false;
        }
        self.in_flight = None;
        true
    }

    /// True while `file_id` is open at `revision`.
    pub(crate) fn holds(&self, file_id: &str, revision: &str) -> bool {
        self.is_unlocked()
            && self.fields.file_id.as_deref() == Some(file_id)
            && self.last_revision.as_deref() == Some(revision)
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    fn commit_unlocked(&mut self, mut fields: SessionFields, doc: UnlockedDocument, password: Password) {
        self.trust_cache.record(doc.revision.clone(), password.clone());
        fields.password = Some(password);
        self.fields = fields;
        self.app_state = Some(doc.app_state);
        self.last_revision = Some(doc.revision);
        self.dirty = false;
        self.debounce.reset();
        self.unreadable_revision = None;
    }

    fn lock_document(&mut self) {
        self.app_state = None;
        self.last_revision = None;
        self.dirty = false;
        self.debounce.reset();
        self.unreadable_revision = None;
    }

    fn reset(&mut self) {
        self.latest_tag += 1;
        self.in_flight = None;
        self.fields = SessionFields::default();
        self.lock_document();
        self.notifications.clear();
        self.trust_cache.on_sign_out();
    }
}

// ── Planning ──

/// What a sign-in has to do.
#[derive(Clone, Debug, PartialEq)]
pub enum SignInPlan {
    /// Commit the merged fields; no network.
    Store,
    /// Fetch the document and open it with the given password.
    Unlock {
        file_id: String,
        identity: Identity,
        password: Password,
    },
    /// Fetch the document and open it if the trust cache knows its revision.
    ResolveCached { file_id: String, identity: Identity },
}

/// Merges `update` into the current fields and decides the next step.
pub fn plan_sign_in(state: &SessionState, update: SessionUpdate) -> (SessionFields, SignInPlan) {
    let merged = state.fields.merged(update);
    if !merged.unlock_key_differs(&state.fields) {
        return (merged, SignInPlan::Store);
    }

    let plan = match (&merged.identity, &merged.file_id, &merged.file_name, &merged.password) {
        (Some(identity), Some(file_id), Some(_), Some(password)) => SignInPlan::Unlock {
            file_id: file_id.clone(),
            identity: identity.clone(),
            password: password.clone(),
        },
        (Some(identity), Some(file_id), Some(_), None)
            if !state.trust_cache.is_empty()
                && !(state.is_unlocked() && state.fields.file_id.as_ref() == Some(file_id)) =>
        {
            SignInPlan::ResolveCached {
                file_id: file_id.clone(),
                identity: identity.clone(),
            }
        }
        _ => SignInPlan::Store,
    };
    (merged, plan)
}

// ── Session ──

#[derive(Clone, Debug, PartialEq)]
pub enum SignInOutcome {
    /// Fields stored; nothing was fetched.
    Stored(SessionPhase),
    Unlocked { revision: String },
    /// The document was fetched but no remembered password opens it.
    PasswordRequired,
}

/// A secret-free view of the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub user_id: Option<String>,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    pub revision: Option<String>,
    pub dirty: bool,
}

/// Shared handle to one user session.
#[derive(Clone)]
pub struct Session {
    pub(crate) state: Arc<Mutex<SessionState>>,
    pub(crate) transport: Arc<dyn DocumentTransport>,
    pub(crate) store: Arc<dyn LocalStore>,
    pub(crate) credentials: Arc<CredentialManager>,
    pub(crate) config: Arc<SyncConfig>,
    pub(crate) timer: TimerSlot,
}

impl Session {
    pub fn new(
        config: SyncConfig,
        transport: Arc<dyn DocumentTransport>,
        store: Arc<dyn LocalStore>,
        credentials: Arc<CredentialManager>,
    ) -> CloudResult<Self> {
        config.validate()?;
        Ok(Self {
            state: Arc::new(Mutex::new(SessionState::new(&config))),
            transport,
            store,
            credentials,
            config: Arc::new(config),
            timer: TimerSlot::default(),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Merges `update` into the session and unlocks the document when the
    /// merge forms a new unlock candidate.
    ///
    /// A failed fetch or unlock returns the error and commits nothing.
    pub async fn sign_in(&self, update: SessionUpdate) -> CloudResult<SignInOutcome> {
        let (merged, plan, tag) = {
            let mut state = self.state.lock().await;
            let (merged, plan) = plan_sign_in(&state, update);
            if plan == SignInPlan::Store {
                state.fields = merged.clone();
                let phase = state.phase();
                drop(state);
                debug!("sign-in stored fields, phase {phase:?}");
                self.remember(&merged);
                return Ok(SignInOutcome::Stored(phase));
            }
            let tag = state.issue_tag(InFlightKind::SignIn);
            (merged, plan, tag)
        };

        match plan {
            SignInPlan::Unlock {
                file_id,
                identity,
                password,
            } => {
                let opened = match self.fetch_document(&file_id, &identity).await {
                    Ok(doc) => unlock(&doc, password.expose()).map_err(CloudError::from),
                    Err(e) => Err(e),
                };

                let mut state = self.state.lock().await;
                if !state.finish(tag) {
                    debug!("sign-in {tag} superseded, dropping response");
                    return Err(CloudError::Superseded);
                }
                match opened {
                    Ok(doc) => {
                        let revision = doc.revision.clone();
                        state.commit_unlocked(merged.clone(), doc, password);
                        drop(state);
                        info!("unlocked file {file_id} at revision {revision}");
                        self.remember(&merged);
                        Ok(SignInOutcome::Unlocked { revision })
                    }
                    // Stored fields stay as they were; the attempted
                    // password lived only in the merge.
                    Err(e) => {
                        warn!("unlocking file {file_id} failed: {e}");
                        Err(e)
                    }
                }
            }
            SignInPlan::ResolveCached { file_id, identity } => {
                let fetched = self.fetch_document(&file_id, &identity).await;
                let remembered = match &fetched {
                    Ok(doc) => self.state.lock().await.trust_cache.get(&doc.revision).cloned(),
                    Err(_) => None,
                };
                let opened = match (&fetched, remembered) {
                    (Ok(doc), Some(password)) => unlock(doc, password.expose())
                        .ok()
                        .map(|unlocked| (unlocked, password)),
                    _ => None,
                };

                let mut state = self.state.lock().await;
                if !state.finish(tag) {
                    debug!("sign-in {tag} superseded, dropping response");
                    return Err(CloudError::Superseded);
                }
                match (fetched, opened) {
                    (_, Some((doc, password))) => {
                        let revision = doc.revision.clone();
                        state.commit_unlocked(merged.clone(), doc, password);
                        drop(state);
                        info!("unlocked file {file_id} with remembered password");
                        self.remember(&merged);
                        Ok(SignInOutcome::Unlocked { revision })
                    }
                    (Ok(_), None) => {
                        state.fields = merged.clone();
                        drop(state);
                        debug!("no remembered password for file {file_id}");
                        self.remember(&merged);
                        Ok(SignInOutcome::PasswordRequired)
                    }
                    (Err(e), None) => {
                        warn!("fetching file {file_id} failed: {e}");
                        Err(e)
                    }
                }
            }
            SignInPlan::Store => Ok(SignInOutcome::Stored(self.phase().await)),
        }
    }

    /// Resolves a bearer token and signs in with the resulting identity.
    pub async fn authenticate(&self, bearer_token: &str) -> CloudResult<SignInOutcome> {
        let identity = self.credentials.resolve(bearer_token).await?;
        self.sign_in(SessionUpdate::new().identity(identity)).await
    }

    /// Signs in from the identity and file selection remembered for `user_id`.
    pub async fn restore(&self, user_id: &str) -> CloudResult<SignInOutcome> {
        let identity = self
            .store
            .load_identity(user_id)?
            .ok_or(IdentityError::Missing)?;
        self.credentials.adopt(identity.clone()).await?;

        let mut update = SessionUpdate::new().identity(identity);
        if let Some(selection) = self.store.load_file_selection(user_id)? {
            update = update.file(selection.file_id, selection.file_name);
        }
        debug!("restoring session for user {user_id}");
        self.sign_in(update).await
    }

    /// Creates a remote file holding a blank state encrypted with the session
    /// password, then selects and unlocks it.
    pub async fn create_file(&self, name: &str) -> CloudResult<FileSelection> {
        let (identity, password) = {
            let state = self.state.lock().await;
            let identity = state.fields.identity.clone().ok_or(IdentityError::Missing)?;
            let password = state.fields.password.clone().ok_or(CloudError::BadPassword)?;
            (identity, password)
        };
        self.credentials.check(&identity)?;

        let doc = build_envelope(
            &SubAppsState::blank(),
            password.expose(),
            &self.config.kdf_params(),
        )?;
        let file_id = self
            .transport
            .create_file(name, &identity.token, &doc.to_json()?)
            .await?;
        info!("created file {file_id}");

        self.state
            .lock()
            .await
            .trust_cache
            .record(doc.revision, password);
        self.sign_in(SessionUpdate::new().file(file_id.clone(), name))
            .await?;
        Ok(FileSelection {
            file_id,
            file_name: name.to_string(),
        })
    }

    /// Clears the session and stops the scheduler timer.
    ///
    /// Any in-flight response is discarded. The trust cache follows its
    /// retention policy.
    pub async fn sign_out(&self) -> CloudResult<()> {
        self.timer.stop();
        let user_id = {
            let mut state = self.state.lock().await;
            let user_id = state.fields.user_id().map(str::to_string);
            state.reset();
            user_id
        };
        if let Some(user_id) = &user_id {
            self.credentials.clear(Some(user_id)).await;
            self.store.clear(Some(user_id))?;
        }
        info!("signed out");
        Ok(())
    }

    /// Mutates the unlocked state and schedules a save.
    pub async fn update_app_state<R>(
        &self,
        f: impl FnOnce(&mut SubAppsState) -> R,
    ) -> CloudResult<R> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let app_state = state.app_state.as_mut().ok_or(CloudError::NotUnlocked)?;
        let out = f(app_state);
        state.dirty = true;
        state.debounce.record_mutation(Instant::now());
        Ok(out)
    }

    pub async fn app_state(&self) -> Option<SubAppsState> {
        self.state.lock().await.app_state.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase()
    }

    pub async fn is_unlocked(&self) -> bool {
        self.state.lock().await.is_unlocked()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            phase: state.phase(),
            user_id: state.fields.user_id().map(str::to_string),
            file_id: state.fields.file_id.clone(),
            file_name: state.fields.file_name.clone(),
            revision: state.last_revision.clone(),
            dirty: state.dirty,
        }
    }

    /// Drains pending notifications.
    pub async fn take_notifications(&self) -> Vec<Notification> {
        std::mem::take(&mut self.state.lock().await.notifications)
    }

    /// Fetches and validates the remote document.
    pub(crate) async fn fetch_document(
        &self,
        file_id: &str,
        identity: &Identity,
    ) -> CloudResult<DocumentAppState> {
        self.credentials.check(identity)?;
        let remote = self
            .transport
            .fetch_contents(file_id, &identity.token)
            .await?;
        Ok(validate_shape(&remote.text)?)
    }

    /// Writes identity and file selection to the local store.
    fn remember(&self, fields: &SessionFields) {
        let Some(identity) = &fields.identity else {
            return;
        };
        if let Err(e) = self.store.save_identity(identity) {
            warn!("saving identity for user {} failed: {e}", identity.user_id);
        }
        if let (Some(file_id), Some(file_name)) = (&fields.file_id, &fields.file_name) {
            let selection = FileSelection {
                file_id: file_id.clone(),
                file_name: file_name.clone(),
            };
            if let Err(e) = self.store.save_file_selection(&identity.user_id, &selection) {
                warn!("saving file selection for user {} failed: {e}", identity.user_id);
            }
        }
    }
}
