//! Refresh/save scheduler.
//!
//! One recurring timer drives the session. Each tick:
//!
//! 1. does nothing while another sign-in, refresh or save is in flight, while
//!    the session is locked, or while the save debounce window is open;
//! 2. fetches the remote document under a fresh in-flight tag;
//! 3. if the remote is still at the last known revision, local state is
//!    dirty and no edit reopened the debounce window meanwhile, pushes a new
//!    envelope (save-after-refresh);
//! 4. if the remote moved, never pushes; the [`ConflictHook`] decides whether
//!    the remote state replaces the local one.
//!
//! The scheduler owns all timing. The session owns all state.

use crate::document::{build_envelope, unlock, DocumentAppState, UnlockedDocument};
use crate::error::CloudResult;
use crate::session::{InFlightKind, Session};
use crate::types::{Identity, Notification, Password};
use ozy_types::SubAppsState;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// How a changed remote is reconciled with local state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Replace local state with the remote one.
    RemoteWins,
    /// Keep local state, adopt the remote revision as the base and leave the
    /// state dirty so the next save overwrites the remote.
    KeepLocal,
}

/// Decides what happens when another writer changed the document.
pub trait ConflictHook: Send + Sync {
    fn resolve(&self, local: &SubAppsState, remote: &SubAppsState, local_dirty: bool)
        -> ConflictResolution;
}

/// Last refresh wins: remote state always replaces local state.
#[derive(Clone, Copy, Debug, Default)]
pub struct RemoteWins;

impl ConflictHook for RemoteWins {
    fn resolve(&self, _: &SubAppsState, _: &SubAppsState, _: bool) -> ConflictResolution {
        ConflictResolution::RemoteWins
    }
}

/// What one tick did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session not unlocked.
    Idle,
    /// Inside the save grace period.
    Debounced,
    /// Another operation is in flight.
    Busy,
    /// Remote unchanged and nothing to save.
    Refreshed,
    Saved { revision: String },
    /// Remote changed; local state replaced.
    ExternalChange { revision: String },
    /// Remote changed; local state kept by the conflict hook.
    KeptLocal { revision: String },
    /// Remote changed and no known password opens it.
    Unreadable { revision: String },
    /// The response arrived after a newer operation started.
    Discarded,
    Failed { detail: String },
}

/// Handle to the spawned timer task, shared with the session so sign-out can
/// stop it.
#[derive(Clone, Debug, Default)]
pub(crate) struct TimerSlot(Arc<Mutex<Option<JoinHandle<()>>>>);

impl TimerSlot {
    fn replace_if_idle(&self, spawn: impl FnOnce() -> JoinHandle<()>) -> bool {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        *slot = Some(spawn());
        true
    }

    pub(crate) fn stop(&self) {
        let handle = self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("sync timer stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

/// Drives refreshes and saves for one session.
pub struct SyncScheduler {
    ticker: Arc<Ticker>,
    timer: TimerSlot,
}

struct Ticker {
    session: Session,
    hook: Arc<dyn ConflictHook>,
}

impl SyncScheduler {
    pub fn new(session: &Session) -> Self {
        Self::with_hook(session, Arc::new(RemoteWins))
    }

    pub fn with_hook(session: &Session, hook: Arc<dyn ConflictHook>) -> Self {
        Self {
            ticker: Arc::new(Ticker {
                session: session.clone(),
                hook,
            }),
            timer: session.timer.clone(),
        }
    }

    /// Spawns the timer task. No-op if it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let period = self.ticker.session.config.tick_interval();
        let ticker = Arc::clone(&self.ticker);
        let started = self.timer.replace_if_idle(|| {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // Skip first immediate tick
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let outcome = ticker.tick().await;
                    debug!("sync tick: {outcome:?}");
                }
            })
        });
        if started {
            info!("sync timer started, period {period:?}");
        }
    }

    /// Stops the timer task. Idempotent.
    pub fn stop(&self) {
        self.timer.stop();
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Runs one tick now, independent of the timer.
    pub async fn tick(&self) -> TickOutcome {
        self.ticker.tick().await
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Ticker {
    async fn tick(&self) -> TickOutcome {
        let session = &self.session;
        let (tag, file_id, identity) = {
            let mut state = session.state.lock().await;
            if state.in_flight.is_some() {
                return TickOutcome::Busy;
            }
            if !state.is_unlocked() {
                return TickOutcome::Idle;
            }
            if state.debounce.is_pending(Instant::now()) {
                return TickOutcome::Debounced;
            }
            let (Some(file_id), Some(identity)) =
                (state.fields.file_id.clone(), state.fields.identity.clone())
            else {
                return TickOutcome::Idle;
            };
            (state.issue_tag(InFlightKind::Refresh), file_id, identity)
        };

        let fetched = session.fetch_document(&file_id, &identity).await;

        let mut state = session.state.lock().await;
        if state.latest_tag != tag {
            debug!("refresh {tag} superseded, dropping response");
            return TickOutcome::Discarded;
        }
        let doc = match fetched {
            Ok(doc) => doc,
            Err(e) => {
                state.finish(tag);
                warn!("refresh of file {file_id} failed: {e}");
                return TickOutcome::Failed {
                    detail: e.to_string(),
                };
            }
        };

        if state.last_revision.as_deref() == Some(doc.revision.as_str()) {
            if !state.dirty {
                state.finish(tag);
                return TickOutcome::Refreshed;
            }
            let (Some(app_state), Some(password)) =
                (state.app_state.clone(), state.fields.password.clone())
            else {
                state.finish(tag);
                return TickOutcome::Idle;
            };
            // An edit may have landed while the refresh was in flight.
            if state.debounce.is_pending(Instant::now()) {
                state.finish(tag);
                return TickOutcome::Debounced;
            }
            let save_tag = state.issue_tag(InFlightKind::Save);
            state.dirty = false;
            drop(state);
            return self
                .save(save_tag, &file_id, &identity, &app_state, password, &doc.revision)
                .await;
        }

        // Remote moved: try the password remembered for that revision, then
        // the session password.
        let candidates: Vec<Password> = [
            state.trust_cache.get(&doc.revision).cloned(),
            state.fields.password.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();
        let opened = candidates.into_iter().find_map(|password| {
            unlock(&doc, password.expose())
                .ok()
                .map(|unlocked| (unlocked, password))
        });
        state.finish(tag);

        let Some((UnlockedDocument { revision, app_state: remote }, password)) = opened else {
            if state.unreadable_revision.as_deref() != Some(doc.revision.as_str()) {
                state.unreadable_revision = Some(doc.revision.clone());
                state.notify(Notification::RemoteUnreadable {
                    revision: doc.revision.clone(),
                });
            }
            warn!("remote revision {} of file {file_id} is unreadable", doc.revision);
            return TickOutcome::Unreadable {
                revision: doc.revision,
            };
        };

        state.trust_cache.record(revision.clone(), password.clone());
        state.fields.password = Some(password);
        state.unreadable_revision = None;
        state.last_revision = Some(revision.clone());

        let Some(local) = state.app_state.as_ref() else {
            return TickOutcome::Idle;
        };
        match self.hook.resolve(local, &remote, state.dirty) {
            ConflictResolution::RemoteWins => {
                state.app_state = Some(remote);
                state.dirty = false;
                state.debounce.reset();
                state.notify(Notification::ExternalChange {
                    revision: revision.clone(),
                });
                info!("file {file_id} changed remotely, now at revision {revision}");
                TickOutcome::ExternalChange { revision }
            }
            ConflictResolution::KeepLocal => {
                state.dirty = true;
                info!("file {file_id} changed remotely, keeping local state");
                TickOutcome::KeptLocal { revision }
            }
        }
    }

    async fn save(
        &self,
        tag: u64,
        file_id: &str,
        identity: &Identity,
        app_state: &SubAppsState,
        password: Password,
        base_revision: &str,
    ) -> TickOutcome {
        let session = &self.session;
        let pushed = self.push(file_id, identity, app_state, &password).await;

        let mut state = session.state.lock().await;
        if !state.finish(tag) {
            // Unsaved edits on a still-open document must go out next tick.
            if pushed.is_err() && state.holds(file_id, base_revision) {
                state.dirty = true;
            }
            debug!("save {tag} superseded, dropping response");
            return TickOutcome::Discarded;
        }
        match pushed {
            Ok(revision) => {
                state.last_revision = Some(revision.clone());
                state.trust_cache.record(revision.clone(), password);
                state.notify(Notification::Saved {
                    revision: revision.clone(),
                });
                info!("saved file {file_id} at revision {revision}");
                TickOutcome::Saved { revision }
            }
            Err(e) => {
                state.dirty = true;
                let detail = e.to_string();
                state.notify(Notification::SaveFailed {
                    detail: detail.clone(),
                });
                warn!("saving file {file_id} failed: {detail}");
                TickOutcome::Failed { detail }
            }
        }
    }

    async fn push(
        &self,
        file_id: &str,
        identity: &Identity,
        app_state: &SubAppsState,
        password: &Password,
    ) -> CloudResult<String> {
        let session = &self.session;
        let doc: DocumentAppState =
            build_envelope(app_state, password.expose(), &session.config.kdf_params())?;
        session
            .transport
            .push_contents(file_id, &identity.token, &doc.to_json()?)
            .await?;
        Ok(doc.revision)
    }
}
