//! Session state machine tests: sign-in planning, unlock, trust cache,
//! sign-out, restore and file creation.

mod support;

use ozy_cloud::{
    plan_sign_in, CloudError, CloudResult, CredentialManager, FileSelection, Identity,
    IdentityError, LocalStore, MemoryStore, Notification, Session, SessionPhase, SessionState,
    SessionUpdate, SignInOutcome, SignInPlan, SyncConfig, TrustCachePolicy,
};
use ozy_types::SubAppsState;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use support::*;

fn full_update() -> SessionUpdate {
    SessionUpdate::new()
        .identity(identity(USER, TOKEN))
        .file(FILE, FILE_NAME)
        .password(PASSWORD)
}

fn policy(policy: TrustCachePolicy) -> SyncConfig {
    SyncConfig {
        trust_cache_policy: policy,
        ..SyncConfig::default()
    }
}

// ── Planning ──

#[test]
fn identity_alone_plans_a_store() {
    let state = SessionState::new(&SyncConfig::default());
    let (merged, plan) = plan_sign_in(&state, SessionUpdate::new().identity(identity(USER, TOKEN)));
    assert_eq!(plan, SignInPlan::Store);
    assert_eq!(merged.identity.unwrap().user_id, USER);
    assert_eq!(merged.file_id, None);
}

#[test]
fn complete_candidate_plans_an_unlock() {
    let state = SessionState::new(&SyncConfig::default());
    let (_, plan) = plan_sign_in(&state, full_update());
    match plan {
        SignInPlan::Unlock {
            file_id, password, ..
        } => {
            assert_eq!(file_id, FILE);
            assert_eq!(password.expose(), PASSWORD);
        }
        other => panic!("expected unlock, got {other:?}"),
    }
}

#[test]
fn file_without_password_and_empty_cache_plans_a_store() {
    let state = SessionState::new(&SyncConfig::default());
    let (_, plan) = plan_sign_in(
        &state,
        SessionUpdate::new()
            .identity(identity(USER, TOKEN))
            .file(FILE, FILE_NAME),
    );
    assert_eq!(plan, SignInPlan::Store);
}

#[test]
fn update_values_win_the_merge() {
    let state = SessionState::new(&SyncConfig::default());
    let (merged, _) = plan_sign_in(&state, full_update().file("file-2", "Other"));
    assert_eq!(merged.file_id.as_deref(), Some("file-2"));
    assert_eq!(merged.file_name.as_deref(), Some("Other"));
}

// ── Sign-in ──

#[tokio::test]
async fn identity_only_sign_in_authenticates_without_fetching() {
    let h = harness();
    let outcome = h
        .session
        .sign_in(SessionUpdate::new().identity(identity(USER, TOKEN)))
        .await
        .unwrap();
    assert_eq!(outcome, SignInOutcome::Stored(SessionPhase::Authenticated));
    assert_eq!(h.transport.fetch_count(), 0);
    assert!(!h.session.is_unlocked().await);
}

#[tokio::test]
async fn full_sign_in_unlocks_the_document() {
    let h = harness();
    let state = edited_state(24);
    let revision = seed(&h.transport, FILE, &state, PASSWORD);

    let outcome = h.session.sign_in(full_update()).await.unwrap();
    assert_eq!(
        outcome,
        SignInOutcome::Unlocked {
            revision: revision.clone()
        }
    );
    assert_eq!(h.session.app_state().await, Some(state));

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.phase, SessionPhase::Unlocked);
    assert_eq!(snapshot.revision, Some(revision));
    assert_eq!(snapshot.user_id.as_deref(), Some(USER));
    assert!(!snapshot.dirty);
}

#[tokio::test]
async fn stepwise_sign_in_unlocks_on_the_last_step() {
    let h = harness();
    seed(&h.transport, FILE, &SubAppsState::blank(), PASSWORD);

    let s = &h.session;
    s.sign_in(SessionUpdate::new().identity(identity(USER, TOKEN))).await.unwrap();
    let outcome = s.sign_in(SessionUpdate::new().file(FILE, FILE_NAME)).await.unwrap();
    assert_eq!(outcome, SignInOutcome::Stored(SessionPhase::FileSelected));
    assert_eq!(h.transport.fetch_count(), 0);

    let outcome = s.sign_in(SessionUpdate::new().password(PASSWORD)).await.unwrap();
    assert!(matches!(outcome, SignInOutcome::Unlocked { .. }));
    assert_eq!(h.transport.fetch_count(), 1);
}

#[tokio::test]
async fn repeating_an_unchanged_sign_in_does_not_refetch() {
    let h = harness();
    seed(&h.transport, FILE, &SubAppsState::blank(), PASSWORD);
    h.session.sign_in(full_update()).await.unwrap();

    let outcome = h.session.sign_in(full_update()).await.unwrap();
    assert_eq!(outcome, SignInOutcome::Stored(SessionPhase::Unlocked));
    assert_eq!(h.transport.fetch_count(), 1);
}

#[tokio::test]
async fn wrong_password_commits_nothing() {
    let h = harness();
    seed(&h.transport, FILE, &SubAppsState::blank(), PASSWORD);

    let err = h
        .session
        .sign_in(full_update().password("battery-staple"))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::BadPassword));
    assert!(err.needs_password());

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.phase, SessionPhase::SignedOut);
    assert_eq!(snapshot.user_id, None);
    assert_eq!(snapshot.file_id, None);
    assert_eq!(h.store.load_file_selection(USER).unwrap(), None);

    let outcome = h.session.sign_in(full_update()).await.unwrap();
    assert!(matches!(outcome, SignInOutcome::Unlocked { .. }));
}

#[tokio::test]
async fn wrong_password_leaves_the_selected_file_locked() {
    let h = harness();
    seed(&h.transport, FILE, &SubAppsState::blank(), PASSWORD);
    h.session
        .sign_in(
            SessionUpdate::new()
                .identity(identity(USER, TOKEN))
                .file(FILE, FILE_NAME),
        )
        .await
        .unwrap();

    let err = h
        .session
        .sign_in(SessionUpdate::new().password("battery-staple"))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::BadPassword));
    assert_eq!(h.session.phase().await, SessionPhase::FileSelected);

    // The rejected password was not kept, so the right one is a new candidate.
    let outcome = h
        .session
        .sign_in(SessionUpdate::new().password(PASSWORD))
        .await
        .unwrap();
    assert!(matches!(outcome, SignInOutcome::Unlocked { .. }));
}

#[tokio::test]
async fn failed_switch_keeps_the_open_file() {
    let h = harness();
    let state = edited_state(30);
    seed(&h.transport, FILE, &state, PASSWORD);
    h.session.sign_in(full_update()).await.unwrap();

    let err = h
        .session
        .sign_in(SessionUpdate::new().file("file-2", "Other"))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::NoSuchFile(_)));

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.phase, SessionPhase::Unlocked);
    assert_eq!(snapshot.file_id.as_deref(), Some(FILE));
    assert_eq!(h.session.app_state().await, Some(state));
}

#[tokio::test]
async fn wrong_password_on_the_open_file_keeps_it_open() {
    let h = harness();
    let state = edited_state(30);
    seed(&h.transport, FILE, &state, PASSWORD);
    h.session.sign_in(full_update()).await.unwrap();

    let err = h
        .session
        .sign_in(SessionUpdate::new().password("battery-staple"))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::BadPassword));
    assert!(h.session.is_unlocked().await);
    assert_eq!(h.session.app_state().await, Some(state));
}

#[tokio::test]
async fn missing_file_is_reported() {
    let h = harness();
    let err = h.session.sign_in(full_update()).await.unwrap_err();
    assert!(matches!(err, CloudError::NoSuchFile(ref id) if id == FILE));
    assert!(!err.is_recoverable());
    assert!(!h.session.is_unlocked().await);
}

#[tokio::test]
async fn malformed_document_is_reported() {
    let h = harness();
    h.transport.insert(FILE, r#"{"salt":"nope"}"#);
    let err = h.session.sign_in(full_update()).await.unwrap_err();
    match err {
        CloudError::BadDocumentFormat(shape) => {
            assert_eq!(shape.fields(), vec!["salt", "revision", "encrypted"]);
        }
        other => panic!("expected bad format, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_identity_is_rejected_before_fetching() {
    let h = harness();
    seed(&h.transport, FILE, &SubAppsState::blank(), PASSWORD);
    let err = h
        .session
        .sign_in(full_update().identity(expiring_identity(USER, TOKEN, 30)))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::Identity(IdentityError::Expired)));
    assert_eq!(h.transport.fetch_count(), 0);
}

#[tokio::test]
async fn authenticate_resolves_the_bearer_token() {
    let h = harness();
    let outcome = h.session.authenticate(TOKEN).await.unwrap();
    assert_eq!(outcome, SignInOutcome::Stored(SessionPhase::Authenticated));

    let err = h.session.authenticate("forged").await.unwrap_err();
    assert!(matches!(err, CloudError::Identity(IdentityError::Invalid(_))));
}

// ── Trust cache ──

#[tokio::test]
async fn remembered_password_skips_the_prompt_after_sign_out() {
    let h = harness();
    let state = edited_state(28);
    let revision = seed(&h.transport, FILE, &state, PASSWORD);
    h.session.sign_in(full_update()).await.unwrap();
    h.session.sign_out().await.unwrap();

    h.session
        .sign_in(SessionUpdate::new().identity(identity(USER, TOKEN)))
        .await
        .unwrap();
    let outcome = h
        .session
        .sign_in(SessionUpdate::new().file(FILE, FILE_NAME))
        .await
        .unwrap();
    assert_eq!(outcome, SignInOutcome::Unlocked { revision });
    assert_eq!(h.session.app_state().await, Some(state));
}

#[tokio::test]
async fn remote_change_makes_the_remembered_password_useless() {
    let h = harness();
    seed(&h.transport, FILE, &SubAppsState::blank(), PASSWORD);
    h.session.sign_in(full_update()).await.unwrap();
    h.session.sign_out().await.unwrap();

    // Another device saved a new revision meanwhile.
    seed(&h.transport, FILE, &edited_state(12), PASSWORD);

    let outcome = h
        .session
        .sign_in(
            SessionUpdate::new()
                .identity(identity(USER, TOKEN))
                .file(FILE, FILE_NAME),
        )
        .await
        .unwrap();
    assert_eq!(outcome, SignInOutcome::PasswordRequired);
    assert_eq!(h.session.phase().await, SessionPhase::FileSelected);
}

#[tokio::test]
async fn clear_on_sign_out_forgets_passwords() {
    let h = harness_with(policy(TrustCachePolicy::ClearOnSignOut));
    seed(&h.transport, FILE, &SubAppsState::blank(), PASSWORD);
    h.session.sign_in(full_update()).await.unwrap();
    h.session.sign_out().await.unwrap();

    let outcome = h
        .session
        .sign_in(
            SessionUpdate::new()
                .identity(identity(USER, TOKEN))
                .file(FILE, FILE_NAME),
        )
        .await
        .unwrap();
    assert_eq!(outcome, SignInOutcome::Stored(SessionPhase::FileSelected));
    assert_eq!(h.transport.fetch_count(), 1);
}

#[tokio::test]
async fn disabled_cache_never_resolves() {
    let h = harness_with(policy(TrustCachePolicy::Disabled));
    seed(&h.transport, FILE, &SubAppsState::blank(), PASSWORD);
    h.session.sign_in(full_update()).await.unwrap();
    h.session.sign_out().await.unwrap();

    let outcome = h
        .session
        .sign_in(
            SessionUpdate::new()
                .identity(identity(USER, TOKEN))
                .file(FILE, FILE_NAME),
        )
        .await
        .unwrap();
    assert_eq!(outcome, SignInOutcome::Stored(SessionPhase::FileSelected));
}

// ── Sign-out ──

#[tokio::test]
async fn sign_out_resets_everything() {
    let h = harness();
    seed(&h.transport, FILE, &SubAppsState::blank(), PASSWORD);
    h.session.sign_in(full_update()).await.unwrap();
    h.session.update_app_state(|_| ()).await.unwrap();

    h.session.sign_out().await.unwrap();

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.phase, SessionPhase::SignedOut);
    assert_eq!(snapshot.file_id, None);
    assert_eq!(snapshot.revision, None);
    assert!(!snapshot.dirty);
    assert_eq!(h.session.app_state().await, None);
    assert!(h.session.take_notifications().await.is_empty());
    assert_eq!(h.store.load_identity(USER).unwrap(), None);
    assert_eq!(h.store.load_file_selection(USER).unwrap(), None);
}

/// Delegates to a memory store but refuses to clear.
struct StuckStore(MemoryStore);

impl LocalStore for StuckStore {
    fn load_identity(&self, user_id: &str) -> CloudResult<Option<Identity>> {
        self.0.load_identity(user_id)
    }

    fn save_identity(&self, identity: &Identity) -> CloudResult<()> {
        self.0.save_identity(identity)
    }

    fn load_file_selection(&self, user_id: &str) -> CloudResult<Option<FileSelection>> {
        self.0.load_file_selection(user_id)
    }

    fn save_file_selection(&self, user_id: &str, selection: &FileSelection) -> CloudResult<()> {
        self.0.save_file_selection(user_id, selection)
    }

    fn clear(&self, _: Option<&str>) -> CloudResult<()> {
        Err(CloudError::Storage("disk full".to_string()))
    }
}

#[tokio::test]
async fn failed_store_clear_still_forgets_cached_identities() {
    let provider = Arc::new(FakeIdentityProvider::with(identity(USER, TOKEN)));
    let credentials = Arc::new(CredentialManager::from_config(
        provider,
        &SyncConfig::default(),
    ));
    let session = Session::new(
        SyncConfig::default(),
        Arc::new(MemoryTransport::default()),
        Arc::new(StuckStore(MemoryStore::new())),
        credentials.clone(),
    )
    .unwrap();
    session.authenticate(TOKEN).await.unwrap();
    assert!(credentials.has_valid_identity(USER).await);

    let err = session.sign_out().await.unwrap_err();
    assert!(matches!(err, CloudError::Storage(_)));
    assert!(!credentials.has_valid_identity(USER).await);
    assert_eq!(session.phase().await, SessionPhase::SignedOut);
}

#[tokio::test]
async fn sign_out_supersedes_an_in_flight_sign_in() {
    let h = harness();
    seed(&h.transport, FILE, &SubAppsState::blank(), PASSWORD);
    let gate = h.transport.hold_next_fetch();

    let session = h.session.clone();
    let pending = tokio::spawn(async move { session.sign_in(full_update()).await });
    h.transport.wait_for_pending_fetch().await;

    h.session.sign_out().await.unwrap();
    gate.add_permits(1);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, CloudError::Superseded));
    assert_eq!(h.session.phase().await, SessionPhase::SignedOut);
}

// ── App state ──

#[tokio::test]
async fn editing_requires_an_unlocked_session() {
    let h = harness();
    let err = h.session.update_app_state(|_| ()).await.unwrap_err();
    assert!(matches!(err, CloudError::NotUnlocked));
}

#[tokio::test]
async fn editing_marks_the_session_dirty() {
    let h = harness();
    seed(&h.transport, FILE, &SubAppsState::blank(), PASSWORD);
    h.session.sign_in(full_update()).await.unwrap();

    let wake = h
        .session
        .update_app_state(|state| {
            let mut schedule = state.schedule().unwrap().unwrap();
            schedule.wake_up_at = 32;
            state.set_schedule(&schedule).unwrap();
            schedule.wake_up_at
        })
        .await
        .unwrap();
    assert_eq!(wake, 32);
    assert!(h.session.snapshot().await.dirty);
    assert_eq!(h.session.app_state().await, Some(edited_state(32)));
}

// ── Local store ──

#[tokio::test]
async fn unlock_remembers_identity_and_file() {
    let h = harness();
    seed(&h.transport, FILE, &SubAppsState::blank(), PASSWORD);
    h.session.sign_in(full_update()).await.unwrap();

    assert_eq!(h.store.load_identity(USER).unwrap().unwrap().token, TOKEN);
    let selection = h.store.load_file_selection(USER).unwrap().unwrap();
    assert_eq!(selection.file_id, FILE);
    assert_eq!(selection.file_name, FILE_NAME);
}

#[tokio::test]
async fn restore_picks_up_the_remembered_file() {
    let h = harness();
    seed(&h.transport, FILE, &SubAppsState::blank(), PASSWORD);
    h.session.sign_in(full_update()).await.unwrap();

    let restarted = harness_sharing(SyncConfig::default(), h.transport.clone(), h.store.clone());
    let outcome = restarted.session.restore(USER).await.unwrap();
    assert_eq!(outcome, SignInOutcome::Stored(SessionPhase::FileSelected));

    let snapshot = restarted.session.snapshot().await;
    assert_eq!(snapshot.file_id.as_deref(), Some(FILE));
}

#[tokio::test]
async fn restore_without_identity_fails() {
    let h = harness();
    let err = h.session.restore(USER).await.unwrap_err();
    assert!(matches!(err, CloudError::Identity(IdentityError::Missing)));
}

// ── File creation ──

#[tokio::test]
async fn create_file_writes_and_unlocks_a_blank_document() {
    let h = harness();
    h.session
        .sign_in(
            SessionUpdate::new()
                .identity(identity(USER, TOKEN))
                .password(PASSWORD),
        )
        .await
        .unwrap();

    let selection = h.session.create_file("Budget").await.unwrap();
    assert_eq!(selection.file_name, "Budget");
    assert!(h.transport.text(&selection.file_id).is_some());
    assert!(h.session.is_unlocked().await);
    assert_eq!(h.session.app_state().await, Some(SubAppsState::blank()));
}

#[tokio::test]
async fn create_file_needs_a_password() {
    let h = harness();
    h.session
        .sign_in(SessionUpdate::new().identity(identity(USER, TOKEN)))
        .await
        .unwrap();
    let err = h.session.create_file("Budget").await.unwrap_err();
    assert!(err.needs_password());
}

#[tokio::test]
async fn notifications_start_empty() {
    let h = harness();
    let drained: Vec<Notification> = h.session.take_notifications().await;
    assert!(drained.is_empty());
}
