//! Shared test helpers: an in-memory document host, a fake identity
//! provider and a session harness.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use ozy_cloud::{
    build_envelope, CloudError, CloudResult, CredentialManager, DocumentTransport, Identity,
    IdentityError, IdentityProvider, MemoryStore, Profile, RemoteFile, Session, SyncConfig,
};
use ozy_crypto::KdfParams;
use ozy_types::SubAppsState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

pub const USER: &str = "user-1";
pub const TOKEN: &str = "token-1";
pub const FILE: &str = "file-1";
pub const FILE_NAME: &str = "Ozy";
pub const PASSWORD: &str = "correct-horse";

// ── Document host ──

/// Document host kept in memory. The next fetch can be held open to
/// simulate a slow network.
#[derive(Default)]
pub struct MemoryTransport {
    docs: Mutex<HashMap<String, RemoteFile>>,
    next_id: AtomicUsize,
    fetches: AtomicUsize,
    pushes: AtomicUsize,
    pending: AtomicUsize,
    hold: Mutex<Option<Arc<Semaphore>>>,
    pending_push: AtomicUsize,
    hold_push: Mutex<Option<Arc<Semaphore>>>,
    fail_pushes: AtomicBool,
}

impl MemoryTransport {
    pub fn insert(&self, file_id: &str, text: &str) {
        self.docs.lock().unwrap().insert(
            file_id.to_string(),
            RemoteFile {
                title: file_id.to_string(),
                text: text.to_string(),
            },
        );
    }

    pub fn text(&self, file_id: &str) -> Option<String> {
        self.docs.lock().unwrap().get(file_id).map(|f| f.text.clone())
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    pub fn pending_fetches(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Blocks the next fetch until a permit is added to the returned gate.
    pub fn hold_next_fetch(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.hold.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Blocks the next push until a permit is added to the returned gate.
    pub fn hold_next_push(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.hold_push.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn fail_pushes(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::SeqCst);
    }

    /// Waits until a held fetch has started.
    pub async fn wait_for_pending_fetch(&self) {
        while self.pending_fetches() == 0 {
            tokio::task::yield_now().await;
        }
    }

    /// Waits until a held push has started.
    pub async fn wait_for_pending_push(&self) {
        while self.pending_push.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl DocumentTransport for MemoryTransport {
    async fn fetch_contents(&self, file_id: &str, _credential: &str) -> CloudResult<RemoteFile> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let gate = self.hold.lock().unwrap().take();
        if let Some(gate) = gate {
            self.pending.fetch_add(1, Ordering::SeqCst);
            let _permit = gate.acquire().await.unwrap();
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        self.docs
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| CloudError::NoSuchFile(file_id.to_string()))
    }

    async fn push_contents(&self, file_id: &str, _credential: &str, text: &str) -> CloudResult<()> {
        let gate = self.hold_push.lock().unwrap().take();
        if let Some(gate) = gate {
            self.pending_push.fetch_add(1, Ordering::SeqCst);
            let _permit = gate.acquire().await.unwrap();
            self.pending_push.fetch_sub(1, Ordering::SeqCst);
        }
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(CloudError::Transport("push rejected".to_string()));
        }
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.insert(file_id, text);
        Ok(())
    }

    async fn create_file(&self, _name: &str, _credential: &str, text: &str) -> CloudResult<String> {
        let id = format!("created-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.insert(&id, text);
        Ok(id)
    }
}

// ── Identity ──

/// Resolves the tokens it was given and rejects everything else.
#[derive(Default)]
pub struct FakeIdentityProvider {
    identities: Mutex<HashMap<String, Identity>>,
}

impl FakeIdentityProvider {
    pub fn with(identity: Identity) -> Self {
        let provider = Self::default();
        provider.add(identity);
        provider
    }

    pub fn add(&self, identity: Identity) {
        self.identities
            .lock()
            .unwrap()
            .insert(identity.token.clone(), identity);
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn resolve_identity(&self, bearer_token: &str) -> CloudResult<Identity> {
        self.identities
            .lock()
            .unwrap()
            .get(bearer_token)
            .cloned()
            .ok_or_else(|| IdentityError::Invalid("unknown token".to_string()).into())
    }
}

/// A valid identity with both required scopes, expiring in an hour.
pub fn identity(user_id: &str, token: &str) -> Identity {
    expiring_identity(user_id, token, 3600)
}

pub fn expiring_identity(user_id: &str, token: &str, expires_in_secs: i64) -> Identity {
    Identity {
        user_id: user_id.to_string(),
        token: token.to_string(),
        expiry: Utc::now() + Duration::seconds(expires_in_secs),
        granted_scopes: vec!["documents".to_string(), "drive".to_string()],
        profile: Profile {
            email: Some(format!("{user_id}@example.com")),
            name: None,
        },
    }
}

// ── Harness ──

/// Routes engine logs to the test output. Set `RUST_LOG=ozy_cloud=debug`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub session: Session,
    pub transport: Arc<MemoryTransport>,
    pub store: Arc<MemoryStore>,
    pub provider: Arc<FakeIdentityProvider>,
}

pub fn harness() -> Harness {
    harness_with(SyncConfig::default())
}

pub fn harness_with(config: SyncConfig) -> Harness {
    init_tracing();
    let transport = Arc::new(MemoryTransport::default());
    let store = Arc::new(MemoryStore::new());
    harness_sharing(config, transport, store)
}

/// A second harness over an existing host and store, as after a restart.
pub fn harness_sharing(
    config: SyncConfig,
    transport: Arc<MemoryTransport>,
    store: Arc<MemoryStore>,
) -> Harness {
    let provider = Arc::new(FakeIdentityProvider::with(identity(USER, TOKEN)));
    let credentials = Arc::new(CredentialManager::from_config(provider.clone(), &config));
    let session = Session::new(config, transport.clone(), store.clone(), credentials).unwrap();
    Harness {
        session,
        transport,
        store,
        provider,
    }
}

/// Writes an envelope of `state` to the host and returns its revision.
pub fn seed(transport: &MemoryTransport, file_id: &str, state: &SubAppsState, password: &str) -> String {
    let doc = build_envelope(state, password, &KdfParams::legacy()).unwrap();
    transport.insert(file_id, &doc.to_json().unwrap());
    doc.revision
}

/// A blank state with a recognisable schedule tweak.
pub fn edited_state(wake_up_at: u32) -> SubAppsState {
    let mut state = SubAppsState::blank();
    let mut schedule = state.schedule().unwrap().unwrap();
    schedule.wake_up_at = wake_up_at;
    state.set_schedule(&schedule).unwrap();
    state
}
