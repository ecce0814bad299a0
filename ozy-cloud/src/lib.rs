//! Encrypted document sync engine for Ozy.
//!
//! Keeps one password-encrypted document in step with a remote host:
//! - Envelope codec with structural validation and salt-based integrity check
//! - Session state machine from sign-in to unlocked document
//! - Refresh/save scheduler with debounce and in-flight tags
//! - Per-revision trust cache so returning users can skip the password
//! - Bearer credential checks and a reqwest client for the document host

pub mod api_client;
pub mod config;
pub mod credential_manager;
pub mod debounce;
pub mod document;
pub mod error;
pub mod local_store;
pub mod session;
pub mod shape;
pub mod sync_engine;
pub mod transport;
pub mod trust_cache;
pub mod types;

pub use api_client::DocsApiClient;
pub use config::{SyncConfig, TrustCachePolicy};
pub use credential_manager::CredentialManager;
pub use document::{build_envelope, unlock, BadPassword, DocumentAppState, UnlockedDocument};
pub use error::{CloudError, CloudResult, IdentityError};
pub use local_store::{JsonFileStore, LocalStore, MemoryStore};
pub use session::{
    plan_sign_in, Session, SessionFields, SessionPhase, SessionSnapshot, SessionState,
    SessionUpdate, SignInOutcome, SignInPlan,
};
pub use shape::{validate_shape, FieldViolation, ShapeError};
pub use sync_engine::{ConflictHook, ConflictResolution, RemoteWins, SyncScheduler, TickOutcome};
pub use transport::{DocumentTransport, IdentityProvider};
pub use trust_cache::TrustCache;
pub use types::*;
