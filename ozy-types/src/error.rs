use thiserror::Error;

/// Result type for sub-application state conversions.
pub type StateResult<T> = Result<T, StateError>;

/// Errors converting between typed and opaque sub-application state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("{app} state is not a JSON object with a numeric version")]
    NotVersioned { app: String },

    #[error("{app} state has version {found}, expected {expected}")]
    VersionMismatch {
        app: String,
        expected: u32,
        found: u32,
    },

    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
