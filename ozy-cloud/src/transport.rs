//! Collaborator traits for the document host and the identity provider.

use crate::error::CloudResult;
use crate::types::{Identity, RemoteFile};
use async_trait::async_trait;

/// Reads and writes remote document text.
#[async_trait]
pub trait DocumentTransport: Send + Sync {
    /// Errors with `NoSuchFile` when the id is unknown, `Transport` otherwise.
    async fn fetch_contents(&self, file_id: &str, credential: &str) -> CloudResult<RemoteFile>;

    async fn push_contents(&self, file_id: &str, credential: &str, text: &str) -> CloudResult<()>;

    /// Creates a document and returns its id.
    async fn create_file(&self, name: &str, credential: &str, text: &str) -> CloudResult<String>;
}

/// Turns a bearer token into an [`Identity`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_identity(&self, bearer_token: &str) -> CloudResult<Identity>;
}
