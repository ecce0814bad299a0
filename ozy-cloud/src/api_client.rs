//! HTTP client for the JSON document host.
//!
//! Implements [`DocumentTransport`] and [`IdentityProvider`] over reqwest.
//! Every request carries the caller's bearer credential.

use crate::config::SyncConfig;
use crate::error::{CloudError, CloudResult, IdentityError};
use crate::transport::{DocumentTransport, IdentityProvider};
use crate::types::{Identity, Profile, RemoteFile};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Seconds shaved off a reported token lifetime to absorb clock skew.
const EXPIRY_SKEW_SECS: i64 = 5;

/// HTTP client for the document host.
#[derive(Clone)]
pub struct DocsApiClient {
    client: Client,
    base_url: String,
    base: Url,
}

#[derive(Serialize)]
struct TextBody<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedDocument {
    document_id: String,
}

#[derive(Deserialize)]
struct TokenInfo {
    sub: String,
    expires_in: i64,
    #[serde(default)]
    scope: String,
    email: Option<String>,
    name: Option<String>,
}

impl DocsApiClient {
    pub fn new(config: &SyncConfig) -> CloudResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| CloudError::Config(format!("invalid api_base_url {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(CloudError::Config(format!(
                "api_base_url {base_url} cannot carry a path"
            )));
        }

        Ok(Self {
            client,
            base_url,
            base,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Appends path segments to the base URL. Each segment is
    /// percent-encoded, so an id cannot address another resource.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn document_url(&self, file_id: &str) -> Url {
        self.endpoint(&["v1", "documents", file_id])
    }

    /// Maps non-success statuses of document endpoints.
    fn check_document_status(resp: Response, file_id: &str) -> CloudResult<Response> {
        match resp.status() {
            StatusCode::NOT_FOUND => Err(CloudError::NoSuchFile(file_id.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::Invalid(
                format!("document host rejected credential ({})", resp.status()),
            )
            .into()),
            status if !status.is_success() => Err(CloudError::Transport(format!(
                "document host returned {status} for {file_id}"
            ))),
            _ => Ok(resp),
        }
    }
}

#[async_trait]
impl DocumentTransport for DocsApiClient {
    async fn fetch_contents(&self, file_id: &str, credential: &str) -> CloudResult<RemoteFile> {
        let resp = self
            .client
            .get(self.document_url(file_id))
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))?;

        let file = Self::check_document_status(resp, file_id)?.json().await?;
        debug!("fetched document {file_id}");
        Ok(file)
    }

    async fn push_contents(&self, file_id: &str, credential: &str, text: &str) -> CloudResult<()> {
        let resp = self
            .client
            .put(self.document_url(file_id))
            .bearer_auth(credential)
            .json(&TextBody { text })
            .send()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))?;

        Self::check_document_status(resp, file_id)?;
        debug!("pushed document {file_id}");
        Ok(())
    }

    async fn create_file(&self, name: &str, credential: &str, text: &str) -> CloudResult<String> {
        let resp = self
            .client
            .post(self.endpoint(&["v1", "documents"]))
            .query(&[("title", name)])
            .bearer_auth(credential)
            .json(&TextBody { text })
            .send()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))?;

        let created: CreatedDocument = Self::check_document_status(resp, name)?.json().await?;
        debug!("created document {}", created.document_id);
        Ok(created.document_id)
    }
}

#[async_trait]
impl IdentityProvider for DocsApiClient {
    async fn resolve_identity(&self, bearer_token: &str) -> CloudResult<Identity> {
        let resp = self
            .client
            .get(self.endpoint(&["v1", "tokeninfo"]))
            .bearer_auth(bearer_token)
            .send()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))?;

        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(IdentityError::Invalid(format!("token rejected ({})", resp.status())).into());
        }
        let info: TokenInfo = resp
            .error_for_status()
            .map_err(|e| CloudError::Transport(e.to_string()))?
            .json()
            .await?;

        let expiry = Duration::try_seconds(info.expires_in.saturating_sub(EXPIRY_SKEW_SECS))
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                IdentityError::Invalid(format!("token lifetime out of range: {}", info.expires_in))
            })?;

        Ok(Identity {
            user_id: info.sub,
            token: bearer_token.to_string(),
            expiry,
            granted_scopes: info.scope.split_whitespace().map(str::to_string).collect(),
            profile: Profile {
                email: info.email,
                name: info.name,
            },
        })
    }
}
