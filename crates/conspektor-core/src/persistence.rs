//! Persistence fallback and gateway client
//!
//! Plain request/response access to the document store behind the API
//! gateway. The live session uses it to paint the stored snapshot before the
//! hub answers and to save the view periodically; the CLI uses the remaining
//! calls for document management.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::identity::{join, IdentityError};
use crate::view::ViewSnapshot;

/// Request timeout for gateway calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors talking to the gateway
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Invalid gateway URL: {0}")]
    Url(#[from] IdentityError),

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned HTTP {status}")]
    Status {
        method: Method,
        url: String,
        status: u16,
    },

    #[error("Unexpected response from {url}: {details}")]
    InvalidResponse { url: String, details: String },
}

impl PersistenceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistenceError::Status { status: 404, .. })
    }
}

/// Store for (title, content) snapshots
pub trait SnapshotStore: Send + Sync + 'static {
    fn load(
        &self,
        document_id: &str,
    ) -> impl Future<Output = Result<ViewSnapshot, PersistenceError>> + Send;

    fn save(
        &self,
        document_id: &str,
        snapshot: &ViewSnapshot,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// A document as listed by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub username: String,
}

/// Body of `GET /documents/{id}`; some backends wrap it in a list
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredDocumentBody {
    One(StoredDocument),
    Many(Vec<StoredDocument>),
}

#[derive(Deserialize)]
struct StoredDocument {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for the API gateway
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Result<Self, PersistenceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| PersistenceError::Request {
                url: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /documents/{id}`
    pub async fn fetch_document(&self, document_id: &str) -> Result<ViewSnapshot, PersistenceError> {
        let url = self.url(&format!("documents/{}", document_id))?;
        let body: StoredDocumentBody = self.request_json(Method::GET, url.clone(), None).await?;

        let stored = match body {
            StoredDocumentBody::One(doc) => doc,
            StoredDocumentBody::Many(docs) => {
                docs.into_iter()
                    .next()
                    .ok_or_else(|| PersistenceError::InvalidResponse {
                        url: url.to_string(),
                        details: "empty document list".to_string(),
                    })?
            }
        };

        let title = stored
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_title(document_id));
        Ok(ViewSnapshot {
            title,
            content: stored.content.unwrap_or_default(),
        })
    }

    /// `PUT /documents/{id}` with `{title, content}`
    pub async fn store_document(
        &self,
        document_id: &str,
        snapshot: &ViewSnapshot,
    ) -> Result<(), PersistenceError> {
        let url = self.url(&format!("documents/{}", document_id))?;
        let body = serde_json::to_value(snapshot).map_err(|e| PersistenceError::InvalidResponse {
            url: url.to_string(),
            details: e.to_string(),
        })?;
        self.request(Method::PUT, url, Some(body)).await?;
        Ok(())
    }

    /// `GET /documents`
    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>, PersistenceError> {
        let url = self.url("documents")?;
        self.request_json(Method::GET, url, None).await
    }

    /// `POST /documents`
    pub async fn create_document(
        &self,
        title: &str,
        owner: Option<&str>,
    ) -> Result<DocumentSummary, PersistenceError> {
        let url = self.url("documents")?;
        let mut body = json!({ "title": title, "content": "" });
        if let Some(owner) = owner {
            body["username"] = json!(owner);
        }
        self.request_json(Method::POST, url, Some(body)).await
    }

    /// `DELETE /documents/{id}`
    pub async fn delete_document(&self, document_id: &str) -> Result<(), PersistenceError> {
        let url = self.url(&format!("documents/{}", document_id))?;
        self.request(Method::DELETE, url, None).await?;
        Ok(())
    }

    /// `GET /users/username/{name}`
    pub async fn find_user(&self, username: &str) -> Result<UserRecord, PersistenceError> {
        let mut url = self.url("users/username/")?;
        url.path_segments_mut()
            .map_err(|_| PersistenceError::InvalidResponse {
                url: self.base_url.clone(),
                details: "gateway URL cannot have path segments".to_string(),
            })?
            .pop_if_empty()
            .push(username);
        self.request_json(Method::GET, url, None).await
    }

    /// `POST /documents/{id}/collaborators`
    pub async fn add_collaborator(
        &self,
        document_id: &str,
        username: &str,
    ) -> Result<(), PersistenceError> {
        let url = self.url(&format!("documents/{}/collaborators", document_id))?;
        self.request(Method::POST, url, Some(json!({ "username": username })))
            .await?;
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url, PersistenceError> {
        Ok(join(&self.base_url, path)?)
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<Response, PersistenceError> {
        debug!(%method, %url, "Gateway request");
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|source| PersistenceError::Request {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(PersistenceError::Status {
                method,
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<T, PersistenceError> {
        let response = self.request(method, url.clone(), body).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| PersistenceError::Request {
                url: url.to_string(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|e| PersistenceError::InvalidResponse {
            url: url.to_string(),
            details: e.to_string(),
        })
    }
}

impl SnapshotStore for GatewayClient {
    async fn load(&self, document_id: &str) -> Result<ViewSnapshot, PersistenceError> {
        self.fetch_document(document_id).await
    }

    async fn save(&self, document_id: &str, snapshot: &ViewSnapshot) -> Result<(), PersistenceError> {
        self.store_document(document_id, snapshot).await
    }
}

/// Title used when the store has none
pub fn default_title(document_id: &str) -> String {
    format!("Документ {}", document_id)
}

/// Accept numeric or string IDs
fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}
