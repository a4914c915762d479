//! Document identity
//!
//! A session edits one document on behalf of one user. Both are fixed for the
//! lifetime of the session and are usually taken from the editor path
//! `/users/{user}/documents/{document}`.

use std::fmt;

use reqwest::Url;
use thiserror::Error;

/// Errors building or parsing a document identity
#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Document ID is empty")]
    EmptyDocumentId,

    #[error("Invalid document ID '{0}': only letters, digits, '-' and '_' are allowed")]
    InvalidDocumentId(String),

    #[error("User identity is empty")]
    EmptyUser,

    #[error("Path '{0}' does not match /users/{{user}}/documents/{{document}}")]
    UnrecognizedPath(String),

    #[error("Invalid base URL '{url}': {details}")]
    InvalidBaseUrl { url: String, details: String },
}

/// The (document, user) pair a session is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentIdentity {
    document_id: String,
    user: String,
}

impl DocumentIdentity {
    /// Create an identity, validating both parts
    pub fn new(document_id: &str, user: &str) -> Result<Self, IdentityError> {
        let document_id = document_id.trim();
        let user = user.trim();

        if document_id.is_empty() {
            return Err(IdentityError::EmptyDocumentId);
        }
        if !document_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(IdentityError::InvalidDocumentId(document_id.to_string()));
        }
        if user.is_empty() {
            return Err(IdentityError::EmptyUser);
        }

        Ok(Self {
            document_id: document_id.to_string(),
            user: user.to_string(),
        })
    }

    /// Parse an editor path such as `/users/alice/documents/42`
    pub fn from_path(path: &str) -> Result<Self, IdentityError> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        match parts.as_slice() {
            ["users", user, "documents", doc] => Self::new(doc, user),
            _ => Err(IdentityError::UnrecognizedPath(path.to_string())),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// WebSocket URL of the hub endpoint for this document
    ///
    /// The user identity travels as the `token` query parameter.
    pub fn hub_url(&self, base: &str) -> Result<Url, IdentityError> {
        let mut url = join(base, &format!("ws/documents/{}", self.document_id))?;
        url.query_pairs_mut().append_pair("token", &self.user);
        Ok(url)
    }
}

impl fmt::Display for DocumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.document_id)
    }
}

/// Append a relative path to a base URL, keeping any path prefix on the base
pub(crate) fn join(base: &str, path: &str) -> Result<Url, IdentityError> {
    let invalid = |details: String| IdentityError::InvalidBaseUrl {
        url: base.to_string(),
        details,
    };

    let mut base_url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    if base_url.cannot_be_a_base() {
        return Err(invalid("URL cannot be a base".to_string()));
    }
    if !base_url.path().ends_with('/') {
        let with_slash = format!("{}/", base_url.path());
        base_url.set_path(&with_slash);
    }
    base_url.join(path).map_err(|e| invalid(e.to_string()))
}
