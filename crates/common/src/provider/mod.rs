//! Capability interfaces for the remote stores
//!
//! The engine talks to exactly two remote stores:
//!
//! - an [`IdentityProvider`] holding users and their custom claims, with no
//!   transactional isolation, and
//! - an [`IndexStore`] holding the single index document that lists the
//!   privileged users, read and written inside an [`IndexTransaction`].
//!
//! Network clients live outside this crate. [`memory`] provides in-process
//! implementations used by tests and the file backend.

pub mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::claims::RawClaims;

pub use memory::{IdentityState, MemoryIdentityProvider, MemoryIndexStore};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The remote call exceeded its time bound
    #[error("remote access timed out")]
    Timeout,
    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,
    /// The store refused to commit, e.g. on contention
    #[error("transaction aborted: {0}")]
    Aborted(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// A user as the identity provider returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub custom_claims: RawClaims,
}

/// Result of a bulk lookup
#[derive(Debug, Clone, Default)]
pub struct BulkGetResult {
    pub found: Vec<UserRecord>,
    pub not_found: Vec<String>,
}

/// One page of a full user scan
#[derive(Debug, Clone, Default)]
pub struct UserPage {
    pub users: Vec<UserRecord>,
    /// `None` once the scan is exhausted
    pub next_page_token: Option<String>,
}

/// Display field a search prefix is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Email,
    Name,
}

impl SearchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchField::Email => "email",
            SearchField::Name => "name",
        }
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync + fmt::Debug {
    /// Stream the UIDs whose `field` starts with `prefix`
    async fn search(
        &self,
        field: SearchField,
        prefix: &str,
    ) -> Result<BoxStream<'static, Result<String, ProviderError>>, ProviderError>;

    /// Fetch a batch of users; unknown UIDs come back in `not_found`
    async fn bulk_get(&self, uids: &[String]) -> Result<BulkGetResult, ProviderError>;

    /// Replace a user's custom claims
    async fn set_claims(&self, uid: &str, claims: RawClaims) -> Result<(), ProviderError>;

    /// One page of the full user scan, starting at `page_token`
    async fn list_users(&self, page_token: Option<String>) -> Result<UserPage, ProviderError>;
}

/// UID to display email
pub type IndexDocument = BTreeMap<String, String>;

/// Change to one index document entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexUpdate {
    Set(String),
    Delete,
}

pub type IndexUpdates = BTreeMap<String, IndexUpdate>;

/// Apply updates to a document in place
pub fn apply_updates(document: &mut IndexDocument, updates: &IndexUpdates) {
    for (uid, update) in updates {
        match update {
            IndexUpdate::Set(email) => {
                document.insert(uid.clone(), email.clone());
            }
            IndexUpdate::Delete => {
                document.remove(uid);
            }
        }
    }
}

#[async_trait]
pub trait IndexStore: Send + Sync + fmt::Debug {
    /// Open a transaction holding a fresh read of the index document
    async fn begin(&self) -> Result<Box<dyn IndexTransaction>, ProviderError>;
}

/// An open read-modify-write transaction on the index document
///
/// Dropping a transaction without committing it discards everything it
/// staged.
#[async_trait]
pub trait IndexTransaction: Send {
    /// The index document as read when the transaction began
    fn snapshot(&self) -> &IndexDocument;

    /// Stage updates to be written on commit
    fn update_index(&mut self, updates: &IndexUpdates) -> Result<(), ProviderError>;

    async fn commit(self: Box<Self>) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_updates() {
        let mut document = IndexDocument::new();
        document.insert("u1".to_string(), "a@x".to_string());
        document.insert("u2".to_string(), "b@x".to_string());

        let mut updates = IndexUpdates::new();
        updates.insert("u1".to_string(), IndexUpdate::Delete);
        updates.insert("u3".to_string(), IndexUpdate::Set("c@x".to_string()));
        apply_updates(&mut document, &updates);

        assert_eq!(document.len(), 2);
        assert!(!document.contains_key("u1"));
        assert_eq!(document.get("u3").map(String::as_str), Some("c@x"));
    }
}
