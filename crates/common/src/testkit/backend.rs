use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::context::ReconciliationContext;
use crate::decide::Decision;
use crate::engine::{Engine, EngineConfig};
use crate::provider::{IndexDocument, MemoryIdentityProvider, MemoryIndexStore, UserRecord};

use super::ScriptedDecider;

/// Build a user record from a JSON claims object
pub fn record(uid: &str, email: &str, name: &str, claims: serde_json::Value) -> UserRecord {
    UserRecord {
        uid: uid.to_string(),
        email: email.to_string(),
        display_name: name.to_string(),
        custom_claims: claims.as_object().cloned().unwrap_or_default(),
    }
}

/// In-memory identity provider and index store behind one engine
#[derive(Debug, Clone)]
pub struct TestBackend {
    pub identity: MemoryIdentityProvider,
    pub index: MemoryIndexStore,
    pub decider: ScriptedDecider,
    pub config: EngineConfig,
    pub cancel: CancellationToken,
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBackend {
    /// Backend whose decider keeps the local side unless scripted otherwise
    pub fn new() -> Self {
        Self::with_fallback(Decision::KeepLocal)
    }

    pub fn with_fallback(fallback: Decision) -> Self {
        Self {
            identity: MemoryIdentityProvider::new(),
            index: MemoryIndexStore::new(),
            decider: ScriptedDecider::new(fallback),
            config: EngineConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_index(mut self, document: IndexDocument) -> Self {
        self.index = MemoryIndexStore::from_document(document);
        self
    }

    pub fn add_user(&self, record: UserRecord) {
        self.identity.insert_user(record);
    }

    /// List a user in the index document
    pub fn index(&self, uid: &str, email: &str) {
        self.index.set_entry(uid, email);
    }

    pub fn engine(&self) -> Engine {
        Engine::new(
            Arc::new(self.identity.clone()),
            Arc::new(self.index.clone()),
            Arc::new(self.decider.clone()),
            self.config.clone(),
        )
    }

    pub fn context(&self) -> ReconciliationContext {
        ReconciliationContext::new()
    }
}
