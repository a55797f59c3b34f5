use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::claims::RawClaims;

use super::{
    apply_updates, BulkGetResult, IdentityProvider, IndexDocument, IndexStore, IndexTransaction,
    IndexUpdates, ProviderError, SearchField, UserPage, UserRecord,
};

/// Most identifiers a single bulk lookup accepts
pub const MAX_BULK_GET: usize = 100;
/// Users per page of a full scan unless configured otherwise
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 1000;

/// Persistable contents of a [`MemoryIdentityProvider`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityState {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
}

#[derive(Debug)]
struct IdentityInner {
    state: IdentityState,
    page_size: usize,
    failing_writes: HashSet<String>,
    slow_writes: HashMap<String, Duration>,
    delay: Option<Duration>,
    bulk_gets: usize,
    writes: usize,
}

/// Identity provider backed by an in-process map
///
/// Clones share the same users. Besides the provider behavior it can
/// inject write failures and latency, and counts the calls it served.
#[derive(Debug, Clone)]
pub struct MemoryIdentityProvider {
    inner: Arc<Mutex<IdentityInner>>,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::from_state(IdentityState::default())
    }
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: IdentityState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(IdentityInner {
                state,
                page_size: DEFAULT_SCAN_PAGE_SIZE,
                failing_writes: HashSet::new(),
                slow_writes: HashMap::new(),
                delay: None,
                bulk_gets: 0,
                writes: 0,
            })),
        }
    }

    pub fn state(&self) -> IdentityState {
        self.inner.lock().state.clone()
    }

    pub fn insert_user(&self, record: UserRecord) {
        self.inner
            .lock()
            .state
            .users
            .insert(record.uid.clone(), record);
    }

    pub fn remove_user(&self, uid: &str) -> Option<UserRecord> {
        self.inner.lock().state.users.remove(uid)
    }

    pub fn user(&self, uid: &str) -> Option<UserRecord> {
        self.inner.lock().state.users.get(uid).cloned()
    }

    /// Page size of [`IdentityProvider::list_users`]
    pub fn set_page_size(&self, page_size: usize) {
        self.inner.lock().page_size = page_size.max(1);
    }

    /// Make every later `set_claims` for `uid` fail
    pub fn fail_writes_for(&self, uid: &str) {
        self.inner.lock().failing_writes.insert(uid.to_string());
    }

    /// Delay every later `set_claims` for `uid` by `delay`
    pub fn slow_writes_for(&self, uid: &str, delay: Duration) {
        self.inner.lock().slow_writes.insert(uid.to_string(), delay);
    }

    /// Delay every later remote call by `delay`
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.inner.lock().delay = delay;
    }

    pub fn bulk_get_calls(&self) -> usize {
        self.inner.lock().bulk_gets
    }

    pub fn set_claims_calls(&self) -> usize {
        self.inner.lock().writes
    }

    async fn latency(&self) {
        let delay = self.inner.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn search(
        &self,
        field: SearchField,
        prefix: &str,
    ) -> Result<BoxStream<'static, Result<String, ProviderError>>, ProviderError> {
        self.latency().await;

        let uids: Vec<String> = {
            let inner = self.inner.lock();
            inner
                .state
                .users
                .values()
                .filter(|record| {
                    let value = match field {
                        SearchField::Email => &record.email,
                        SearchField::Name => &record.display_name,
                    };
                    value.starts_with(prefix)
                })
                .map(|record| record.uid.clone())
                .collect()
        };

        Ok(stream::iter(uids.into_iter().map(Ok)).boxed())
    }

    async fn bulk_get(&self, uids: &[String]) -> Result<BulkGetResult, ProviderError> {
        self.latency().await;

        let mut inner = self.inner.lock();
        inner.bulk_gets += 1;

        if uids.len() > MAX_BULK_GET {
            return Err(ProviderError::Backend(anyhow::anyhow!(
                "bulk lookup of {} identifiers exceeds the limit of {}",
                uids.len(),
                MAX_BULK_GET
            )));
        }

        let mut result = BulkGetResult::default();
        for uid in uids {
            match inner.state.users.get(uid) {
                Some(record) => result.found.push(record.clone()),
                None => result.not_found.push(uid.clone()),
            }
        }
        Ok(result)
    }

    async fn set_claims(&self, uid: &str, claims: RawClaims) -> Result<(), ProviderError> {
        self.latency().await;
        let slow = self.inner.lock().slow_writes.get(uid).copied();
        if let Some(delay) = slow {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock();
        inner.writes += 1;

        if inner.failing_writes.contains(uid) {
            return Err(ProviderError::Backend(anyhow::anyhow!(
                "claims store rejected the update for {}",
                uid
            )));
        }

        match inner.state.users.get_mut(uid) {
            Some(record) => {
                record.custom_claims = claims;
                Ok(())
            }
            None => Err(ProviderError::UserNotFound(uid.to_string())),
        }
    }

    async fn list_users(&self, page_token: Option<String>) -> Result<UserPage, ProviderError> {
        self.latency().await;

        let start = match page_token {
            Some(token) => token.parse::<usize>().map_err(|e| {
                ProviderError::Backend(anyhow::anyhow!("invalid page token '{}': {}", token, e))
            })?,
            None => 0,
        };

        let inner = self.inner.lock();
        let total = inner.state.users.len();
        let users: Vec<UserRecord> = inner
            .state
            .users
            .values()
            .skip(start)
            .take(inner.page_size)
            .cloned()
            .collect();
        let end = start + users.len();

        Ok(UserPage {
            users,
            next_page_token: (end < total).then(|| end.to_string()),
        })
    }
}

#[derive(Debug, Default)]
struct IndexInner {
    document: IndexDocument,
    version: u64,
    failing_commits: usize,
    commits: usize,
}

/// Index store backed by an in-process document
///
/// Transactions are optimistic: a commit fails with
/// [`ProviderError::Aborted`] when the document changed after the
/// transaction began.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndexStore {
    inner: Arc<Mutex<IndexInner>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: IndexDocument) -> Self {
        Self {
            inner: Arc::new(Mutex::new(IndexInner {
                document,
                ..IndexInner::default()
            })),
        }
    }

    pub fn document(&self) -> IndexDocument {
        self.inner.lock().document.clone()
    }

    /// Write an entry outside of any transaction, as a concurrent writer would
    pub fn set_entry(&self, uid: &str, email: &str) {
        let mut inner = self.inner.lock();
        inner.document.insert(uid.to_string(), email.to_string());
        inner.version += 1;
    }

    /// Make the next `count` commits fail
    pub fn fail_commits(&self, count: usize) {
        self.inner.lock().failing_commits = count;
    }

    pub fn commits(&self) -> usize {
        self.inner.lock().commits
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn begin(&self) -> Result<Box<dyn IndexTransaction>, ProviderError> {
        let inner = self.inner.lock();
        Ok(Box::new(MemoryIndexTransaction {
            store: self.inner.clone(),
            snapshot: inner.document.clone(),
            version: inner.version,
            staged: IndexUpdates::new(),
        }))
    }
}

struct MemoryIndexTransaction {
    store: Arc<Mutex<IndexInner>>,
    snapshot: IndexDocument,
    version: u64,
    staged: IndexUpdates,
}

#[async_trait]
impl IndexTransaction for MemoryIndexTransaction {
    fn snapshot(&self) -> &IndexDocument {
        &self.snapshot
    }

    fn update_index(&mut self, updates: &IndexUpdates) -> Result<(), ProviderError> {
        for (uid, update) in updates {
            self.staged.insert(uid.clone(), update.clone());
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), ProviderError> {
        let mut inner = self.store.lock();

        if inner.failing_commits > 0 {
            inner.failing_commits -= 1;
            return Err(ProviderError::Aborted("commit rejected".to_string()));
        }
        if inner.version != self.version {
            return Err(ProviderError::Aborted(
                "index document changed since the transaction began".to_string(),
            ));
        }

        apply_updates(&mut inner.document, &self.staged);
        inner.version += 1;
        inner.commits += 1;
        Ok(())
    }
}
