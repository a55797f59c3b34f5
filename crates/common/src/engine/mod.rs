//! Transaction coordinator
//!
//! The [`Engine`] runs the workflows that keep a [`ReconciliationContext`]
//! in step with the remote stores:
//!
//! - [`Engine::list`] loads every user the index document lists
//! - [`Engine::search`] looks users up by an email or name prefix
//! - [`Engine::refresh`] scans every user and rebuilds the index document
//! - [`Engine::save`] writes the pending edits through
//!
//! List, Refresh and Save each run inside one index transaction: the index
//! document is read when the transaction begins, index changes are staged
//! while records are reconciled, and everything staged is written once on
//! commit. A workflow that fails or is cancelled before the commit leaves
//! the index document untouched. Claims already written to the identity
//! provider are not rolled back.
//!
//! Every remote call is bounded by the configured timeout and by the
//! caller's [`CancellationToken`]. The whole workflow, conflict decisions
//! included, is further bounded by the operation timeout counted from its
//! start; past it the transaction is dropped uncommitted. Records are fetched and reconciled one
//! at a time, in order; the engine never fans out.

mod edit;
mod list;
mod refresh;
mod save;
mod search;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::claims::PermissionSet;
use crate::context::ReconciliationContext;
use crate::deadline::Deadline;
use crate::decide::Decider;
use crate::error::EngineError;
use crate::provider::{
    IdentityProvider, IndexDocument, IndexStore, IndexTransaction, IndexUpdates, UserRecord,
};
use crate::reconcile::{OperationKind, Reconciled, Reconciler, Resolution, WritePlan};

pub use list::ListReport;
pub use refresh::RefreshReport;
pub use save::{FailedSave, SaveReport};
pub use search::SearchReport;

/// Bound on every remote call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(12);
/// Bound on a whole workflow, operator decisions included
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(120);
/// Users per bulk lookup
pub const DEFAULT_DOWNLOAD_LIMIT: usize = 100;
/// Shortest accepted search prefix
pub const DEFAULT_MIN_SEARCH_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub permissions: PermissionSet,
    pub timeout: Duration,
    pub operation_timeout: Duration,
    pub download_limit: usize,
    pub min_search_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            permissions: PermissionSet::default(),
            timeout: DEFAULT_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            download_limit: DEFAULT_DOWNLOAD_LIMIT,
            min_search_len: DEFAULT_MIN_SEARCH_LEN,
        }
    }
}

/// How a single record ended up after reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordOutcome {
    Cached,
    Skipped,
    Unchanged,
    AlreadyApplied,
    KeptLocal,
    TookRemote,
}

#[derive(Debug, Clone)]
pub struct Engine {
    identity: Arc<dyn IdentityProvider>,
    index: Arc<dyn IndexStore>,
    decider: Arc<dyn Decider>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        index: Arc<dyn IndexStore>,
        decider: Arc<dyn Decider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            identity,
            index,
            decider,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.config.permissions
    }

    fn deadline(&self, cancel: &CancellationToken) -> Deadline {
        Deadline::new(self.config.timeout, cancel.clone())
            .with_budget(self.config.operation_timeout)
    }

    async fn begin(&self, deadline: &Deadline) -> Result<Box<dyn IndexTransaction>, EngineError> {
        deadline
            .run(self.index.begin())
            .await
            .map_err(EngineError::transaction)
    }

    /// Stage `pending` and commit, writing the index document exactly once
    async fn commit(
        &self,
        mut tx: Box<dyn IndexTransaction>,
        pending: &IndexUpdates,
        deadline: &Deadline,
    ) -> Result<(), EngineError> {
        if !pending.is_empty() {
            tx.update_index(pending).map_err(EngineError::transaction)?;
        }
        deadline
            .run(tx.commit())
            .await
            .map_err(EngineError::transaction)?;

        tracing::debug!("committed {} index updates", pending.len());
        Ok(())
    }

    /// Reconcile one record, settling any conflict with the decider
    async fn reconcile_record(
        &self,
        ctx: &mut ReconciliationContext,
        record: &UserRecord,
        kind: OperationKind,
        pending: &mut IndexUpdates,
        deadline: &Deadline,
    ) -> Result<RecordOutcome, EngineError> {
        let reconciler = Reconciler::new(&self.config.permissions);

        let conflict = match reconciler.reconcile(ctx, record, kind) {
            Reconciled::Cached => return Ok(RecordOutcome::Cached),
            Reconciled::Skipped => return Ok(RecordOutcome::Skipped),
            Reconciled::Unchanged => return Ok(RecordOutcome::Unchanged),
            Reconciled::AlreadyApplied => return Ok(RecordOutcome::AlreadyApplied),
            Reconciled::Conflict(conflict) => conflict,
        };

        tracing::info!(
            "conflict on {} during {}: remote has [{}], local has [{}]",
            conflict.email,
            kind,
            conflict.added,
            conflict.removed
        );
        if conflict.manual_change_suspected() {
            tracing::warn!("claims and index disagree for {}", conflict.email);
        }

        let decision = deadline.wait(self.decider.decide(&conflict)).await?;
        tracing::debug!("decision for {}: {:?}", conflict.uid, decision);

        match reconciler.resolve(ctx, &conflict, decision, pending) {
            Resolution::WriteThrough(plan) => {
                self.write_through(ctx, plan, deadline).await?;
                Ok(RecordOutcome::KeptLocal)
            }
            Resolution::RemoteWins => Ok(RecordOutcome::TookRemote),
        }
    }

    /// Store a user's claims remotely and cache them once stored
    async fn write_through(
        &self,
        ctx: &mut ReconciliationContext,
        plan: WritePlan,
        deadline: &Deadline,
    ) -> Result<(), EngineError> {
        deadline
            .run(self.identity.set_claims(&plan.uid, plan.claims))
            .await
            .map_err(|e| EngineError::write_through(&plan.uid, e))?;

        tracing::debug!("wrote claims of {}: {}", plan.uid, plan.intended);
        ctx.cache.set_claims(&plan.uid, plan.intended);
        Ok(())
    }
}

/// Display email for a UID the identity provider no longer knows
fn missing_email(ctx: &ReconciliationContext, snapshot: &IndexDocument, uid: &str) -> String {
    if let Some(user) = ctx.cache.get(uid).filter(|user| !user.email.is_empty()) {
        return user.email.clone();
    }
    match snapshot.get(uid) {
        Some(email) if !email.is_empty() => email.clone(),
        _ => uid.to_string(),
    }
}
