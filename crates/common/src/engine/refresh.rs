use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::context::{ReconciliationContext, View};
use crate::error::EngineError;
use crate::provider::{IndexUpdate, IndexUpdates};
use crate::reconcile::{stage_membership, OperationKind};
use crate::user::sort_by_name_then_email;

use super::{missing_email, Engine};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Privileged users now shown in the list view
    pub users: usize,
    /// Entries written to the index document
    pub index_updates: usize,
    /// Indexed users the identity provider does not know, as emails; their
    /// entries were removed
    pub not_found: Vec<String>,
}

impl Engine {
    /// Scan every identity-provider user and rebuild the index document
    ///
    /// Only allowed from the list view and with no pending edits. Afterwards
    /// the index document lists exactly the users holding at least one claim.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(
        &self,
        ctx: &mut ReconciliationContext,
        cancel: &CancellationToken,
    ) -> Result<RefreshReport, EngineError> {
        if ctx.view() != View::List {
            return Err(EngineError::CantRefresh);
        }
        if !ctx.actions.is_empty() {
            return Err(EngineError::PendingActions);
        }

        let deadline = self.deadline(cancel);
        let tx = self.begin(&deadline).await?;
        let snapshot = tx.snapshot().clone();
        ctx.privileged.replace(snapshot.keys().cloned());

        let mut pending = IndexUpdates::new();
        let mut seen = HashSet::new();
        let mut page_token = None;
        let mut scanned = 0;

        loop {
            let page = deadline.run(self.identity.list_users(page_token.take())).await?;
            scanned += page.users.len();
            tracing::debug!("scanning {} users, {} so far", page.users.len(), scanned);

            for record in &page.users {
                seen.insert(record.uid.clone());
                self.reconcile_record(ctx, record, OperationKind::Refresh, &mut pending, &deadline)
                    .await?;

                let privileged = ctx
                    .cache
                    .get(&record.uid)
                    .is_some_and(|user| user.claims.has_any());
                stage_membership(ctx, &record.uid, &record.email, privileged, &mut pending);

                // keep the listed email current for users that stay privileged
                let stale = snapshot
                    .get(&record.uid)
                    .is_some_and(|email| email != &record.email);
                if privileged && stale && !pending.contains_key(&record.uid) {
                    pending.insert(record.uid.clone(), IndexUpdate::Set(record.email.clone()));
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        let mut not_found = Vec::new();
        for uid in snapshot.keys().filter(|uid| !seen.contains(*uid)) {
            let email = missing_email(ctx, &snapshot, uid);
            tracing::warn!("indexed user {} no longer exists, removing it", email);
            ctx.privileged.remove(uid);
            pending.insert(uid.clone(), IndexUpdate::Delete);
            not_found.push(email);
        }

        let index_updates = pending.len();
        self.commit(tx, &pending, &deadline).await?;

        let mut visible: Vec<String> = ctx
            .privileged
            .iter()
            .filter(|uid| ctx.cache.contains(uid))
            .cloned()
            .collect();
        sort_by_name_then_email(&mut visible, &ctx.cache);

        let report = RefreshReport {
            users: visible.len(),
            index_updates,
            not_found,
        };
        ctx.show(View::List, visible);

        tracing::info!(
            "refreshed {} users, {} privileged, {} index updates",
            scanned,
            report.users,
            report.index_updates
        );
        Ok(report)
    }
}
