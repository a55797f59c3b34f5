use tokio_util::sync::CancellationToken;

use crate::context::{ReconciliationContext, View};
use crate::error::EngineError;
use crate::fetch::BatchFetcher;
use crate::provider::IndexUpdates;
use crate::reconcile::OperationKind;
use crate::user::sort_by_name_then_email;

use super::{missing_email, Engine};

/// Result of loading the privileged users
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListReport {
    /// Users now shown in the list view
    pub users: usize,
    /// Indexed users the identity provider does not know, as emails
    pub not_found: Vec<String>,
    /// Indexed users without any claim, as emails
    pub inconsistent: Vec<String>,
}

impl Engine {
    /// Load every user the index document lists into the list view
    #[tracing::instrument(skip_all)]
    pub async fn list(
        &self,
        ctx: &mut ReconciliationContext,
        cancel: &CancellationToken,
    ) -> Result<ListReport, EngineError> {
        let deadline = self.deadline(cancel);
        let tx = self.begin(&deadline).await?;
        let snapshot = tx.snapshot().clone();
        ctx.privileged.replace(snapshot.keys().cloned());

        let uids: Vec<String> = snapshot.keys().cloned().collect();
        let mut pending = IndexUpdates::new();

        let fetcher =
            BatchFetcher::new(self.identity.as_ref(), self.config.download_limit, &deadline);
        let mut pages = fetcher.pages(&uids);
        while let Some(page) = pages.next_page().await? {
            for record in &page {
                self.reconcile_record(ctx, record, OperationKind::List, &mut pending, &deadline)
                    .await?;
            }
        }
        let missing = pages.into_missing();

        let not_found: Vec<String> = missing
            .iter()
            .map(|uid| missing_email(ctx, &snapshot, uid))
            .collect();
        for email in &not_found {
            tracing::warn!("indexed user {} not found in the identity provider", email);
        }

        let inconsistent: Vec<String> = uids
            .iter()
            .filter(|uid| !missing.contains(uid))
            .filter_map(|uid| ctx.cache.get(uid))
            .filter(|user| !user.claims.has_any())
            .map(|user| user.email.clone())
            .collect();
        for email in &inconsistent {
            tracing::warn!("{} is indexed as privileged but holds no claims", email);
        }

        self.commit(tx, &pending, &deadline).await?;

        let mut visible: Vec<String> = uids
            .into_iter()
            .filter(|uid| ctx.cache.contains(uid))
            .collect();
        sort_by_name_then_email(&mut visible, &ctx.cache);

        let report = ListReport {
            users: visible.len(),
            not_found,
            inconsistent,
        };
        ctx.show(View::List, visible);

        tracing::info!("listed {} privileged users", report.users);
        Ok(report)
    }
}
