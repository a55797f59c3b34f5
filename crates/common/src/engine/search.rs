use std::collections::HashSet;

use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;

use crate::context::{ReconciliationContext, View};
use crate::error::EngineError;
use crate::fetch::BatchFetcher;
use crate::provider::{IndexUpdates, SearchField};
use crate::reconcile::OperationKind;
use crate::user::sort_by_name_then_email;

use super::Engine;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchReport {
    /// Users now shown in the search view
    pub users: usize,
    /// Matches that vanished before they could be fetched
    pub not_found: Vec<String>,
    /// Users with unsaved edits, which survive the search
    pub pending_edits: usize,
}

impl Engine {
    /// Show the users whose `field` starts with `prefix`
    ///
    /// Users already cached are shown from the cache; only new matches are
    /// fetched. Too short a prefix is rejected before any remote call.
    #[tracing::instrument(skip(self, ctx, cancel))]
    pub async fn search(
        &self,
        ctx: &mut ReconciliationContext,
        field: SearchField,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<SearchReport, EngineError> {
        let prefix = prefix.trim();
        if prefix.chars().count() < self.config.min_search_len {
            return Err(EngineError::SearchTooShort {
                min: self.config.min_search_len,
            });
        }

        let pending_edits = ctx.actions.len();
        if pending_edits > 0 {
            tracing::warn!("searching with {} users holding unsaved edits", pending_edits);
        }

        let deadline = self.deadline(cancel);
        let matches: Vec<String> = deadline
            .run(async {
                let stream = self.identity.search(field, prefix).await?;
                stream.try_collect::<Vec<String>>().await
            })
            .await?;

        let mut seen = HashSet::new();
        let matches: Vec<String> = matches
            .into_iter()
            .filter(|uid| seen.insert(uid.clone()))
            .collect();
        let unknown: Vec<String> = matches
            .iter()
            .filter(|uid| !ctx.cache.contains(uid))
            .cloned()
            .collect();
        tracing::debug!("{} matches, {} not cached yet", matches.len(), unknown.len());

        // first sightings never conflict, so nothing is staged here
        let mut pending = IndexUpdates::new();
        let fetcher =
            BatchFetcher::new(self.identity.as_ref(), self.config.download_limit, &deadline);
        let mut pages = fetcher.pages(&unknown);
        while let Some(page) = pages.next_page().await? {
            for record in &page {
                self.reconcile_record(ctx, record, OperationKind::Search, &mut pending, &deadline)
                    .await?;
            }
        }
        let not_found = pages.into_missing();
        for uid in &not_found {
            tracing::warn!("search match {} not found in the identity provider", uid);
        }

        let mut visible: Vec<String> = matches
            .into_iter()
            .filter(|uid| ctx.cache.contains(uid))
            .collect();
        if visible.is_empty() {
            return Err(EngineError::NoUsers);
        }
        sort_by_name_then_email(&mut visible, &ctx.cache);

        let report = SearchReport {
            users: visible.len(),
            not_found,
            pending_edits,
        };
        ctx.show(View::Search, visible);

        tracing::info!("search by {} found {} users", field, report.users);
        Ok(report)
    }
}
