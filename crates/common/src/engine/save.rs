use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::claims::merge_raw;
use crate::context::ReconciliationContext;
use crate::deadline::Deadline;
use crate::error::EngineError;
use crate::fetch::BatchFetcher;
use crate::provider::{IndexDocument, IndexUpdate, IndexUpdates, UserRecord};
use crate::reconcile::{stage_membership, OperationKind, WritePlan};

use super::{Engine, RecordOutcome};

/// A user whose claims could not be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSave {
    pub uid: String,
    pub reason: String,
}

/// Per-user outcome of a save
///
/// Edits of saved, discarded and vanished users are cleared from the
/// action buffer once the index transaction commits. Edits of failed users
/// stay pending so the save can be retried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: Vec<String>,
    pub failed: Vec<FailedSave>,
    /// Users whose edits were dropped because the remote side was taken
    pub discarded: Vec<String>,
    /// Users deleted from the identity provider since they were edited
    pub not_found: Vec<String>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn settled(&self) -> impl Iterator<Item = &String> {
        self.saved
            .iter()
            .chain(self.discarded.iter())
            .chain(self.not_found.iter())
    }
}

impl fmt::Display for SaveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "saved {} users", self.saved.len())?;
        if !self.discarded.is_empty() {
            write!(f, ", discarded edits of {}", self.discarded.len())?;
        }
        if !self.not_found.is_empty() {
            write!(f, ", {} no longer exist", self.not_found.len())?;
        }
        if !self.failed.is_empty() {
            write!(f, ", {} failed and are kept for retry:", self.failed.len())?;
            for failure in &self.failed {
                write!(f, " {} ({})", failure.uid, failure.reason)?;
            }
        }
        Ok(())
    }
}

impl Engine {
    /// Write every pending edit through to the identity provider
    ///
    /// A failed write for one user keeps that user's edits and moves on. A
    /// failed commit of the index transaction keeps every edit.
    #[tracing::instrument(skip_all)]
    pub async fn save(
        &self,
        ctx: &mut ReconciliationContext,
        cancel: &CancellationToken,
    ) -> Result<SaveReport, EngineError> {
        if ctx.actions.is_empty() {
            return Err(EngineError::NoChanges);
        }

        let deadline = self.deadline(cancel);
        let tx = self.begin(&deadline).await?;
        let snapshot = tx.snapshot().clone();
        ctx.privileged.replace(snapshot.keys().cloned());

        let uids = ctx.actions.uids();
        let mut pending = IndexUpdates::new();
        let mut report = SaveReport::default();

        let fetcher =
            BatchFetcher::new(self.identity.as_ref(), self.config.download_limit, &deadline);
        let mut pages = fetcher.pages(&uids);
        while let Some(page) = pages.next_page().await? {
            for record in &page {
                self.save_record(ctx, record, &snapshot, &mut pending, &mut report, &deadline)
                    .await?;
            }
        }

        for uid in pages.into_missing() {
            tracing::warn!(
                "{} was deleted before its edits were saved",
                ctx.cache.email_or_uid(&uid)
            );
            if ctx.privileged.remove(&uid) {
                pending.insert(uid.clone(), IndexUpdate::Delete);
            }
            report.not_found.push(uid);
        }

        // edits survive a failed commit untouched
        self.commit(tx, &pending, &deadline).await?;

        for uid in report.settled() {
            ctx.actions.remove(uid);
        }

        tracing::info!("{}", report);
        if report.is_complete() {
            Ok(report)
        } else {
            Err(EngineError::PartialSave(Box::new(report)))
        }
    }

    async fn save_record(
        &self,
        ctx: &mut ReconciliationContext,
        record: &UserRecord,
        snapshot: &IndexDocument,
        pending: &mut IndexUpdates,
        report: &mut SaveReport,
        deadline: &Deadline,
    ) -> Result<(), EngineError> {
        let uid = record.uid.as_str();

        let written = match self
            .reconcile_record(ctx, record, OperationKind::Save, pending, deadline)
            .await
        {
            Ok(RecordOutcome::TookRemote) => {
                let privileged = ctx.cache.get(uid).is_some_and(|u| u.claims.has_any());
                stage_membership(ctx, uid, &record.email, privileged, pending);
                report.discarded.push(uid.to_string());
                return Ok(());
            }
            Ok(RecordOutcome::KeptLocal) | Ok(RecordOutcome::AlreadyApplied) => Ok(()),
            Ok(_) => {
                let edits = ctx.actions.get(uid).cloned().unwrap_or_default();
                let committed = match ctx.cache.get(uid) {
                    Some(user) => user.claims.clone(),
                    None => self.config.permissions.template(),
                };
                let plan = WritePlan {
                    uid: uid.to_string(),
                    claims: merge_raw(&record.custom_claims, &edits),
                    intended: committed.overlay(&edits),
                };
                self.write_through(ctx, plan, deadline).await
            }
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => {
                let privileged = ctx.cache.get(uid).is_some_and(|u| u.claims.has_any());
                stage_membership(ctx, uid, &record.email, privileged, pending);
                report.saved.push(uid.to_string());
                Ok(())
            }
            Err(EngineError::WriteThrough { uid, source }) => {
                tracing::warn!("keeping edits of {} for retry: {}", uid, source);
                // undo whatever index change the failed write had staged
                pending.remove(&uid);
                ctx.privileged.set(&uid, snapshot.contains_key(&uid));
                report.failed.push(FailedSave {
                    uid,
                    reason: source.to_string(),
                });
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
