//! Per-record reconciliation of remote users against the local cache
//!
//! [`Reconciler::reconcile`] never performs I/O. When a fetched record
//! drifted from what the cache (or the pending edits) say, it returns a
//! [`ConflictDescriptor`] instead of asking anyone; the engine obtains a
//! [`Decision`] for it and hands both back to [`Reconciler::resolve`],
//! which applies the local side of the outcome and tells the engine what
//! still has to be written remotely.

use std::fmt;

use crate::claims::{merge_raw, ClaimError, ClaimsMap, PermissionSet, RawClaims};
use crate::context::ReconciliationContext;
use crate::decide::Decision;
use crate::provider::{IndexUpdate, IndexUpdates, UserRecord};
use crate::user::User;

/// Workflow a record is reconciled for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Search,
    List,
    Refresh,
    Save,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Search => "search",
            OperationKind::List => "list",
            OperationKind::Refresh => "refresh",
            OperationKind::Save => "save",
        };
        f.write_str(name)
    }
}

/// Drift between a fetched record and the local state that needs a decision
#[derive(Debug, Clone)]
pub struct ConflictDescriptor {
    pub uid: String,
    pub email: String,
    pub kind: OperationKind,
    /// Committed claims as cached before this fetch
    pub cached: ClaimsMap,
    /// Claims the identity provider holds now
    pub remote: ClaimsMap,
    /// What keeping the local side would write: the cached claims, with
    /// pending edits laid over them when saving
    pub intended: ClaimsMap,
    /// Claims the remote side has that the cache lacks or holds differently
    pub added: ClaimsMap,
    /// Claims the cache has that the remote side lacks or holds differently
    pub removed: ClaimsMap,
    pub has_claims: bool,
    pub is_privileged: bool,
    /// The fetched record, kept so a write-through preserves unknown keys
    pub record: UserRecord,
}

impl ConflictDescriptor {
    /// The claims and the index disagree on whether this user is privileged
    pub fn manual_change_suspected(&self) -> bool {
        self.has_claims != self.is_privileged
    }
}

impl fmt::Display for ConflictDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Permissions of {} changed remotely.", self.email)?;
        if !self.added.is_empty() {
            writeln!(f, "  remote now has: {}", self.added)?;
        }
        if !self.removed.is_empty() {
            writeln!(f, "  local copy has: {}", self.removed)?;
        }
        if self.manual_change_suspected() {
            writeln!(f, "  Anyone touched the claims or the database manually?")?;
            writeln!(f, "  The index and the claims disagree.")?;
        }
        write!(f, "Keep the local version?")
    }
}

/// Outcome of reconciling one record
#[derive(Debug, Clone)]
pub enum Reconciled {
    /// First sighting, now cached
    Cached,
    /// First sighting during a full scan of a user without claims, not cached
    Skipped,
    /// The cache already matched the remote claims
    Unchanged,
    /// The remote claims already equal the pending edits
    AlreadyApplied,
    Conflict(Box<ConflictDescriptor>),
}

/// Remote write the engine still owes after a decision
#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    pub uid: String,
    /// Full raw claim set to store
    pub claims: RawClaims,
    /// Claims to cache once the write succeeded
    pub intended: ClaimsMap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    WriteThrough(WritePlan),
    RemoteWins,
}

pub struct Reconciler<'a> {
    permissions: &'a PermissionSet,
}

impl<'a> Reconciler<'a> {
    pub fn new(permissions: &'a PermissionSet) -> Self {
        Self { permissions }
    }

    /// Known permissions of a record, malformed values treated as absent
    pub fn remote_claims(&self, record: &UserRecord) -> ClaimsMap {
        let (claims, errors) = self.permissions.filter(&record.custom_claims);
        for error in errors {
            match &error {
                ClaimError::WrongDBClaim { .. } => {
                    tracing::warn!("dropping claim of {}: {}", record.uid, error)
                }
                _ => tracing::debug!("ignoring claim of {}: {}", record.uid, error),
            }
        }
        claims
    }

    pub fn reconcile(
        &self,
        ctx: &mut ReconciliationContext,
        record: &UserRecord,
        kind: OperationKind,
    ) -> Reconciled {
        let remote = self.remote_claims(record);

        let Some(user) = ctx.cache.get_mut(&record.uid) else {
            if kind == OperationKind::Refresh && !remote.has_any() {
                return Reconciled::Skipped;
            }
            tracing::debug!("caching new user {} ({})", record.uid, kind);
            ctx.cache.insert(User {
                uid: record.uid.clone(),
                email: record.email.clone(),
                name: record.display_name.clone(),
                claims: remote,
            });
            return Reconciled::Cached;
        };

        user.email = record.email.clone();
        user.name = record.display_name.clone();

        if !user.claims.differs(&remote) {
            return Reconciled::Unchanged;
        }

        let cached = user.claims.clone();
        let intended = match (kind, ctx.actions.get(&record.uid)) {
            (OperationKind::Save, Some(edits)) => cached.overlay(edits),
            _ => cached.clone(),
        };

        if kind == OperationKind::Save && !intended.differs(&remote) {
            user.claims = remote;
            return Reconciled::AlreadyApplied;
        }

        let (added, removed) = cached.diff(&remote);
        Reconciled::Conflict(Box::new(ConflictDescriptor {
            uid: record.uid.clone(),
            email: record.email.clone(),
            kind,
            has_claims: cached.has_any(),
            is_privileged: ctx.privileged.contains(&record.uid),
            cached,
            remote,
            intended,
            added,
            removed,
            record: record.clone(),
        }))
    }

    /// Apply the local effects of `decision`
    ///
    /// Keeping the local side stages the index change its privileged
    /// status implies and returns the write the engine must perform; the
    /// cache is only updated once that write succeeded. Taking the remote
    /// side re-caches the remote claims and leaves the index view alone.
    pub fn resolve(
        &self,
        ctx: &mut ReconciliationContext,
        conflict: &ConflictDescriptor,
        decision: Decision,
        pending: &mut IndexUpdates,
    ) -> Resolution {
        match decision {
            Decision::KeepLocal => {
                stage_membership(
                    ctx,
                    &conflict.uid,
                    &conflict.email,
                    conflict.intended.has_any(),
                    pending,
                );
                Resolution::WriteThrough(WritePlan {
                    uid: conflict.uid.clone(),
                    claims: merge_raw(&conflict.record.custom_claims, &conflict.intended),
                    intended: conflict.intended.clone(),
                })
            }
            Decision::TakeRemote => {
                ctx.cache.set_claims(&conflict.uid, conflict.remote.clone());
                Resolution::RemoteWins
            }
        }
    }
}

/// Align the privileged view with `privileged`, staging an index update
/// when the status changes
pub fn stage_membership(
    ctx: &mut ReconciliationContext,
    uid: &str,
    email: &str,
    privileged: bool,
    pending: &mut IndexUpdates,
) {
    if ctx.privileged.contains(uid) == privileged {
        return;
    }

    ctx.privileged.set(uid, privileged);
    let update = if privileged {
        IndexUpdate::Set(email.to_string())
    } else {
        IndexUpdate::Delete
    };
    tracing::debug!("staging index update for {}: {:?}", uid, update);
    pending.insert(uid.to_string(), update);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claim;
    use serde_json::json;

    fn record(uid: &str, email: &str, claims: serde_json::Value) -> UserRecord {
        UserRecord {
            uid: uid.to_string(),
            email: email.to_string(),
            display_name: String::new(),
            custom_claims: claims.as_object().cloned().unwrap_or_default(),
        }
    }

    fn conflict_of(outcome: Reconciled) -> ConflictDescriptor {
        match outcome {
            Reconciled::Conflict(conflict) => *conflict,
            other => panic!("expected a conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_refresh_skips_new_user_without_claims() {
        let permissions = PermissionSet::default();
        let reconciler = Reconciler::new(&permissions);
        let mut ctx = ReconciliationContext::new();

        let outcome = reconciler.reconcile(

            &mut ctx,

            &record("u1", "a@x", json!({})),

            OperationKind::Refresh,

        );
        assert!(matches!(outcome, Reconciled::Skipped));
        assert!(ctx.cache.is_empty());

        // unknown keys do not count as claims either
        let outcome = reconciler.reconcile(
            &mut ctx,
            &record("u2", "b@x", json!({"other": true})),
            OperationKind::Refresh,
        );
        assert!(matches!(outcome, Reconciled::Skipped));
        assert!(ctx.cache.is_empty());
    }

    #[test]
    fn test_new_user_is_cached_without_conflict() {
        let permissions = PermissionSet::default();
        let reconciler = Reconciler::new(&permissions);
        let mut ctx = ReconciliationContext::new();

        for kind in [OperationKind::List, OperationKind::Search] {
            let uid = format!("u-{}", kind);
            let outcome = reconciler.reconcile(&mut ctx, &record(&uid, "a@x", json!({})), kind);
            assert!(matches!(outcome, Reconciled::Cached));
            assert!(ctx.cache.contains(&uid));
        }

        let outcome = reconciler.reconcile(
            &mut ctx,
            &record("u3", "c@x", json!({"admin": true})),
            OperationKind::Refresh,
        );
        assert!(matches!(outcome, Reconciled::Cached));
        assert_eq!(
            ctx.cache.get("u3").unwrap().claims.get("admin"),
            Some(&Claim::Flag(true))
        );
    }

    #[test]
    fn test_matching_claims_update_profile_only() {
        let permissions = PermissionSet::default();
        let reconciler = Reconciler::new(&permissions);
        let mut ctx = ReconciliationContext::new();
        reconciler.reconcile(
            &mut ctx,
            &record("u1", "old@x", json!({"admin": true})),
            OperationKind::List,
        );

        let mut renamed = record("u1", "new@x", json!({"admin": true}));
        renamed.display_name = "Ann".to_string();
        let outcome = reconciler.reconcile(&mut ctx, &renamed, OperationKind::List);

        assert!(matches!(outcome, Reconciled::Unchanged));
        let user = ctx.cache.get("u1").unwrap();
        assert_eq!(user.email, "new@x");
        assert_eq!(user.name, "Ann");
    }

    #[test]
    fn test_drift_is_reported_as_conflict() {
        let permissions = PermissionSet::default();
        let reconciler = Reconciler::new(&permissions);
        let mut ctx = ReconciliationContext::new();
        reconciler.reconcile(
            &mut ctx,
            &record("u1", "a@x", json!({"admin": true})),
            OperationKind::List,
        );
        ctx.privileged.insert("u1");

        let conflict = conflict_of(reconciler.reconcile(
            &mut ctx,
            &record("u1", "a@x", json!({"consultant": "2030-01-01"})),
            OperationKind::List,
        ));

        assert_eq!(conflict.kind, OperationKind::List);
        assert_eq!(conflict.intended, conflict.cached);
        assert!(conflict.added.get("consultant").is_some());
        assert_eq!(conflict.removed.get("admin"), Some(&Claim::Flag(true)));
        assert!(!conflict.manual_change_suspected());
        assert!(conflict.to_string().contains("a@x"));
        // nothing changes locally before a decision
        assert_eq!(
            ctx.cache.get("u1").unwrap().claims.get("admin"),
            Some(&Claim::Flag(true))
        );
    }

    #[test]
    fn test_manual_change_flag() {
        let permissions = PermissionSet::default();
        let reconciler = Reconciler::new(&permissions);
        let mut ctx = ReconciliationContext::new();
        reconciler.reconcile(
            &mut ctx,
            &record("u1", "a@x", json!({"admin": true})),
            OperationKind::List,
        );

        // claims say privileged, the index view does not list the user
        let conflict = conflict_of(reconciler.reconcile(
            &mut ctx,
            &record("u1", "a@x", json!({})),
            OperationKind::List,
        ));
        assert!(conflict.manual_change_suspected());
        assert!(conflict.to_string().contains("manually"));
    }

    #[test]
    fn test_save_accepts_remote_equal_to_intended() {
        let permissions = PermissionSet::default();
        let reconciler = Reconciler::new(&permissions);
        let mut ctx = ReconciliationContext::new();
        reconciler.reconcile(&mut ctx, &record("u1", "a@x", json!({})), OperationKind::List);
        ctx.actions
            .stage("u1", "admin", Claim::Flag(true), Some(&Claim::Flag(false)));

        let outcome = reconciler.reconcile(
            &mut ctx,
            &record("u1", "a@x", json!({"admin": true})),
            OperationKind::Save,
        );
        assert!(matches!(outcome, Reconciled::AlreadyApplied));
        assert_eq!(
            ctx.cache.get("u1").unwrap().claims.get("admin"),
            Some(&Claim::Flag(true))
        );
    }

    #[test]
    fn test_save_conflict_intends_overlay() {
        let permissions = PermissionSet::default();
        let reconciler = Reconciler::new(&permissions);
        let mut ctx = ReconciliationContext::new();
        reconciler.reconcile(&mut ctx, &record("u1", "a@x", json!({})), OperationKind::List);
        ctx.actions
            .stage("u1", "consultant", Claim::Flag(true), Some(&Claim::Flag(false)));

        let conflict = conflict_of(reconciler.reconcile(
            &mut ctx,
            &record("u1", "a@x", json!({"admin": true})),
            OperationKind::Save,
        ));
        assert_eq!(conflict.intended.get("consultant"), Some(&Claim::Flag(true)));
        assert_eq!(conflict.intended.get("admin"), Some(&Claim::Flag(false)));
    }

    #[test]
    fn test_keep_local_stages_index_and_plans_write() {
        let permissions = PermissionSet::default();
        let reconciler = Reconciler::new(&permissions);
        let mut ctx = ReconciliationContext::new();
        reconciler.reconcile(
            &mut ctx,
            &record("u1", "a@x", json!({"admin": true})),
            OperationKind::List,
        );

        let conflict = conflict_of(reconciler.reconcile(
            &mut ctx,
            &record("u1", "a@x", json!({"legacy": 1})),
            OperationKind::List,
        ));
        let mut pending = IndexUpdates::new();
        let resolution = reconciler.resolve(&mut ctx, &conflict, Decision::KeepLocal, &mut pending);

        assert!(ctx.privileged.contains("u1"));
        assert_eq!(pending.get("u1"), Some(&IndexUpdate::Set("a@x".to_string())));
        match resolution {
            Resolution::WriteThrough(plan) => {
                assert_eq!(plan.claims.get("admin"), Some(&json!(true)));
                // keys outside the permission set survive the write
                assert_eq!(plan.claims.get("legacy"), Some(&json!(1)));
                assert_eq!(plan.intended, conflict.cached);
            }
            other => panic!("expected a write, got {:?}", other),
        }
    }

    #[test]
    fn test_take_remote_recaches_and_leaves_index() {
        let permissions = PermissionSet::default();
        let reconciler = Reconciler::new(&permissions);
        let mut ctx = ReconciliationContext::new();
        reconciler.reconcile(
            &mut ctx,
            &record("u1", "a@x", json!({"admin": true})),
            OperationKind::List,
        );
        ctx.privileged.insert("u1");

        let conflict = conflict_of(reconciler.reconcile(
            &mut ctx,
            &record("u1", "a@x", json!({})),
            OperationKind::List,
        ));
        let mut pending = IndexUpdates::new();
        let resolution =
            reconciler.resolve(&mut ctx, &conflict, Decision::TakeRemote, &mut pending);

        assert_eq!(resolution, Resolution::RemoteWins);
        assert!(pending.is_empty());
        assert!(ctx.privileged.contains("u1"));
        assert!(!ctx.cache.get("u1").unwrap().claims.has_any());
    }

    #[test]
    fn test_malformed_claim_is_treated_as_absent() {
        let permissions = PermissionSet::default();
        let reconciler = Reconciler::new(&permissions);

        let claims = reconciler.remote_claims(&record(
            "u1",
            "a@x",
            json!({"admin": "soon", "consultant": true}),
        ));
        assert_eq!(claims.get("admin"), Some(&Claim::Flag(false)));
        assert_eq!(claims.get("consultant"), Some(&Claim::Flag(true)));
    }
}
