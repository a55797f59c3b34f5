//! Local state shared by every workflow
//!
//! A [`ReconciliationContext`] bundles the three local views the engine
//! keeps in step with the remote stores: the [`LocalCache`] of users seen
//! so far, the [`ActionBuffer`] of uncommitted edits, and the
//! [`PrivilegedIndex`] view of the index document. It is created once per
//! session and passed by reference into every workflow; workflows must not
//! run concurrently against the same context.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::claims::{Claim, ClaimsMap};
use crate::user::User;

/// Users seen so far, keyed by UID
///
/// Entries are created on first sighting and updated in place afterwards.
/// Nothing is ever evicted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalCache {
    users: HashMap<String, User>,
}

impl LocalCache {
    pub fn get(&self, uid: &str) -> Option<&User> {
        self.users.get(uid)
    }

    pub fn get_mut(&mut self, uid: &str) -> Option<&mut User> {
        self.users.get_mut(uid)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.users.contains_key(uid)
    }

    pub fn insert(&mut self, user: User) {
        self.users.insert(user.uid.clone(), user);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Replace the committed claims of a cached user
    pub fn set_claims(&mut self, uid: &str, claims: ClaimsMap) {
        if let Some(user) = self.users.get_mut(uid) {
            user.claims = claims;
        }
    }

    /// Look a user up by UID, falling back to an exact email match
    pub fn find(&self, uid_or_email: &str) -> Option<&User> {
        self.users
            .get(uid_or_email)
            .or_else(|| self.users.values().find(|u| u.email == uid_or_email))
    }

    /// Display email for a UID, or the UID itself when uncached
    pub fn email_or_uid(&self, uid: &str) -> String {
        match self.users.get(uid) {
            Some(user) if !user.email.is_empty() => user.email.clone(),
            _ => uid.to_string(),
        }
    }
}

/// Pending, uncommitted claim edits keyed by UID
///
/// Only permissions whose desired value differs from the committed one are
/// held. A UID disappears as soon as its last edit is reverted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionBuffer {
    actions: BTreeMap<String, ClaimsMap>,
}

impl ActionBuffer {
    pub fn get(&self, uid: &str) -> Option<&ClaimsMap> {
        self.actions.get(uid)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// UIDs with pending edits, in ascending order
    pub fn uids(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClaimsMap)> {
        self.actions.iter()
    }

    /// Record that `uid` should end up with `claim` for `key`
    ///
    /// An edit equal to the committed value cancels any pending edit for
    /// that permission instead of being stored.
    pub fn stage(&mut self, uid: &str, key: &str, claim: Claim, committed: Option<&Claim>) {
        if committed.is_some_and(|current| !claim.differs(current)) {
            if let Some(edits) = self.actions.get_mut(uid) {
                edits.remove(key);
                if edits.is_empty() {
                    self.actions.remove(uid);
                }
            }
            return;
        }

        self.actions
            .entry(uid.to_string())
            .or_default()
            .insert(key.to_string(), claim);
    }

    pub fn remove(&mut self, uid: &str) -> Option<ClaimsMap> {
        self.actions.remove(uid)
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }
}

/// Local view of which UIDs the index document lists as privileged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegedIndex {
    uids: BTreeSet<String>,
}

impl PrivilegedIndex {
    pub fn contains(&self, uid: &str) -> bool {
        self.uids.contains(uid)
    }

    pub fn insert(&mut self, uid: &str) -> bool {
        self.uids.insert(uid.to_string())
    }

    pub fn remove(&mut self, uid: &str) -> bool {
        self.uids.remove(uid)
    }

    pub fn set(&mut self, uid: &str, privileged: bool) {
        if privileged {
            self.insert(uid);
        } else {
            self.remove(uid);
        }
    }

    /// Forget the current view and adopt `uids`
    pub fn replace<I, S>(&mut self, uids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uids = uids.into_iter().map(Into::into).collect();
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.uids.iter()
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }
}

/// Which user list is currently shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    List,
    Search,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationContext {
    pub cache: LocalCache,
    pub actions: ActionBuffer,
    pub privileged: PrivilegedIndex,
    view: View,
    list_users: Vec<String>,
    search_users: Vec<String>,
}

impl ReconciliationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn set_view(&mut self, view: View) {
        self.view = view;
    }

    /// The sorted user list of the current view
    pub fn visible(&self) -> &[String] {
        self.users_of(self.view)
    }

    pub fn users_of(&self, view: View) -> &[String] {
        match view {
            View::List => &self.list_users,
            View::Search => &self.search_users,
        }
    }

    /// Store the user list for `view` and switch to it
    pub fn show(&mut self, view: View, uids: Vec<String>) {
        match view {
            View::List => self.list_users = uids,
            View::Search => self.search_users = uids,
        }
        self.view = view;
    }

    /// Committed claims with pending edits applied
    pub fn effective_claims(&self, uid: &str) -> Option<ClaimsMap> {
        let user = self.cache.get(uid)?;
        Some(match self.actions.get(uid) {
            Some(edits) => user.claims.overlay(edits),
            None => user.claims.clone(),
        })
    }

    /// Visible users paired with their effective claims
    pub fn visible_users(&self) -> Vec<(&User, ClaimsMap)> {
        self.visible()
            .iter()
            .filter_map(|uid| {
                let user = self.cache.get(uid)?;
                let claims = self.effective_claims(uid)?;
                Some((user, claims))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::PermissionSet;

    fn cached(uid: &str, email: &str) -> User {
        User {
            uid: uid.to_string(),
            email: email.to_string(),
            name: String::new(),
            claims: PermissionSet::default().template(),
        }
    }

    #[test]
    fn test_stage_and_revert() {
        let mut actions = ActionBuffer::default();
        let committed = Claim::Flag(false);

        actions.stage("u1", "admin", Claim::Flag(true), Some(&committed));
        assert_eq!(actions.get("u1").unwrap().get("admin"), Some(&Claim::Flag(true)));

        // reverting to the committed value drops the whole entry
        actions.stage("u1", "admin", Claim::Flag(false), Some(&committed));
        assert!(actions.get("u1").is_none());
        assert!(actions.is_empty());
    }

    #[test]
    fn test_revert_keeps_other_edits() {
        let mut actions = ActionBuffer::default();
        let committed = Claim::Flag(false);

        actions.stage("u1", "admin", Claim::Flag(true), Some(&committed));
        actions.stage("u1", "consultant", Claim::Flag(true), Some(&committed));
        actions.stage("u1", "admin", Claim::Flag(false), Some(&committed));

        let edits = actions.get("u1").unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits.get("consultant"), Some(&Claim::Flag(true)));
    }

    #[test]
    fn test_effective_claims_overlay() {
        let mut ctx = ReconciliationContext::new();
        ctx.cache.insert(cached("u1", "a@x"));
        ctx.actions
            .stage("u1", "admin", Claim::Flag(true), Some(&Claim::Flag(false)));

        let effective = ctx.effective_claims("u1").unwrap();
        assert_eq!(effective.get("admin"), Some(&Claim::Flag(true)));
        // the cache keeps the committed value
        assert_eq!(
            ctx.cache.get("u1").unwrap().claims.get("admin"),
            Some(&Claim::Flag(false))
        );
        assert!(ctx.effective_claims("nobody").is_none());
    }

    #[test]
    fn test_views_keep_separate_lists() {
        let mut ctx = ReconciliationContext::new();
        ctx.cache.insert(cached("u1", "a@x"));
        ctx.cache.insert(cached("u2", "b@x"));

        ctx.show(View::List, vec!["u1".to_string()]);
        ctx.show(View::Search, vec!["u2".to_string()]);
        assert_eq!(ctx.visible(), ["u2".to_string()]);

        ctx.set_view(View::List);
        assert_eq!(ctx.visible(), ["u1".to_string()]);
        assert_eq!(ctx.visible_users()[0].0.email, "a@x");
    }

    #[test]
    fn test_find_by_email() {
        let mut cache = LocalCache::default();
        cache.insert(cached("u1", "a@x"));
        assert_eq!(cache.find("a@x").unwrap().uid, "u1");
        assert_eq!(cache.find("u1").unwrap().uid, "u1");
        assert_eq!(cache.email_or_uid("u9"), "u9");
    }
}
