use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::claims::ClaimsMap;
use crate::context::LocalCache;

/// A locally cached identity-provider user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable identity-provider key, joins every store
    pub uid: String,
    pub email: String,
    pub name: String,
    /// Last known committed claims
    pub claims: ClaimsMap,
}

/// Named users first, then by name, then by email
pub fn display_order(a: &User, b: &User) -> Ordering {
    a.name
        .is_empty()
        .cmp(&b.name.is_empty())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.email.cmp(&b.email))
        .then_with(|| a.uid.cmp(&b.uid))
}

/// Sort UIDs for display using the users cached for them
///
/// UIDs missing from the cache sort after every cached user, by UID.
pub fn sort_by_name_then_email(uids: &mut [String], cache: &LocalCache) {
    uids.sort_by(|a, b| match (cache.get(a), cache.get(b)) {
        (Some(ua), Some(ub)) => display_order(ua, ub),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(uid: &str, name: &str, email: &str) -> User {
        User {
            uid: uid.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            claims: ClaimsMap::new(),
        }
    }

    #[test]
    fn test_named_first_then_email() {
        let mut cache = LocalCache::default();
        cache.insert(user("z", "", "z@x"));
        cache.insert(user("bob", "Bob", "b@x"));
        cache.insert(user("a", "", "a@x"));

        let mut uids = vec!["z".to_string(), "bob".to_string(), "a".to_string()];
        sort_by_name_then_email(&mut uids, &cache);

        assert_eq!(uids, vec!["bob", "a", "z"]);
    }

    #[test]
    fn test_name_then_email_tiebreak() {
        let mut cache = LocalCache::default();
        cache.insert(user("1", "Carol", "c2@x"));
        cache.insert(user("2", "Alice", "a@x"));
        cache.insert(user("3", "Carol", "c1@x"));

        let mut uids = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        sort_by_name_then_email(&mut uids, &cache);

        assert_eq!(uids, vec!["2", "3", "1"]);
    }

    #[test]
    fn test_uncached_sort_last() {
        let mut cache = LocalCache::default();
        cache.insert(user("known", "", "k@x"));

        let mut uids = vec!["ghost-b".to_string(), "known".to_string(), "ghost-a".to_string()];
        sort_by_name_then_email(&mut uids, &cache);

        assert_eq!(uids, vec!["known", "ghost-a", "ghost-b"]);
    }
}
