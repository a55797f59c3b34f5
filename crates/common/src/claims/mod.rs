//! Permission claims and the maps that hold them
//!
//! A [`Claim`] is one permission's value for one user: either a boolean
//! flag or an expiry date, never both. A [`ClaimsMap`] holds one claim per
//! permission of the configured [`PermissionSet`]; maps built through
//! [`PermissionSet::template`] or [`PermissionSet::filter`] always carry
//! every known key.
//!
//! Every diff and merge here returns a new value and leaves its inputs
//! untouched, so cached maps can be shared freely across read paths.

pub mod timed;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use timed::{ExpiryPresets, TimedError, TimedOffset};

/// Wire format of dated claims
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Custom claims exactly as the identity provider stores them
pub type RawClaims = serde_json::Map<String, Value>;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// A stored claim is neither a boolean nor a parseable date
    #[error("wrong claim value in database for '{key}': {value}")]
    WrongDBClaim { key: String, value: String },
    /// The permission is not part of the configured set
    #[error("unknown permission: {0}")]
    UnknownPermission(String),
    /// User supplied claim text that is neither a boolean nor a date
    #[error("invalid claim value '{0}', expected true, false or YYYY-MM-DD")]
    InvalidValue(String),
}

/// One permission's value for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Claim {
    Flag(bool),
    Expires(DateTime<Utc>),
}

impl Default for Claim {
    fn default() -> Self {
        Claim::Flag(false)
    }
}

impl Claim {
    /// Parse a claim value read from the identity provider
    pub fn from_raw(key: &str, value: &Value) -> Result<Self, ClaimError> {
        let wrong = || ClaimError::WrongDBClaim {
            key: key.to_string(),
            value: value.to_string(),
        };

        match value {
            Value::Bool(checked) => Ok(Claim::Flag(*checked)),
            Value::String(text) => parse_date(text).map(Claim::Expires).ok_or_else(wrong),
            _ => Err(wrong()),
        }
    }

    /// The value to store remotely, `None` meaning the key is removed
    pub fn to_raw(&self) -> Option<Value> {
        match self {
            Claim::Flag(false) => None,
            Claim::Flag(true) => Some(Value::Bool(true)),
            Claim::Expires(date) => Some(Value::String(date.format(DATE_FORMAT).to_string())),
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Claim::Flag(false))
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        match self {
            Claim::Expires(date) => Some(*date),
            Claim::Flag(_) => None,
        }
    }

    /// Whether two claims hold different values
    ///
    /// Dates are compared at day granularity: two expiry dates on the same
    /// calendar day never differ.
    pub fn differs(&self, other: &Claim) -> bool {
        match (self, other) {
            (Claim::Flag(a), Claim::Flag(b)) => a != b,
            (Claim::Expires(a), Claim::Expires(b)) => a.date_naive() != b.date_naive(),
            _ => true,
        }
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Claim::Flag(checked) => write!(f, "{}", checked),
            Claim::Expires(date) => write!(f, "{}", date.format(DATE_FORMAT)),
        }
    }
}

impl FromStr for Claim {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "true" => Ok(Claim::Flag(true)),
            "false" => Ok(Claim::Flag(false)),
            other => parse_date(other)
                .map(Claim::Expires)
                .ok_or_else(|| ClaimError::InvalidValue(s.to_string())),
        }
    }
}

/// Midnight UTC of the given calendar day
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(text, DATE_FORMAT) {
        return Some(start_of_day(date));
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// A permission known to the system, with its display label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub key: String,
    pub label: String,
}

impl Permission {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// The fixed, ordered set of permissions this system manages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSet {
    permissions: Vec<Permission>,
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::new(vec![
            Permission::new("consultant", "Consultant"),
            Permission::new("admin", "Admin"),
        ])
    }
}

impl PermissionSet {
    /// Duplicate keys keep their first occurrence
    pub fn new(permissions: Vec<Permission>) -> Self {
        let mut unique: Vec<Permission> = Vec::with_capacity(permissions.len());
        for permission in permissions {
            if !unique.iter().any(|p| p.key == permission.key) {
                unique.push(permission);
            }
        }
        Self {
            permissions: unique,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.permissions.iter().map(|p| p.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.permissions.iter().any(|p| p.key == key)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.permissions
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.label.as_str())
    }

    pub fn ensure(&self, key: &str) -> Result<(), ClaimError> {
        if self.contains(key) {
            Ok(())
        } else {
            Err(ClaimError::UnknownPermission(key.to_string()))
        }
    }

    /// A map holding the zero claim for every known permission
    pub fn template(&self) -> ClaimsMap {
        self.keys()
            .map(|key| (key.to_string(), Claim::default()))
            .collect()
    }

    /// Reduce raw remote claims to the known permissions
    ///
    /// Unknown keys are dropped. Values that cannot be read as claims are
    /// returned as errors and left at their zero value in the map.
    pub fn filter(&self, raw: &RawClaims) -> (ClaimsMap, Vec<ClaimError>) {
        let mut claims = self.template();
        let mut errors = Vec::new();

        for (key, value) in raw {
            if !self.contains(key) {
                continue;
            }
            match Claim::from_raw(key, value) {
                Ok(claim) => {
                    claims.insert(key.clone(), claim);
                }
                Err(e) => errors.push(e),
            }
        }

        (claims, errors)
    }
}

/// Claims keyed by permission name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimsMap(BTreeMap<String, Claim>);

impl ClaimsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Claim> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: String, claim: Claim) -> Option<Claim> {
        self.0.insert(key, claim)
    }

    pub fn remove(&mut self, key: &str) -> Option<Claim> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Claim)> {
        self.0.iter()
    }

    /// Whether at least one claim is set
    pub fn has_any(&self) -> bool {
        self.0.values().any(|claim| !claim.is_zero())
    }

    /// Field-wise comparison using [`Claim::differs`]
    pub fn differs(&self, other: &ClaimsMap) -> bool {
        if self.0.len() != other.0.len() {
            return true;
        }
        self.0.iter().any(|(key, claim)| match other.0.get(key) {
            Some(theirs) => claim.differs(theirs),
            None => true,
        })
    }

    /// A copy of this map with `edits` laid over it
    pub fn overlay(&self, edits: &ClaimsMap) -> ClaimsMap {
        let mut merged = self.clone();
        for (key, claim) in edits.iter() {
            merged.0.insert(key.clone(), *claim);
        }
        merged
    }

    /// Entries of `other` that are absent from, or differ from, `self`
    pub fn diff_asymmetric(&self, other: &ClaimsMap) -> ClaimsMap {
        other
            .iter()
            .filter(|(key, claim)| match self.0.get(*key) {
                Some(ours) => ours.differs(claim),
                None => true,
            })
            .map(|(key, claim)| (key.clone(), *claim))
            .collect()
    }

    /// `(plus, minus)`: what `other` adds over `self`, and what it takes away
    pub fn diff(&self, other: &ClaimsMap) -> (ClaimsMap, ClaimsMap) {
        (self.diff_asymmetric(other), other.diff_asymmetric(self))
    }
}

impl FromIterator<(String, Claim)> for ClaimsMap {
    fn from_iter<I: IntoIterator<Item = (String, Claim)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ClaimsMap {
    type Item = (&'a String, &'a Claim);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Claim>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ClaimsMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(key, claim)| format!("{}={}", key, claim))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Lay `edits` over a copy of the raw remote claims
///
/// Keys the edits do not mention, including ones outside the permission
/// set, are preserved. A false flag removes its key.
pub fn merge_raw(base: &RawClaims, edits: &ClaimsMap) -> RawClaims {
    let mut merged = base.clone();
    for (key, claim) in edits.iter() {
        match claim.to_raw() {
            Some(value) => {
                merged.insert(key.clone(), value);
            }
            None => {
                merged.remove(key);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(y: i32, m: u32, d: u32, h: u32) -> Claim {
        Claim::Expires(Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap())
    }

    fn claims(entries: &[(&str, Claim)]) -> ClaimsMap {
        let mut map = PermissionSet::default().template();
        for (key, claim) in entries {
            map.insert(key.to_string(), *claim);
        }
        map
    }

    #[test]
    fn test_same_day_never_differs() {
        assert!(!at(2025, 3, 1, 0).differs(&at(2025, 3, 1, 23)));
        assert!(!at(2025, 3, 1, 9).differs(&at(2025, 3, 1, 9)));
    }

    #[test]
    fn test_different_days_differ() {
        assert!(at(2025, 3, 1, 23).differs(&at(2025, 3, 2, 0)));
        assert!(at(2024, 3, 1, 12).differs(&at(2025, 3, 1, 12)));
    }

    #[test]
    fn test_flag_and_date_differ() {
        assert!(Claim::Flag(true).differs(&Claim::Flag(false)));
        assert!(!Claim::Flag(true).differs(&Claim::Flag(true)));
        assert!(Claim::Flag(false).differs(&at(2025, 1, 1, 0)));
        assert!(at(2025, 1, 1, 0).differs(&Claim::Flag(true)));
    }

    #[test]
    fn test_from_raw() {
        assert_eq!(
            Claim::from_raw("admin", &json!(true)).unwrap(),
            Claim::Flag(true)
        );
        assert_eq!(
            Claim::from_raw("admin", &json!("2025-06-30")).unwrap(),
            at(2025, 6, 30, 0)
        );
        assert_eq!(
            Claim::from_raw("admin", &json!("2025-06-30T10:00:00Z")).unwrap(),
            at(2025, 6, 30, 10)
        );
        assert!(matches!(
            Claim::from_raw("admin", &json!(42)),
            Err(ClaimError::WrongDBClaim { .. })
        ));
        assert!(matches!(
            Claim::from_raw("admin", &json!("next tuesday")),
            Err(ClaimError::WrongDBClaim { .. })
        ));
    }

    #[test]
    fn test_to_raw() {
        assert_eq!(Claim::Flag(false).to_raw(), None);
        assert_eq!(Claim::Flag(true).to_raw(), Some(json!(true)));
        assert_eq!(at(2025, 6, 30, 17).to_raw(), Some(json!("2025-06-30")));
    }

    #[test]
    fn test_parse_input() {
        assert_eq!("true".parse::<Claim>().unwrap(), Claim::Flag(true));
        assert_eq!(" false ".parse::<Claim>().unwrap(), Claim::Flag(false));
        assert_eq!("2026-01-02".parse::<Claim>().unwrap(), at(2026, 1, 2, 0));
        assert!(matches!(
            "yes".parse::<Claim>(),
            Err(ClaimError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_filter_drops_unknown_and_fills_defaults() {
        let perms = PermissionSet::default();
        let raw = json!({"admin": true, "role": "owner", "tier": 3});
        let (filtered, errors) = perms.filter(raw.as_object().unwrap());

        assert!(errors.is_empty());
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.get("admin"), Some(&Claim::Flag(true)));
        assert_eq!(filtered.get("consultant"), Some(&Claim::Flag(false)));
        assert!(filtered.get("role").is_none());
    }

    #[test]
    fn test_filter_reports_wrong_claims_as_absent() {
        let perms = PermissionSet::default();
        let raw = json!({"admin": [1, 2], "consultant": true});
        let (filtered, errors) = perms.filter(raw.as_object().unwrap());

        assert_eq!(errors.len(), 1);
        assert_eq!(filtered.get("admin"), Some(&Claim::Flag(false)));
        assert_eq!(filtered.get("consultant"), Some(&Claim::Flag(true)));
    }

    #[test]
    fn test_map_differs_truncates_dates() {
        let a = claims(&[("admin", at(2025, 5, 5, 1))]);
        let b = claims(&[("admin", at(2025, 5, 5, 22))]);
        let c = claims(&[("admin", at(2025, 5, 6, 1))]);

        assert!(!a.differs(&b));
        assert!(a.differs(&c));
        assert!(a.differs(&ClaimsMap::new()));
    }

    #[test]
    fn test_diff_then_merge_restores_both_sides() {
        let samples = [
            claims(&[]),
            claims(&[("admin", Claim::Flag(true))]),
            claims(&[("consultant", at(2030, 1, 1, 0))]),
            // same day as above, later hour
            claims(&[("consultant", at(2030, 1, 1, 18))]),
            claims(&[("consultant", at(2030, 1, 2, 0))]),
            // date where the others hold a flag
            claims(&[("admin", at(2030, 1, 1, 0))]),
            claims(&[
                ("admin", Claim::Flag(true)),
                ("consultant", Claim::Flag(true)),
            ]),
            claims(&[
                ("admin", Claim::Flag(true)),
                ("consultant", at(2031, 6, 30, 12)),
            ]),
        ];

        for (i, a) in samples.iter().enumerate() {
            for (j, b) in samples.iter().enumerate() {
                let (plus, minus) = a.diff(b);
                assert!(!a.overlay(&plus).differs(b), "a={i} b={j}");
                assert!(!b.overlay(&minus).differs(a), "a={i} b={j}");
                assert_eq!(plus.is_empty(), !a.differs(b), "a={i} b={j}");
                assert_eq!(plus.len(), minus.len(), "a={i} b={j}");
            }
        }
    }

    #[test]
    fn test_diff_counts_changed_keys() {
        let a = claims(&[("admin", Claim::Flag(true))]);
        let b = claims(&[("consultant", at(2030, 1, 1, 0))]);

        let (plus, minus) = a.diff(&b);
        assert_eq!(plus.len(), 2);
        assert_eq!(minus.len(), 2);
        assert_eq!(plus.get("consultant"), Some(&at(2030, 1, 1, 0)));
        assert_eq!(minus.get("admin"), Some(&Claim::Flag(true)));
    }

    #[test]
    fn test_diff_of_equal_maps_is_empty() {
        let a = claims(&[("admin", Claim::Flag(true))]);
        let (plus, minus) = a.diff(&a.clone());
        assert!(plus.is_empty());
        assert!(minus.is_empty());
    }

    #[test]
    fn test_overlay_leaves_input_untouched() {
        let base = claims(&[]);
        let edits: ClaimsMap = [("admin".to_string(), Claim::Flag(true))]
            .into_iter()
            .collect();

        let merged = base.overlay(&edits);
        assert_eq!(merged.get("admin"), Some(&Claim::Flag(true)));
        assert_eq!(base.get("admin"), Some(&Claim::Flag(false)));
    }

    #[test]
    fn test_merge_raw_removes_false_and_keeps_foreign_keys() {
        let base = json!({"admin": true, "tier": 3});
        let edits: ClaimsMap = [
            ("admin".to_string(), Claim::Flag(false)),
            ("consultant".to_string(), at(2027, 2, 3, 4)),
        ]
        .into_iter()
        .collect();

        let merged = merge_raw(base.as_object().unwrap(), &edits);
        assert_eq!(
            Value::Object(merged),
            json!({"tier": 3, "consultant": "2027-02-03"})
        );
    }

    #[test]
    fn test_has_any() {
        assert!(!claims(&[]).has_any());
        assert!(claims(&[("admin", Claim::Flag(true))]).has_any());
        assert!(claims(&[("admin", at(2020, 1, 1, 0))]).has_any());
    }

    #[test]
    fn test_permission_set_dedups() {
        let perms = PermissionSet::new(vec![
            Permission::new("admin", "Admin"),
            Permission::new("admin", "Administrator"),
        ]);
        assert_eq!(perms.len(), 1);
        assert_eq!(perms.label("admin"), Some("Admin"));
        assert!(perms.ensure("root").is_err());
    }
}
