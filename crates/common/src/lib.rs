/**
 * Permission claims, their diffs and merges,
 *  and the permission set they are keyed by.
 */
pub mod claims;
/**
 * Local state every workflow reads and mutates:
 *  user cache, pending edits, privileged view.
 */
pub mod context;
pub mod deadline;
/**
 * Decision port the engine asks when a remote
 *  record conflicts with local state.
 */
pub mod decide;
/**
 * Transaction coordinator running the
 *  List, Search, Refresh and Save workflows.
 */
pub mod engine;
pub mod error;
pub mod fetch;
/**
 * Capability traits for the identity provider
 *  and the index document store, plus
 *  in-memory implementations.
 */
pub mod provider;
pub mod reconcile;
/**
 * Fixtures and scripted collaborators for tests.
 * Built for this crate's own tests, or with the `testkit` feature.
 */
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
pub mod user;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::claims::{Claim, ClaimError, ClaimsMap, ExpiryPresets, Permission, PermissionSet};
    pub use crate::context::{ReconciliationContext, View};
    pub use crate::decide::{AlwaysKeepLocal, AlwaysTakeRemote, Decider, Decision};
    pub use crate::engine::{
        Engine, EngineConfig, ListReport, RefreshReport, SaveReport, SearchReport,
    };
    pub use crate::error::EngineError;
    pub use crate::provider::{
        IdentityProvider, IndexStore, MemoryIdentityProvider, MemoryIndexStore, ProviderError,
        SearchField,
    };
    pub use crate::reconcile::ConflictDescriptor;
    pub use crate::user::User;
    pub use crate::version::build_info;
}
