//! Decision port for reconciliation conflicts
//!
//! The engine stops at every conflicting record and asks its [`Decider`]
//! which side wins. Interactive front ends implement the trait over their
//! own prompt; [`AlwaysKeepLocal`] and [`AlwaysTakeRemote`] cover
//! unattended runs.

use async_trait::async_trait;

use crate::reconcile::ConflictDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Write the local or intended claims back to the identity provider
    KeepLocal,
    /// Discard the local side and adopt the remote claims
    TakeRemote,
}

#[async_trait]
pub trait Decider: Send + Sync + std::fmt::Debug {
    async fn decide(&self, conflict: &ConflictDescriptor) -> Decision;
}

/// Every conflict keeps the local side
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysKeepLocal;

#[async_trait]
impl Decider for AlwaysKeepLocal {
    async fn decide(&self, _conflict: &ConflictDescriptor) -> Decision {
        Decision::KeepLocal
    }
}

/// Every conflict takes the remote side
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysTakeRemote;

#[async_trait]
impl Decider for AlwaysTakeRemote {
    async fn decide(&self, _conflict: &ConflictDescriptor) -> Decision {
        Decision::TakeRemote
    }
}
