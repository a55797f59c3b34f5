use crate::claims::{Claim, ClaimError};
use crate::context::ReconciliationContext;
use crate::error::EngineError;

use super::Engine;

impl Engine {
    /// Stage `claim` as the desired value of `key` for a cached user
    ///
    /// The user may be given by UID or email. Setting a permission back to
    /// its committed value drops the pending edit. Returns the user's UID.
    pub fn set_claim(
        &self,
        ctx: &mut ReconciliationContext,
        uid_or_email: &str,
        key: &str,
        claim: Claim,
    ) -> Result<String, EngineError> {
        self.config.permissions.ensure(key).map_err(|e| match e {
            ClaimError::UnknownPermission(key) => EngineError::UnknownPermission(key),
            other => EngineError::Claim(other),
        })?;

        let user = ctx
            .cache
            .find(uid_or_email)
            .ok_or_else(|| EngineError::UnknownUser(uid_or_email.to_string()))?;
        let uid = user.uid.clone();
        let committed = user.claims.get(key).copied().unwrap_or_default();

        ctx.actions.stage(&uid, key, claim, Some(&committed));
        tracing::debug!("staged {}={} for {}", key, claim, uid);
        Ok(uid)
    }

    /// Drop every pending edit, returning how many users had some
    pub fn cancel(&self, ctx: &mut ReconciliationContext) -> Result<usize, EngineError> {
        if ctx.actions.is_empty() {
            return Err(EngineError::NoChanges);
        }
        let dropped = ctx.actions.len();
        ctx.actions.clear();
        tracing::info!("cancelled pending edits of {} users", dropped);
        Ok(dropped)
    }
}
