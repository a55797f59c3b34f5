use chrono::{NaiveDate, Utc};
use clap::Args;

use common::claims::{start_of_day, Claim, ClaimError, ExpiryPresets, TimedError};
use common::error::EngineError;

use crate::session::Session;
use crate::state::StateError;

/// Stage a claim edit for a cached user; nothing is written until `save`
#[derive(Args, Debug, Clone)]
pub struct Set {
    /// UID or email of a user shown by `list` or `search`
    pub user: String,

    /// Permission key
    pub permission: String,

    /// `true`, `false`, an expiry date `YYYY-MM-DD`, or `+<preset>` counted from today
    pub value: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SetError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Claim(#[from] ClaimError),
    #[error(transparent)]
    Expiry(#[from] TimedError),
}

/// Parse a claim typed on the command line
///
/// `+label` resolves an expiry preset, or a literal offset such as `+10d`,
/// starting from `today`.
pub fn parse_claim_value(
    value: &str,
    presets: &ExpiryPresets,
    today: NaiveDate,
) -> Result<Claim, SetError> {
    match value.trim().strip_prefix('+') {
        Some(label) => Ok(Claim::Expires(
            presets.expiry_from(start_of_day(today), label)?,
        )),
        None => Ok(value.parse()?),
    }
}

#[async_trait::async_trait]
impl crate::op::Op for Set {
    type Error = SetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut session = Session::open(ctx)?;
        let presets = session.state.config.presets()?;
        let claim = parse_claim_value(&self.value, &presets, Utc::now().date_naive())?;

        let uid = session
            .engine(ctx)?
            .set_claim(&mut session.context, &self.user, &self.permission, claim)?;
        session.persist()?;

        let pending = session.context.actions.len();
        Ok(format!(
            "{} {} = {} staged ({} user(s) with unsaved edits)",
            uid, self.permission, claim, pending
        ))
    }
}
