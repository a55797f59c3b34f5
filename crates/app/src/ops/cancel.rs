use clap::Args;

use common::error::EngineError;

use crate::session::Session;
use crate::state::StateError;

/// Drop every unsaved edit
#[derive(Args, Debug, Clone)]
pub struct Cancel;

#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Cancel {
    type Error = CancelError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut session = Session::open(ctx)?;
        let dropped = session.engine(ctx)?.cancel(&mut session.context)?;
        session.persist()?;
        Ok(format!("Dropped unsaved edits of {} user(s)", dropped))
    }
}
