use clap::Args;

use crate::render::render_users;
use crate::session::Session;
use crate::state::StateError;

/// Show the current view with unsaved edits applied, without remote calls
#[derive(Args, Debug, Clone)]
pub struct Show;

#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Show {
    type Error = ShowError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = Session::open(ctx)?;
        Ok(render_users(&session.context, &session.permissions()?))
    }
}
