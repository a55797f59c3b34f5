use clap::Args;

use common::error::EngineError;

use crate::render::render_users;
use crate::session::Session;
use crate::state::StateError;

/// Scan every user and rebuild the privileged-user index
#[derive(Args, Debug, Clone)]
pub struct Refresh;

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("refresh failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Refresh {
    type Error = RefreshError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut session = Session::open(ctx)?;
        let result = session
            .engine(ctx)?
            .refresh(&mut session.context, &ctx.cancel)
            .await;
        session.persist()?;
        let report = result?;

        let mut output = render_users(&session.context, &session.permissions()?);
        output.push_str(&format!("\nIndex entries updated: {}", report.index_updates));
        if !report.not_found.is_empty() {
            output.push_str(&format!(
                "\nRemoved from the index, no longer existing: {}",
                report.not_found.join(", ")
            ));
        }
        Ok(output)
    }
}
