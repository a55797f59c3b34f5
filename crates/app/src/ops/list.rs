use clap::Args;

use common::error::EngineError;

use crate::render::render_users;
use crate::session::Session;
use crate::state::StateError;

/// Show every user the index document lists as privileged
#[derive(Args, Debug, Clone)]
pub struct List;

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("list failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for List {
    type Error = ListError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut session = Session::open(ctx)?;
        let result = session
            .engine(ctx)?
            .list(&mut session.context, &ctx.cancel)
            .await;
        session.persist()?;
        let report = result?;

        let mut output = render_users(&session.context, &session.permissions()?);
        if !report.not_found.is_empty() {
            output.push_str(&format!(
                "\nIndexed but unknown to the identity provider: {}",
                report.not_found.join(", ")
            ));
        }
        if !report.inconsistent.is_empty() {
            output.push_str(&format!(
                "\nIndexed without any claim: {}",
                report.inconsistent.join(", ")
            ));
        }
        Ok(output)
    }
}
