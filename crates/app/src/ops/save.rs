use clap::Args;

use common::error::EngineError;

use crate::session::Session;
use crate::state::StateError;

/// Write every unsaved edit through
#[derive(Args, Debug, Clone)]
pub struct Save;

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("save failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Save {
    type Error = SaveError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut session = Session::open(ctx)?;
        let result = session
            .engine(ctx)?
            .save(&mut session.context, &ctx.cancel)
            .await;
        session.persist()?;
        let report = result?;

        let mut output = report.to_string();
        if !report.discarded.is_empty() {
            output.push_str(&format!(
                "\nEdits discarded in favor of the remote version: {}",
                report.discarded.join(", ")
            ));
        }
        Ok(output)
    }
}
