use clap::Args;

use common::error::EngineError;
use common::provider::SearchField;

use crate::render::render_users;
use crate::session::Session;
use crate::state::StateError;

/// Find users by email or display name prefix
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct Search {
    /// Email prefix
    #[arg(long)]
    pub email: Option<String>,

    /// Display name prefix
    #[arg(long)]
    pub name: Option<String>,
}

impl Search {
    fn query(&self) -> (SearchField, &str) {
        match (&self.email, &self.name) {
            (Some(email), _) => (SearchField::Email, email.as_str()),
            (None, Some(name)) => (SearchField::Name, name.as_str()),
            (None, None) => (SearchField::Email, ""),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("search failed: {0}")]
    Engine(#[from] EngineError),
}

#[async_trait::async_trait]
impl crate::op::Op for Search {
    type Error = SearchError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (field, prefix) = self.query();

        let mut session = Session::open(ctx)?;
        let result = session
            .engine(ctx)?
            .search(&mut session.context, field, prefix, &ctx.cancel)
            .await;
        session.persist()?;
        let report = result?;

        let mut output = render_users(&session.context, &session.permissions()?);
        if report.pending_edits > 0 {
            output.push_str(&format!(
                "\nWarning: {} user(s) still have unsaved edits",
                report.pending_edits
            ));
        }
        Ok(output)
    }
}
