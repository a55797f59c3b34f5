use std::path::PathBuf;

use clap::Args;

use crate::state::{AppConfig, AppState, BackendConfig};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Store file for users and the index document (default: store.json in the state directory)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Seconds every remote call may take
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig {
            backend: BackendConfig::File {
                path: self.store.clone(),
            },
            ..AppConfig::default()
        };
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
            config.operation_timeout_secs = config.operation_timeout_secs.max(timeout_secs);
        }

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let permissions: Vec<&str> = state
            .config
            .permissions
            .iter()
            .map(|p| p.key.as_str())
            .collect();

        let output = format!(
            "Initialized warden directory at: {}\n\
             - Config: {}\n\
             - Store: {}\n\
             - Session: {}\n\
             - Log: {}\n\
             - Permissions: {}\n\
             - Timeout: {}s",
            state.warden_dir.display(),
            state.config_path.display(),
            state.store_path().display(),
            state.session_path.display(),
            state.log_path().display(),
            permissions.join(", "),
            state.config.timeout_secs
        );

        Ok(output)
    }
}
