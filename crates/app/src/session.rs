//! One command's view of the persisted state
//!
//! A [`Session`] loads the config, the file backend and the saved
//! [`ReconciliationContext`], and writes the latter two back when the
//! command is done, whether or not its workflow succeeded: claims written
//! before a failure are real and must not be forgotten.

use std::sync::Arc;

use common::claims::PermissionSet;
use common::context::ReconciliationContext;
use common::decide::{AlwaysKeepLocal, AlwaysTakeRemote, Decider, Decision};
use common::engine::Engine;

use crate::backend::FileBackend;
use crate::op::OpContext;
use crate::prompt::TerminalDecider;
use crate::state::{AppState, StateError};

pub struct Session {
    pub state: AppState,
    pub backend: FileBackend,
    pub context: ReconciliationContext,
}

impl Session {
    pub fn open(ctx: &OpContext) -> Result<Self, StateError> {
        let state = AppState::load(ctx.config_path.clone())?;
        let backend = FileBackend::load(&state.store_path())?;
        let context = state.load_session()?;

        Ok(Self {
            state,
            backend,
            context,
        })
    }

    pub fn permissions(&self) -> Result<PermissionSet, StateError> {
        self.state.config.permission_set()
    }

    pub fn engine(&self, ctx: &OpContext) -> Result<Engine, StateError> {
        let decider: Arc<dyn Decider> = match ctx.decision {
            Some(Decision::KeepLocal) => Arc::new(AlwaysKeepLocal),
            Some(Decision::TakeRemote) => Arc::new(AlwaysTakeRemote),
            None => Arc::new(TerminalDecider),
        };

        Ok(Engine::new(
            Arc::new(self.backend.identity.clone()),
            Arc::new(self.backend.index.clone()),
            decider,
            self.state.config.engine_config()?,
        ))
    }

    pub fn persist(&self) -> Result<(), StateError> {
        self.backend.persist()?;
        self.state.save_session(&self.context)
    }
}
