use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::decide::{Decider, Decision};
use crate::reconcile::ConflictDescriptor;

#[derive(Debug, Default)]
struct Script {
    queued: VecDeque<Decision>,
    seen: Vec<ConflictDescriptor>,
    delay: Option<Duration>,
}

/// Decider answering from a queue of decisions
///
/// Once the queue is empty every conflict gets the fallback. Clones share
/// the queue and the record of conflicts seen.
#[derive(Debug, Clone)]
pub struct ScriptedDecider {
    fallback: Decision,
    script: Arc<Mutex<Script>>,
}

impl ScriptedDecider {
    pub fn new(fallback: Decision) -> Self {
        Self {
            fallback,
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    pub fn push(&self, decision: Decision) {
        self.script.lock().queued.push_back(decision);
    }

    /// Take `delay` before answering each conflict, like an operator would
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.script.lock().delay = delay;
    }

    /// Conflicts presented so far, in order
    pub fn seen(&self) -> Vec<ConflictDescriptor> {
        self.script.lock().seen.clone()
    }

    pub fn conflicts(&self) -> usize {
        self.script.lock().seen.len()
    }
}

#[async_trait]
impl Decider for ScriptedDecider {
    async fn decide(&self, conflict: &ConflictDescriptor) -> Decision {
        let (decision, delay) = {
            let mut script = self.script.lock();
            script.seen.push(conflict.clone());
            let decision = script.queued.pop_front().unwrap_or(self.fallback);
            (decision, script.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        decision
    }
}
