use std::time::Duration;

use kube::runtime::controller::Action;

use crate::error::Result;

/// What the dispatcher should do after a reconcile step.
///
/// A failed step is `Err`, which the dispatcher requeues with backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Step converged; later steps may run.
    Continue,
    /// Stop without requeueing, e.g. the parent is gone.
    Halt,
    Requeue(Duration),
}

pub type Reconciled = Result<Flow>;

impl Flow {
    pub fn into_action(self, resync: Duration) -> Action {
        match self {
            Flow::Continue => Action::requeue(resync),
            Flow::Halt => Action::await_change(),
            Flow::Requeue(after) => Action::requeue(after),
        }
    }

    /// True when the step result ends this reconcile pass.
    pub fn should_halt_or_requeue(result: &Reconciled) -> bool {
        !matches!(result, Ok(Flow::Continue))
    }
}
