use std::sync::Arc;

use snafu::ensure;
use tokio_util::sync::CancellationToken;

use super::node::{Body, Node, NodeStatus};
use super::{Result, error};
use crate::action::{ActionEnv, ActionError, ActionResult, Pose};

impl Node {
    /// Perform this node's variant-specific action and notify children.
    ///
    /// Action-environment failures are folded into the outgoing pass bit
    /// and never abort the run; only engine contract breaches and
    /// cancellation surface as errors. The engine invokes this at most
    /// once per run.
    pub async fn execute(
        &self,
        env: &Arc<dyn ActionEnv>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure!(
            self.status() >= NodeStatus::Activated,
            error::NotActivatedSnafu { id: self.id() }
        );
        match self.body() {
            Body::Root => {
                debug!("started {}", self.name());
                self.broadcast(true)?;
                debug!("completed {}", self.name());
            }
            Body::Job { device, target } => {
                let pass = match self.work(env.as_ref(), device, *target, cancel).await {
                    Ok(()) => true,
                    Err(ActionError::Cancelled) => return error::CancelledSnafu.fail(),
                    Err(e) => {
                        error!("job node {} action failed: {e}", self.name());
                        false
                    }
                };
                info!("job node {} has completed", self.name());
                self.broadcast(pass)?;
            }
            Body::Conditional { check } => {
                info!("conditional node {} has started", self.name());
                let pass = match check.evaluate(env.as_ref(), cancel).await {
                    Ok(outcome) => outcome,
                    Err(ActionError::Cancelled) => return error::CancelledSnafu.fail(),
                    Err(e) => {
                        error!("conditional node {} predicate failed: {e}", self.name());
                        false
                    }
                };
                // Latched before the status flip below, so readers that
                // observe Executed always see the final outcome.
                self.latch(pass);
                info!(
                    "conditional node {} latched {}",
                    self.name(),
                    if pass { "pass" } else { "fail" }
                );
                self.broadcast(pass)?;
            }
            Body::Terminal => {
                info!("terminal node {} is reached", self.name());
                self.emit_done(true)?;
            }
        }
        self.set_executed();
        Ok(())
    }

    async fn work(
        &self,
        env: &dyn ActionEnv,
        device: &str,
        target: Pose,
        cancel: &CancellationToken,
    ) -> ActionResult<()> {
        let state = env.acquire_idle(device, cancel).await?;
        debug!(
            "job node {} acquired {} at ({:.1}, {:.1})",
            self.name(),
            state.name,
            state.current_pose.x,
            state.current_pose.y
        );
        env.dispatch(device, target).await
    }
}
