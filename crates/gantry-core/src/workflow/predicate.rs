use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::action::{ActionEnv, ActionResult, DeviceStatus, Pose};

/// A condition evaluated by a conditional node at execution time. The
/// outcome is latched into the node and decides which gated children the
/// runner discovers afterwards.
#[async_trait]
pub trait Predicate: Send + Sync {
    async fn evaluate(
        &self,
        env: &dyn ActionEnv,
        cancel: &CancellationToken,
    ) -> ActionResult<bool>;
}

/// Predicate with a fixed outcome.
pub struct Fixed(pub bool);

#[async_trait]
impl Predicate for Fixed {
    async fn evaluate(&self, _: &dyn ActionEnv, _: &CancellationToken) -> ActionResult<bool> {
        Ok(self.0)
    }
}

/// Passes once every named device reports idle at the target pose.
pub struct Settled {
    devices: Vec<String>,
    target: Pose,
}

impl Settled {
    pub fn new<S: AsRef<str>>(devices: &[S], target: Pose) -> Self {
        Self {
            devices: devices.iter().map(|d| d.as_ref().to_string()).collect(),
            target,
        }
    }
}

#[async_trait]
impl Predicate for Settled {
    async fn evaluate(&self, env: &dyn ActionEnv, _: &CancellationToken) -> ActionResult<bool> {
        for device in &self.devices {
            match env.observe(device).await {
                Some(state)
                    if state.status == DeviceStatus::Idle
                        && state.current_pose.is_at(&self.target) => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }
}
