use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub mod error;

pub use error::ActionError;

pub type ActionResult<T> = std::result::Result<T, error::ActionError>;

/// A coordinate on the fleet's work floor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
}

impl Pose {
    /// Positional equality within the fleet's reporting precision.
    pub fn is_at(&self, other: &Pose) -> bool {
        (self.x - other.x).abs() < 1e-6 && (self.y - other.y).abs() < 1e-6
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    Idle,
    Working,
}

/// Last observed snapshot of a single device.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceState {
    pub name: String,
    pub status: DeviceStatus,
    pub current_pose: Pose,
}

/// The seam between the workflow engine and whatever performs real work.
///
/// Job bodies and conditional predicates only ever see this trait; the
/// engine itself has no knowledge of how devices are tracked or commanded.
#[async_trait]
pub trait ActionEnv: Send + Sync {
    /// Block until `device` reports idle, returning its last observed state.
    async fn acquire_idle(
        &self,
        device: &str,
        cancel: &CancellationToken,
    ) -> ActionResult<DeviceState>;

    /// Ask the fleet to move `device` toward `target`. Returns once the
    /// command has been accepted, not once the device arrives.
    async fn dispatch(&self, device: &str, target: Pose) -> ActionResult<()>;

    /// Last known state of `device`, if the device is known at all.
    async fn observe(&self, device: &str) -> Option<DeviceState>;
}
