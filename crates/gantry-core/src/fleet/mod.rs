//! Mock fleet: an in-process robot store with an HTTP surface, standing
//! in for a real fleet manager during development and demos.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::action::{DeviceState, DeviceStatus, Pose};

mod server;

pub use server::{router, serve};
pub mod error {
    use snafu::Snafu;

    #[derive(Snafu, Debug)]
    #[snafu(visibility(pub))]
    pub enum FleetError {
        #[snafu(display("failed to bind fleet server on port {port}: {source}"))]
        Bind {
            port: u16,
            source: std::io::Error,
        },
        #[snafu(display("fleet server failed: {source}"))]
        Serve { source: std::io::Error },
    }
}

pub use error::FleetError;

pub type FleetResult<T> = std::result::Result<T, error::FleetError>;

/// Number of interpolation steps a robot takes from its current pose to
/// a commanded target.
const NAV_STEPS: u32 = 20;

/// The mock server's view of the fleet.
#[derive(Default)]
pub struct Store {
    robots: DashMap<String, DeviceState>,
}

impl Store {
    /// A store with every named robot idle at the origin.
    pub fn seed<S: AsRef<str>>(names: &[S]) -> Arc<Self> {
        let store = Self::default();
        for name in names {
            store.robots.insert(
                name.as_ref().to_string(),
                DeviceState {
                    name: name.as_ref().to_string(),
                    status: DeviceStatus::Idle,
                    current_pose: Pose::default(),
                },
            );
        }
        Arc::new(store)
    }

    pub fn get(&self, name: &str) -> Option<DeviceState> {
        self.robots.get(name).map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<DeviceState> {
        self.robots
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn update(&self, name: &str, status: DeviceStatus, pose: Pose) {
        if let Some(mut entry) = self.robots.get_mut(name) {
            entry.status = status;
            entry.current_pose = pose;
        }
    }
}

/// Walk a robot from `current` to `target` in fixed steps, one tick per
/// update interval. The robot works while moving and reports idle once it
/// settles on the target.
pub(crate) async fn navigate(
    store: Arc<Store>,
    robot: String,
    current: Pose,
    target: Pose,
    tick: Duration,
) {
    let dx = (target.x - current.x) / f64::from(NAV_STEPS);
    let dy = (target.y - current.y) / f64::from(NAV_STEPS);
    for step in 1..=NAV_STEPS {
        tokio::time::sleep(tick).await;
        let pose = Pose {
            x: current.x + dx * f64::from(step),
            y: current.y + dy * f64::from(step),
        };
        store.update(&robot, DeviceStatus::Working, pose);
    }
    store.update(&robot, DeviceStatus::Idle, target);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_robots_start_idle_at_origin() {
        let store = Store::seed(&["freight1", "freight2"]);
        assert_eq!(store.list().len(), 2);
        let robot = store.get("freight1").unwrap();
        assert_eq!(robot.status, DeviceStatus::Idle);
        assert!(robot.current_pose.is_at(&Pose::default()));
        assert!(store.get("ghost").is_none());
    }

    #[test]
    fn updates_ignore_unknown_robots() {
        let store = Store::seed(&["freight1"]);
        store.update("ghost", DeviceStatus::Working, Pose { x: 1.0, y: 1.0 });
        assert_eq!(store.list().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_walks_to_the_target_and_settles() {
        let store = Store::seed(&["freight1"]);
        let target = Pose { x: 10.0, y: -4.0 };
        let walk = tokio::spawn(navigate(
            store.clone(),
            "freight1".to_string(),
            Pose::default(),
            target,
            Duration::from_millis(10),
        ));

        // Mid-walk the robot reports working somewhere between the poses.
        tokio::time::sleep(Duration::from_millis(105)).await;
        let moving = store.get("freight1").unwrap();
        assert_eq!(moving.status, DeviceStatus::Working);
        assert!(moving.current_pose.x > 0.0 && moving.current_pose.x < 10.0);

        walk.await.unwrap();
        let settled = store.get("freight1").unwrap();
        assert_eq!(settled.status, DeviceStatus::Idle);
        assert!(settled.current_pose.is_at(&target));
    }
}
