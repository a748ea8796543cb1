//! Fleet-state cache: a single owner task holds the last polled snapshot
//! of the fleet and serves lookups over a request channel, while a
//! polling task refreshes the snapshot over HTTP. Updates and lookups
//! serialize through the owner, so there is no shared mutable map.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::action::{ActionEnv, ActionResult, DeviceState, DeviceStatus, Pose, error};
use crate::config::Config;

mod http;

/// How long to wait between idle-acquisition attempts.
const IDLE_RETRY: Duration = Duration::from_secs(1);

struct Lookup {
    device: String,
    status: Option<DeviceStatus>,
    reply: oneshot::Sender<Option<DeviceState>>,
}

struct Update {
    robots: Vec<DeviceState>,
    done: oneshot::Sender<()>,
}

/// Cloneable handle over the cache; implements [`ActionEnv`] for the
/// workflow engine.
#[derive(Clone)]
pub struct FleetState {
    requests: mpsc::Sender<Lookup>,
    client: reqwest::Client,
    base_url: String,
}

impl FleetState {
    /// Start the owner and polling tasks; both stop when the token fires.
    pub fn spawn(config: &Config, cancel: &CancellationToken) -> Self {
        let (requests, request_rx) = mpsc::channel(32);
        let (updates, update_rx) = mpsc::channel(1);
        let client = reqwest::Client::new();
        let base_url = config.base_url();

        tokio::spawn(owner(request_rx, update_rx, cancel.clone()));
        tokio::spawn(poll(
            client.clone(),
            base_url.clone(),
            updates,
            config.poll_interval(),
            cancel.clone(),
        ));

        Self {
            requests,
            client,
            base_url,
        }
    }

    async fn lookup(
        &self,
        device: &str,
        status: Option<DeviceStatus>,
    ) -> ActionResult<Option<DeviceState>> {
        let (reply, response) = oneshot::channel();
        let request = Lookup {
            device: device.to_string(),
            status,
            reply,
        };
        if self.requests.send(request).await.is_err() {
            return error::UnavailableSnafu.fail();
        }
        response.await.map_err(|_| error::UnavailableSnafu.build())
    }
}

async fn owner(
    mut requests: mpsc::Receiver<Lookup>,
    mut updates: mpsc::Receiver<Update>,
    cancel: CancellationToken,
) {
    let mut robots: HashMap<String, DeviceState> = HashMap::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            request = requests.recv() => {
                let Some(request) = request else { return };
                let hit = robots
                    .get(&request.device)
                    .filter(|state| request.status.is_none_or(|s| state.status == s))
                    .cloned();
                let _ = request.reply.send(hit);
            }
            update = updates.recv() => {
                let Some(update) = update else { return };
                for robot in update.robots {
                    robots.insert(robot.name.clone(), robot);
                }
                let _ = update.done.send(());
                debug!("fleet state is updated");
            }
        }
    }
}

async fn poll(
    client: reqwest::Client,
    base_url: String,
    updates: mpsc::Sender<Update>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let robots = match http::fetch_robots(&client, &base_url).await {
            Ok(robots) => robots,
            Err(e) => {
                error!("failed to poll fleet: {e}");
                continue;
            }
        };
        let (done, ack) = oneshot::channel();
        if updates.send(Update { robots, done }).await.is_err() {
            return;
        }
        // Wait for the owner to fold the snapshot in before polling again.
        let _ = ack.await;
    }
}

#[async_trait]
impl ActionEnv for FleetState {
    async fn acquire_idle(
        &self,
        device: &str,
        cancel: &CancellationToken,
    ) -> ActionResult<DeviceState> {
        loop {
            if let Some(state) = self.lookup(device, Some(DeviceStatus::Idle)).await? {
                return Ok(state);
            }
            tokio::select! {
                _ = cancel.cancelled() => return error::CancelledSnafu.fail(),
                _ = tokio::time::sleep(IDLE_RETRY) => {}
            }
        }
    }

    async fn dispatch(&self, device: &str, target: Pose) -> ActionResult<()> {
        http::send_to_pose(&self.client, &self.base_url, device, target).await
    }

    async fn observe(&self, device: &str) -> Option<DeviceState> {
        self.lookup(device, None).await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(requests: mpsc::Sender<Lookup>) -> FleetState {
        FleetState {
            requests,
            client: reqwest::Client::new(),
            base_url: "http://localhost:0".to_string(),
        }
    }

    async fn push(updates: &mpsc::Sender<Update>, robots: Vec<DeviceState>) {
        let (done, ack) = oneshot::channel();
        updates.send(Update { robots, done }).await.unwrap();
        ack.await.unwrap();
    }

    fn robot(name: &str, status: DeviceStatus) -> DeviceState {
        DeviceState {
            name: name.to_string(),
            status,
            current_pose: Pose::default(),
        }
    }

    #[tokio::test]
    async fn owner_serves_lookups_from_the_latest_snapshot() {
        let (request_tx, request_rx) = mpsc::channel(8);
        let (update_tx, update_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        tokio::spawn(owner(request_rx, update_rx, cancel.clone()));
        let state = handle(request_tx);

        // Unknown until the first snapshot lands.
        assert!(state.observe("freight1").await.is_none());

        push(&update_tx, vec![robot("freight1", DeviceStatus::Working)]).await;
        let seen = state.observe("freight1").await.unwrap();
        assert_eq!(seen.status, DeviceStatus::Working);

        // A status-filtered lookup misses while the robot is working.
        assert!(
            state
                .lookup("freight1", Some(DeviceStatus::Idle))
                .await
                .unwrap()
                .is_none()
        );

        push(&update_tx, vec![robot("freight1", DeviceStatus::Idle)]).await;
        assert!(
            state
                .lookup("freight1", Some(DeviceStatus::Idle))
                .await
                .unwrap()
                .is_some()
        );
        cancel.cancel();
    }

    #[tokio::test]
    async fn lookups_fail_once_the_owner_is_gone() {
        let (request_tx, request_rx) = mpsc::channel(8);
        drop(request_rx);
        let state = handle(request_tx);
        let err = state
            .lookup("freight1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::action::ActionError::Unavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_idle_waits_for_an_idle_report() {
        let (request_tx, request_rx) = mpsc::channel(8);
        let (update_tx, update_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        tokio::spawn(owner(request_rx, update_rx, cancel.clone()));
        let state = handle(request_tx);

        push(&update_tx, vec![robot("freight1", DeviceStatus::Working)]).await;

        let waiter = tokio::spawn({
            let state = state.clone();
            let cancel = cancel.clone();
            async move { state.acquire_idle("freight1", &cancel).await }
        });

        // Still working after a couple of retry periods.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!waiter.is_finished());

        push(&update_tx, vec![robot("freight1", DeviceStatus::Idle)]).await;
        let acquired = waiter.await.unwrap().unwrap();
        assert_eq!(acquired.status, DeviceStatus::Idle);
        cancel.cancel();
    }
}
