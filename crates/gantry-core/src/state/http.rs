use reqwest::Client;
use snafu::ResultExt;

use crate::action::{ActionResult, DeviceState, Pose, error};

pub(super) async fn fetch_robots(client: &Client, base: &str) -> ActionResult<Vec<DeviceState>> {
    let url = format!("{base}/api/robots/");
    let response = client.get(url).send().await.context(error::HttpSnafu)?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return error::RejectedSnafu {
            status: status.as_u16(),
            body,
        }
        .fail();
    }
    response.json().await.context(error::HttpSnafu)
}

pub(super) async fn send_to_pose(
    client: &Client,
    base: &str,
    robot: &str,
    target: Pose,
) -> ActionResult<()> {
    let url = format!("{base}/api/robots/{robot}/send/");
    let response = client
        .patch(url)
        .json(&target)
        .send()
        .await
        .context(error::HttpSnafu)?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return error::RejectedSnafu {
            status: status.as_u16(),
            body,
        }
        .fail();
    }
    Ok(())
}
