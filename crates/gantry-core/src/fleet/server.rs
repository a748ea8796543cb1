use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::{Json, Router};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use super::{FleetResult, Store, error, navigate};
use crate::action::Pose;
use crate::config::Config;

#[derive(Clone)]
struct AppState {
    store: Arc<Store>,
    tick: Duration,
}

pub fn router(store: Arc<Store>, tick: Duration) -> Router {
    Router::new()
        .route("/api/robots/", get(list_robots))
        .route("/api/robots/:robot/send/", patch(send_robot))
        .with_state(AppState { store, tick })
}

/// Serve the mock fleet until the token fires.
pub async fn serve(config: &Config, store: Arc<Store>, cancel: CancellationToken) -> FleetResult<()> {
    let port = config.http.port;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .context(error::BindSnafu { port })?;
    info!("fleet server is listening on {port}");
    axum::serve(listener, router(store, config.update_interval()))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context(error::ServeSnafu)
}

async fn list_robots(State(app): State<AppState>) -> Response {
    Json(app.store.list()).into_response()
}

async fn send_robot(
    State(app): State<AppState>,
    Path(robot): Path<String>,
    Json(target): Json<Pose>,
) -> Response {
    let Some(state) = app.store.get(&robot) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("robot {robot} does not exist"),
        )
            .into_response();
    };
    tokio::spawn(navigate(
        app.store.clone(),
        robot,
        state.current_pose,
        target,
        app.tick,
    ));
    StatusCode::OK.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{DeviceState, DeviceStatus};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn request_send(robot: &str, target: Pose) -> Request<Body> {
        Request::builder()
            .method("PATCH")
            .uri(format!("/api/robots/{robot}/send/"))
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&target).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn lists_the_seeded_fleet() {
        let app = router(Store::seed(&["freight1", "freight2"]), Duration::ZERO);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/robots/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let robots: Vec<DeviceState> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(robots.len(), 2);
    }

    #[tokio::test]
    async fn rejects_commands_for_unknown_robots() {
        let app = router(Store::seed(&["freight1"]), Duration::ZERO);
        let response = app
            .oneshot(request_send("ghost", Pose { x: 1.0, y: 1.0 }))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_commands_drive_the_robot() {
        let store = Store::seed(&["freight1"]);
        let app = router(store.clone(), Duration::from_millis(1));
        let target = Pose { x: 10.0, y: 10.0 };

        let response = app.oneshot(request_send("freight1", target)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Let the spawned navigation run its 20 ticks out.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let robot = store.get("freight1").unwrap();
        assert_eq!(robot.status, DeviceStatus::Idle);
        assert!(robot.current_pose.is_at(&target));
    }
}
