use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::analytics::HazardKind;
use crate::config::StreamConfig;
use crate::registry::CameraRegistry;

use super::mjpeg::{self, StreamEncoder};
use super::notification::NotificationApi;

#[derive(Clone)]
pub struct AppState {
    pub registry: CameraRegistry,
    pub notifications: NotificationApi,
    pub stream: StreamConfig,
}

impl AppState {
    pub fn new(registry: CameraRegistry, stream: StreamConfig) -> Self {
        Self {
            notifications: NotificationApi::new(registry.clone()),
            registry,
            stream,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/video_feed/{id}", get(video_feed_handler))
        .route("/api/cameras", get(cameras_handler))
        .route("/api/notification/{id}", get(notification_handler))
        .route("/api/spark-history/{id}", get(spark_history_handler))
        .route("/api/fire-history/{id}", get(fire_history_handler))
        .with_state(state)
}

pub async fn start_server(state: AppState, port: u16) -> Result<(), std::io::Error> {
    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn cameras_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.ids().to_vec())
}

async fn video_feed_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(handle) = state.registry.get(&id) else {
        return (StatusCode::NOT_FOUND, "camera not found").into_response();
    };

    tracing::debug!(camera = %id, "viewer connected");
    let stream = StreamEncoder::new(handle.scheduler.clone(), &state.stream).into_stream();

    (
        [
            (header::CONTENT_TYPE, mjpeg::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn notification_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.notifications.status(&id) {
        Ok(notification) => Json(notification).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn spark_history_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    history_response(&state, &id, HazardKind::Spark)
}

async fn fire_history_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    history_response(&state, &id, HazardKind::Fire)
}

fn history_response(state: &AppState, id: &str, kind: HazardKind) -> Response {
    match state.notifications.history(id, kind) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::{scheduler_for, ScriptedDetector};
    use crate::camera::Frame;
    use crate::registry::CameraHandle;
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state(script: Vec<(f32, f32)>) -> (AppState, CameraHandle) {
        let (scheduler, feed) = scheduler_for(
            "cam1",
            ScriptedDetector::new(script, Duration::ZERO),
            Duration::ZERO,
            None,
        );
        let handle = CameraHandle { feed, scheduler };
        let registry = CameraRegistry::new(vec![handle.clone()]);
        (AppState::new(registry, StreamConfig::default()), handle)
    }

    async fn fetch(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn unknown_camera_returns_404_everywhere() {
        let (state, handle) = state(Vec::new());
        let app = router(state);

        for uri in [
            "/api/notification/cam99",
            "/api/spark-history/cam99",
            "/api/fire-history/cam99",
        ] {
            let (status, body) = fetch(app.clone(), uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["error"], "Camera not found");
        }

        let (status, _) = fetch(app, "/video_feed/cam99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(handle.feed.snapshot().is_none());
        assert_eq!(handle.scheduler.status().time, None);
    }

    #[tokio::test]
    async fn lists_configured_cameras() {
        let (state, _) = state(Vec::new());

        let (status, body) = fetch(router(state), "/api/cameras").await;

        assert_eq!(status, StatusCode::OK);
        let ids: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(ids, vec!["cam1".to_string()]);
    }

    #[tokio::test]
    async fn notification_and_history_after_fire_pass() {
        let (state, handle) = state(vec![(0.81, 0.0)]);
        handle.feed.publish(Frame::filled(32, 32, [0, 0, 0]));
        handle.scheduler.next_frame().await;
        let app = router(state);

        let (status, body) = fetch(app.clone(), "/api/notification/cam1").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "FIRE");
        assert_eq!(json["status_message"], "DANGER - FIRE DETECTED");
        assert_eq!(json["objects_detected"][0], "fire");
        assert!(json["time"].is_string());

        let (_, body) = fetch(app.clone(), "/api/fire-history/cam1").await;
        let fire: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(fire.as_array().unwrap().len(), 1);
        assert_eq!(fire[0]["event"], "start");
        assert_eq!(fire[0]["status"], "FIRE");

        let (_, body) = fetch(app, "/api/spark-history/cam1").await;
        let spark: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(spark.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn video_feed_serves_multipart() {
        let (state, _) = state(Vec::new());

        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/video_feed/cam1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );
    }
}
