use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::analytics::{HazardKind, Status};
use crate::registry::CameraRegistry;
use crate::storage::HistoryEntry;

#[derive(Debug, Error, PartialEq)]
pub enum ApiError {
    #[error("camera not found: {0}")]
    CameraNotFound(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::CameraNotFound(_) => (
                StatusCode::NOT_FOUND,
                Json(ErrorBody {
                    error: "Camera not found",
                }),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub status: Status,
    pub status_message: &'static str,
    pub time: Option<String>,
    pub confidence_percentage: f32,
    pub objects_detected: Vec<String>,
}

/// Read-only view over each camera's status and histories.
#[derive(Clone)]
pub struct NotificationApi {
    registry: CameraRegistry,
}

impl NotificationApi {
    pub fn new(registry: CameraRegistry) -> Self {
        Self { registry }
    }

    pub fn status(&self, camera_id: &str) -> Result<Notification, ApiError> {
        let handle = self
            .registry
            .get(camera_id)
            .ok_or_else(|| ApiError::CameraNotFound(camera_id.to_string()))?;

        let snapshot = handle.scheduler.status();
        Ok(Notification {
            status: snapshot.summary.status,
            status_message: snapshot.summary.status.message(),
            time: snapshot
                .time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            confidence_percentage: (snapshot.summary.confidence_percent * 10.0).round() / 10.0,
            objects_detected: snapshot.summary.objects_detected,
        })
    }

    pub fn history(&self, camera_id: &str, kind: HazardKind) -> Result<Vec<HistoryEntry>, ApiError> {
        let handle = self
            .registry
            .get(camera_id)
            .ok_or_else(|| ApiError::CameraNotFound(camera_id.to_string()))?;
        Ok(handle.scheduler.history().store(kind).read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::{scheduler, ScriptedDetector};
    use crate::camera::Frame;
    use crate::registry::CameraHandle;
    use std::time::Duration;

    fn api(script: Vec<(f32, f32)>) -> (NotificationApi, CameraHandle) {
        let (scheduler, feed) =
            scheduler(ScriptedDetector::new(script, Duration::ZERO), Duration::ZERO, None);
        let handle = CameraHandle { feed, scheduler };
        let api = NotificationApi::new(CameraRegistry::new(vec![handle.clone()]));
        (api, handle)
    }

    #[test]
    fn unknown_camera_is_not_found() {
        let (api, handle) = api(Vec::new());

        assert_eq!(
            api.status("cam99"),
            Err(ApiError::CameraNotFound("cam99".to_string()))
        );
        assert!(api.history("cam99", HazardKind::Fire).is_err());
        assert!(api.history("cam99", HazardKind::Spark).is_err());
        assert_eq!(handle.scheduler.status().time, None);
    }

    #[test]
    fn safe_before_first_pass() {
        let (api, _) = api(Vec::new());

        let status = api.status("0").unwrap();
        assert_eq!(status.status, Status::Safe);
        assert_eq!(status.status_message, "SAFE");
        assert_eq!(status.time, None);
        assert_eq!(status.confidence_percentage, 0.0);
        assert!(api.history("0", HazardKind::Fire).unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_reads_are_identical() {
        let (api, handle) = api(vec![(0.734, 0.0)]);
        handle.feed.publish(Frame::filled(32, 32, [0, 0, 0]));
        handle.scheduler.next_frame().await;

        let first = api.status("0").unwrap();
        for _ in 0..5 {
            assert_eq!(api.status("0").unwrap(), first);
            assert_eq!(api.history("0", HazardKind::Fire).unwrap().len(), 1);
        }
        assert_eq!(first.status, Status::Fire);
        assert_eq!(first.status_message, "DANGER - FIRE DETECTED");
        assert_eq!(first.confidence_percentage, 73.4);
        assert!(first.time.is_some());
    }
}
