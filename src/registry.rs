use std::collections::HashMap;
use std::sync::Arc;

use crate::analytics::InferenceScheduler;
use crate::camera::CameraFeed;

/// Per-camera state reachable from request handlers.
#[derive(Clone)]
pub struct CameraHandle {
    pub feed: Arc<CameraFeed>,
    pub scheduler: Arc<InferenceScheduler>,
}

/// Lookup table from camera id to its state, built once at startup.
#[derive(Clone, Default)]
pub struct CameraRegistry {
    cameras: Arc<HashMap<String, CameraHandle>>,
    order: Arc<Vec<String>>,
}

impl CameraRegistry {
    pub fn new(handles: Vec<CameraHandle>) -> Self {
        let order: Vec<String> = handles
            .iter()
            .map(|h| h.feed.camera_id().to_string())
            .collect();
        let cameras = handles
            .into_iter()
            .map(|h| (h.feed.camera_id().to_string(), h))
            .collect();

        Self {
            cameras: Arc::new(cameras),
            order: Arc::new(order),
        }
    }

    pub fn get(&self, camera_id: &str) -> Option<&CameraHandle> {
        self.cameras.get(camera_id)
    }

    /// Ids in configuration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraHandle> {
        self.order.iter().filter_map(|id| self.cameras.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}
