use std::path::PathBuf;

use chrono::{DateTime, Local};
use opencv::core::Vector;
use opencv::imgcodecs;
use thiserror::Error;

use crate::analytics::{Boundary, EpisodeEvent, HazardKind};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to create snapshot dir: {0}")]
    Io(#[from] std::io::Error),
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
    #[error("encoder refused to write {0}")]
    WriteFailed(PathBuf),
}

/// `{camera}_fire_start_{conf}_{ts}.jpg`, `{camera}_fire_end_{ts}.jpg`,
/// `{camera}_spark_{conf}_{ts}.jpg`.
pub fn snapshot_file_name(
    camera_id: &str,
    kind: HazardKind,
    boundary: Boundary,
    confidence: f32,
    at: &DateTime<Local>,
) -> String {
    let ts = at.format("%Y%m%d_%H%M%S");
    let conf = confidence as i32;
    match (kind, boundary) {
        (HazardKind::Fire, Boundary::Start) => format!("{camera_id}_fire_start_{conf}_{ts}.jpg"),
        (HazardKind::Spark, Boundary::Start) => format!("{camera_id}_spark_{conf}_{ts}.jpg"),
        (kind, Boundary::End) => format!("{camera_id}_{}_end_{ts}.jpg", kind.as_str()),
    }
}

/// Writes episode-boundary evidence images into a flat directory.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to create snapshot dir");
        }
        Self { dir }
    }

    pub fn save(
        &self,
        camera_id: &str,
        event: &EpisodeEvent,
        at: &DateTime<Local>,
    ) -> Result<PathBuf, SnapshotError> {
        std::fs::create_dir_all(&self.dir)?;

        let name = snapshot_file_name(camera_id, event.kind, event.boundary, event.confidence, at);
        let path = self.dir.join(name);

        let mat = event.frame.to_mat()?;
        let written = imgcodecs::imwrite(&path.to_string_lossy(), &mat, &Vector::<i32>::new())?;
        if !written {
            return Err(SnapshotError::WriteFailed(path));
        }

        tracing::debug!(camera = %camera_id, path = %path.display(), "snapshot saved");
        Ok(path)
    }
}
