use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use super::Frame;

/// The most recent frame a camera produced, with a monotonically increasing
/// sequence number so consumers can tell a new frame from one they already saw.
#[derive(Debug, Clone)]
pub struct LatestFrame {
    pub frame: Arc<Frame>,
    pub sequence: u64,
    pub captured_at: Instant,
}

/// Per-camera latest-frame cell. One writer (the capture loop), any number of
/// readers; readers clone the `Arc` under the lock and never hold it while
/// encoding or running inference.
pub struct CameraFeed {
    camera_id: String,
    latest: RwLock<Option<LatestFrame>>,
    next_sequence: AtomicU64,
    failures: AtomicU64,
}

impl CameraFeed {
    pub fn new(camera_id: String) -> Arc<Self> {
        Arc::new(Self {
            camera_id,
            latest: RwLock::new(None),
            next_sequence: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn publish(&self, frame: Frame) {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let latest = LatestFrame {
            frame: Arc::new(frame),
            sequence,
            captured_at: Instant::now(),
        };
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = Some(latest);
        self.failures.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Option<LatestFrame> {
        self.latest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the new consecutive failure count.
    pub fn record_failure(&self) -> u64 {
        self.failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_until_first_publish() {
        let feed = CameraFeed::new("0".to_string());
        assert!(feed.snapshot().is_none());

        feed.publish(Frame::filled(4, 4, [1, 2, 3]));
        let latest = feed.snapshot().unwrap();
        assert_eq!(latest.sequence, 0);
        assert_eq!(latest.frame.width(), 4);
    }

    #[test]
    fn publish_resets_failures_and_advances_sequence() {
        let feed = CameraFeed::new("0".to_string());
        assert_eq!(feed.record_failure(), 1);
        assert_eq!(feed.record_failure(), 2);

        feed.publish(Frame::filled(2, 2, [0, 0, 0]));
        feed.publish(Frame::filled(2, 2, [9, 9, 9]));

        assert_eq!(feed.failure_count(), 0);
        let latest = feed.snapshot().unwrap();
        assert_eq!(latest.sequence, 1);
        assert_eq!(latest.frame.data()[0], 9);
    }

    #[test]
    fn snapshot_outlives_replacement() {
        let feed = CameraFeed::new("0".to_string());
        feed.publish(Frame::filled(2, 2, [1, 1, 1]));
        let held = feed.snapshot().unwrap();

        feed.publish(Frame::filled(2, 2, [2, 2, 2]));

        assert_eq!(held.frame.data()[0], 1);
        assert_eq!(feed.snapshot().unwrap().frame.data()[0], 2);
    }
}
