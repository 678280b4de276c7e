use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::adapter::DetectionAdapter;
use super::episode::{Boundary, EpisodeEvent, EpisodePolicy, EpisodeTracker};
use super::summary::{HazardKind, StatusSummary};
use crate::camera::{CameraFeed, Frame, LatestFrame};
use crate::config::Config;
use crate::storage::{HazardHistory, HistoryEntry, SnapshotWriter};

const HISTORY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub min_interval: Duration,
    pub alert_threshold_percent: f32,
    pub min_save_interval: Duration,
    pub history_cap: usize,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_interval: config.inference.min_interval(),
            alert_threshold_percent: config.inference.alert_threshold_percent,
            min_save_interval: config.snapshots.min_save_interval(),
            history_cap: config.history.cap,
        }
    }
}

/// Shared by every viewer of one camera.
#[derive(Default)]
struct InferenceCache {
    annotated: Option<Arc<Frame>>,
    last_infer: Option<Instant>,
    frame_sequence: Option<u64>,
    summary: StatusSummary,
    summary_time: Option<DateTime<Local>>,
}

/// State only touched by the single in-flight pass.
struct InferencePass {
    adapter: DetectionAdapter,
    fire: EpisodeTracker,
    spark: EpisodeTracker,
}

#[derive(Debug, Clone)]
pub enum ServedFrame {
    /// Produced by a pass this call ran.
    Fresh(Arc<Frame>),
    /// Last annotated frame, reused because inference was throttled or busy.
    Cached(Arc<Frame>),
    /// Camera never produced a frame.
    Placeholder(Arc<Frame>),
}

impl ServedFrame {
    pub fn frame(&self) -> &Arc<Frame> {
        match self {
            ServedFrame::Fresh(f) | ServedFrame::Cached(f) | ServedFrame::Placeholder(f) => f,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ServedFrame::Placeholder(_))
    }
}

/// Status as last published by an inference pass.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub summary: StatusSummary,
    pub time: Option<DateTime<Local>>,
}

/// Rate-limits and serializes detection work for one camera. Any number of
/// viewers may call [`InferenceScheduler::next_frame`] concurrently; at most
/// one detection pass runs at a time and passes are spaced by `min_interval`.
pub struct InferenceScheduler {
    camera_id: String,
    feed: Arc<CameraFeed>,
    min_interval: Duration,
    cache: Mutex<InferenceCache>,
    pass: Arc<AsyncMutex<InferencePass>>,
    history: HazardHistory,
    snapshots: Option<SnapshotWriter>,
}

impl InferenceScheduler {
    pub fn new(
        feed: Arc<CameraFeed>,
        adapter: DetectionAdapter,
        settings: &SchedulerSettings,
        snapshots: Option<SnapshotWriter>,
    ) -> Arc<Self> {
        let tracker = |kind| {
            EpisodeTracker::new(
                kind,
                EpisodePolicy::for_kind(
                    kind,
                    settings.alert_threshold_percent,
                    settings.min_save_interval,
                ),
            )
        };

        Arc::new(Self {
            camera_id: feed.camera_id().to_string(),
            feed,
            min_interval: settings.min_interval,
            cache: Mutex::new(InferenceCache::default()),
            pass: Arc::new(AsyncMutex::new(InferencePass {
                adapter,
                fire: tracker(HazardKind::Fire),
                spark: tracker(HazardKind::Spark),
            })),
            history: HazardHistory::new(settings.history_cap),
            snapshots,
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn history(&self) -> &HazardHistory {
        &self.history
    }

    pub fn status(&self) -> StatusSnapshot {
        let cache = self.lock_cache();
        StatusSnapshot {
            summary: cache.summary.clone(),
            time: cache.summary_time,
        }
    }

    /// The frame a viewer should see right now, running a detection pass
    /// first when one is due and no other viewer is already running it.
    pub async fn next_frame(self: &Arc<Self>) -> ServedFrame {
        let Some(latest) = self.feed.snapshot() else {
            return ServedFrame::Placeholder(Frame::placeholder());
        };

        if !self.is_due(&latest, Instant::now()) {
            return self.cached_or_placeholder();
        }

        let guard = match Arc::clone(&self.pass).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                if let Some(cached) = self.cached() {
                    return ServedFrame::Cached(cached);
                }
                // first pass still in flight, share its result
                drop(self.pass.lock().await);
                return self.cached_or_placeholder();
            }
        };

        // another viewer may have finished a pass between the check and the lock
        let latest = self.feed.snapshot().unwrap_or(latest);
        let now = Instant::now();
        if !self.is_due(&latest, now) {
            return self.cached_or_placeholder();
        }

        let this = Arc::clone(self);
        match tokio::task::spawn_blocking(move || this.run_pass(guard, latest, now)).await {
            Ok(frame) => ServedFrame::Fresh(frame),
            Err(e) => {
                tracing::error!(camera = %self.camera_id, error = %e, "inference task failed");
                self.cached_or_placeholder()
            }
        }
    }

    fn is_due(&self, latest: &LatestFrame, now: Instant) -> bool {
        let cache = self.lock_cache();
        if cache.annotated.is_none() {
            return true;
        }
        if cache.frame_sequence == Some(latest.sequence) {
            return false;
        }
        match cache.last_infer {
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
            None => true,
        }
    }

    fn cached(&self) -> Option<Arc<Frame>> {
        self.lock_cache().annotated.clone()
    }

    fn cached_or_placeholder(&self) -> ServedFrame {
        match self.cached() {
            Some(frame) => ServedFrame::Cached(frame),
            None => ServedFrame::Placeholder(Frame::placeholder()),
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, InferenceCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs on a blocking thread while holding the pass guard. Everything a
    /// pass changes is committed here, so a viewer disconnecting mid-pass
    /// cannot lose an episode transition.
    fn run_pass(
        &self,
        mut guard: OwnedMutexGuard<InferencePass>,
        latest: LatestFrame,
        now: Instant,
    ) -> Arc<Frame> {
        let wall = Local::now();
        let pass = &mut *guard;

        let analysis = pass.adapter.analyze(&self.camera_id, &latest.frame);
        let summary = analysis.summary;
        let annotated = analysis.annotated;

        let events: Vec<EpisodeEvent> = [&mut pass.fire, &mut pass.spark]
            .into_iter()
            .filter_map(|tracker| {
                let confidence = summary.hazard_percent(tracker.kind());
                tracker.observe(confidence, &annotated, now)
            })
            .collect();

        {
            // histories are pushed before the summary becomes visible, so a
            // reader that sees a hazard status also sees its history entry
            let mut cache = self.lock_cache();
            for event in &events {
                self.push_history(event, &wall);
            }
            cache.annotated = Some(Arc::clone(&annotated));
            cache.last_infer = Some(now);
            cache.frame_sequence = Some(latest.sequence);
            cache.summary = summary;
            cache.summary_time = Some(wall);
        }

        for event in &events {
            self.save_snapshot(event, &wall);
        }

        annotated
    }

    fn push_history(&self, event: &EpisodeEvent, wall: &DateTime<Local>) {
        match event.boundary {
            Boundary::Start => tracing::info!(
                camera = %self.camera_id,
                kind = event.kind.as_str(),
                confidence = format!("{:.1}", event.confidence),
                "episode started"
            ),
            Boundary::End => tracing::info!(
                camera = %self.camera_id,
                kind = event.kind.as_str(),
                "episode ended"
            ),
        }

        self.history.store(event.kind).push(HistoryEntry {
            time: wall.format(HISTORY_TIME_FORMAT).to_string(),
            confidence: event.confidence,
            status: event.kind.status(),
            event: event.boundary,
        });
    }

    fn save_snapshot(&self, event: &EpisodeEvent, wall: &DateTime<Local>) {
        let Some(writer) = &self.snapshots else {
            return;
        };
        if let Err(e) = writer.save(&self.camera_id, event, wall) {
            tracing::warn!(
                camera = %self.camera_id,
                kind = event.kind.as_str(),
                error = %e,
                "snapshot save failed"
            );
        }
    }
}
