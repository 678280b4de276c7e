use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::summary::HazardKind;
use crate::camera::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    Start,
    End,
}

/// Emitted on an episode transition that must be recorded: one snapshot and
/// one history entry per event.
#[derive(Debug, Clone)]
pub struct EpisodeEvent {
    pub kind: HazardKind,
    pub boundary: Boundary,
    /// Percent confidence observed on the pass that caused the transition.
    pub confidence: f32,
    pub frame: Arc<Frame>,
}

#[derive(Debug, Clone)]
pub struct EpisodePolicy {
    pub threshold_percent: f32,
    /// Keep the latest qualifying frame while active and emit an end event
    /// with it on deactivation.
    pub record_end: bool,
    /// Minimum spacing between start saves, measured from the previous save.
    pub min_start_interval: Option<Duration>,
}

impl EpisodePolicy {
    pub fn fire(threshold_percent: f32) -> Self {
        Self {
            threshold_percent,
            record_end: true,
            min_start_interval: None,
        }
    }

    pub fn spark(threshold_percent: f32, min_save_interval: Duration) -> Self {
        Self {
            threshold_percent,
            record_end: false,
            min_start_interval: Some(min_save_interval),
        }
    }

    pub fn for_kind(kind: HazardKind, threshold_percent: f32, min_save_interval: Duration) -> Self {
        match kind {
            HazardKind::Fire => Self::fire(threshold_percent),
            HazardKind::Spark => Self::spark(threshold_percent, min_save_interval),
        }
    }
}

#[derive(Debug, Clone)]
enum EpisodeState {
    Inactive,
    Active {
        /// Most recent frame still showing the hazard; only kept when the
        /// policy records an end.
        last_qualifying: Option<Arc<Frame>>,
    },
}

/// Turns a per-pass confidence signal into discrete episode start/end events
/// for one (camera, hazard) pair.
#[derive(Debug)]
pub struct EpisodeTracker {
    kind: HazardKind,
    policy: EpisodePolicy,
    state: EpisodeState,
    last_save: Option<Instant>,
}

impl EpisodeTracker {
    pub fn new(kind: HazardKind, policy: EpisodePolicy) -> Self {
        Self {
            kind,
            policy,
            state: EpisodeState::Inactive,
            last_save: None,
        }
    }

    pub fn kind(&self) -> HazardKind {
        self.kind
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        matches!(self.state, EpisodeState::Active { .. })
    }

    #[cfg(test)]
    pub fn retained_frame(&self) -> Option<&Arc<Frame>> {
        match &self.state {
            EpisodeState::Active { last_qualifying } => last_qualifying.as_ref(),
            EpisodeState::Inactive => None,
        }
    }

    pub fn observe(
        &mut self,
        confidence: f32,
        frame: &Arc<Frame>,
        now: Instant,
    ) -> Option<EpisodeEvent> {
        let present = confidence >= self.policy.threshold_percent;

        match self.state {
            EpisodeState::Inactive if !present => None,
            EpisodeState::Inactive => {
                if self.debounced(now) {
                    tracing::debug!(
                        kind = self.kind.as_str(),
                        "episode start suppressed by save interval"
                    );
                    return None;
                }
                let last_qualifying = self.policy.record_end.then(|| Arc::clone(frame));
                self.state = EpisodeState::Active { last_qualifying };
                self.last_save = Some(now);
                Some(self.event(Boundary::Start, confidence, Arc::clone(frame)))
            }
            EpisodeState::Active {
                ref mut last_qualifying,
            } if present => {
                if self.policy.record_end {
                    *last_qualifying = Some(Arc::clone(frame));
                }
                None
            }
            EpisodeState::Active {
                ref mut last_qualifying,
            } => {
                let retained = last_qualifying.take();
                self.state = EpisodeState::Inactive;
                if !self.policy.record_end {
                    return None;
                }
                self.last_save = Some(now);
                let end_frame = retained.unwrap_or_else(|| Arc::clone(frame));
                Some(self.event(Boundary::End, confidence, end_frame))
            }
        }
    }

    fn debounced(&self, now: Instant) -> bool {
        match (self.policy.min_start_interval, self.last_save) {
            (Some(min), Some(last)) => now.saturating_duration_since(last) < min,
            _ => false,
        }
    }

    fn event(&self, boundary: Boundary, confidence: f32, frame: Arc<Frame>) -> EpisodeEvent {
        EpisodeEvent {
            kind: self.kind,
            boundary,
            confidence,
            frame,
        }
    }
}
