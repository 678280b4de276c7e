mod adapter;
mod annotate;
mod detector;
mod episode;
mod scheduler;
mod summary;

pub use adapter::DetectionAdapter;
pub use detector::OrtDetector;
pub use episode::{Boundary, EpisodeEvent};
pub use scheduler::{InferenceScheduler, SchedulerSettings};
pub use summary::{HazardKind, Status};

#[cfg(test)]
pub(crate) use scheduler::tests as test_support;
