mod history;
mod snapshot;

pub use history::{HazardHistory, HistoryEntry};
pub use snapshot::SnapshotWriter;
