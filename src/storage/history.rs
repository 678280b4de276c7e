use std::collections::VecDeque;
use std::sync::RwLock;

use serde::Serialize;

use crate::analytics::{Boundary, HazardKind, Status};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// Local wall time, `YYYY-MM-DD HH:MM:SS`.
    pub time: String,
    /// Percent.
    pub confidence: f32,
    pub status: Status,
    pub event: Boundary,
}

/// Bounded recency buffer of episode transitions, oldest first.
pub struct HistoryStore {
    cap: usize,
    entries: RwLock<VecDeque<HistoryEntry>>,
}

impl HistoryStore {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            entries: RwLock::new(VecDeque::with_capacity(cap + 1)),
        }
    }

    pub fn push(&self, entry: HistoryEntry) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push_back(entry);
        while entries.len() > self.cap {
            entries.pop_front();
        }
    }

    /// Copy of the current contents.
    pub fn read(&self) -> Vec<HistoryEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Both hazard histories of one camera.
pub struct HazardHistory {
    fire: HistoryStore,
    spark: HistoryStore,
}

impl HazardHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            fire: HistoryStore::new(cap),
            spark: HistoryStore::new(cap),
        }
    }

    pub fn store(&self, kind: HazardKind) -> &HistoryStore {
        match kind {
            HazardKind::Fire => &self.fire,
            HazardKind::Spark => &self.spark,
        }
    }
}
