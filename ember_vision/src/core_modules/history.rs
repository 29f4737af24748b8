use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const HAZARD_LABEL: &str = "Hazard detected";
pub const SAFE_LABEL: &str = "Environment safe";

/// Where the frames of a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Image,
    Video,
    Camera,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Camera => "camera",
        };
        f.pad(name)
    }
}

/// Summary of one completed run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Local>,
    pub hazard_detected: bool,
    pub result_label: String,
    /// Wall-clock seconds spent on the run.
    pub processing_time: f64,
    pub frame_count: u64,
    pub source_type: SourceKind,
}

impl HistoryRecord {
    pub fn new(source_type: SourceKind, hazard_detected: bool, processing_time: f64, frame_count: u64) -> Self {
        Self {
            timestamp: Local::now(),
            hazard_detected,
            result_label: if hazard_detected { HAZARD_LABEL } else { SAFE_LABEL }.to_string(),
            processing_time,
            frame_count,
            source_type,
        }
    }
}

/// Append-only log of run summaries with a retention cap.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    records: VecDeque<HistoryRecord>,
    retention: usize,
}

impl HistoryLog {
    pub fn new(retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            records: VecDeque::with_capacity(retention.min(256)),
            retention,
        }
    }

    /// Appends a record, evicting the oldest once the retention cap is exceeded.
    pub fn append(&mut self, record: HistoryRecord) {
        self.records.push_back(record);
        while self.records.len() > self.retention {
            self.records.pop_front();
        }
    }

    /// The last `n` records, oldest first and most recent last.
    pub fn recent(&self, n: usize) -> Vec<HistoryRecord> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).cloned().collect()
    }

    /// Drops every record, not just the displayed window.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }
}
