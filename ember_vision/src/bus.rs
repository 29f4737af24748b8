use crate::core_modules::debounce::EpisodeStatus;
use crate::core_modules::history::{HistoryRecord, SourceKind};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

/// Per-frame status published while a run is in flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_index: u64,
    pub status: EpisodeStatus,
    pub matched_labels: Vec<String>,
    /// The alarm was fired while handling this frame.
    pub alarm_fired: bool,
    /// The detector failed on this frame and the episode state was left as it was.
    pub skipped: bool,
    /// Frames handled so far in this run, this one included.
    pub processed: u64,
    pub total: Option<u64>,
}

impl FrameReport {
    /// `processed / total` for bounded sources.
    pub fn progress(&self) -> Option<f64> {
        self.total
            .filter(|&total| total > 0)
            .map(|total| (self.processed as f64 / total as f64).min(1.0))
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// The source ran out of frames.
    Exhausted,
    /// The run toggle was switched off.
    Cancelled,
    ReadFailure { message: String },
    InferenceFailure { message: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        run_id: u64,
        kind: SourceKind,
        origin: String,
        frame_rate: f64,
        required_frames: u64,
        total_frames: Option<u64>,
    },
    Frame {
        run_id: u64,
        report: FrameReport,
    },
    Alarm {
        run_id: u64,
        frame_index: u64,
    },
    /// Non-fatal, user-facing message.
    Notice {
        run_id: u64,
        message: String,
    },
    Finished {
        run_id: u64,
        record: HistoryRecord,
        termination: Termination,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> u64 {
        match self {
            Self::Started { run_id, .. }
            | Self::Frame { run_id, .. }
            | Self::Alarm { run_id, .. }
            | Self::Notice { run_id, .. }
            | Self::Finished { run_id, .. } => *run_id,
        }
    }
}

/// Fan-out of run events to any number of presentation layers.
#[derive(Clone)]
pub struct EventBus {
    events_tx: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel::<RunEvent>(capacity.max(1));
        Self { events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events_tx.subscribe()
    }

    /// Publishing never fails the run; with no subscribers the event is dropped.
    pub fn publish(&self, event: RunEvent) {
        let _ = self.events_tx.send(event);
    }
}

/// The switch that keeps a video or camera loop going.
#[derive(Clone)]
pub struct ControlHandle {
    pub run_tx: watch::Sender<bool>,
}

impl ControlHandle {
    /// A handle whose toggle starts switched on.
    pub fn channel() -> (Self, watch::Receiver<bool>) {
        let (run_tx, run_rx) = watch::channel(true);
        (Self { run_tx }, run_rx)
    }

    /// Switches the toggle off. The loop notices before its next frame.
    pub fn stop(&self) {
        self.run_tx.send_replace(false);
    }

    pub fn is_running(&self) -> bool {
        *self.run_tx.borrow()
    }
}
