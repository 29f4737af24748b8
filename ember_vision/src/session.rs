// THEORY:
// A `Session` is the explicit context object for everything that outlives a
// single run: the configuration, the detector, the alarm dispatcher, the history
// log, the event bus, and the admission slot for long-running runs. It is created
// once and handed to whatever front end drives it; nothing lives in ambient
// global state.
//
// Runs execute on tokio's blocking pool, because frame decoding and inference are
// synchronous and may take tens of milliseconds per frame. The caller gets a
// `RunHandle` back immediately and can watch progress through the event bus while
// the loop works. Video and camera runs share a single-permit semaphore: the
// permit travels into the blocking task and is dropped on every exit path, which
// re-opens the slot even if the loop panics.

use crate::bus::{ControlHandle, EventBus, RunEvent, Termination};
use crate::config::EmberConfig;
use crate::core_modules::alarm::AlarmDispatcher;
use crate::core_modules::detection::Detector;
use crate::core_modules::frame_source::FrameSource;
use crate::core_modules::history::{HistoryLog, HistoryRecord, SourceKind};
use crate::error::SessionError;
use crate::pipeline::{HazardPipeline, RunOutcome};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast, watch};
use tokio::task::JoinHandle;

/// A video or camera run in flight.
pub struct RunHandle {
    run_id: u64,
    control: Option<ControlHandle>,
    join: JoinHandle<Result<RunOutcome, SessionError>>,
}

impl RunHandle {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Asks the loop to stop before its next frame. Camera runs are stopped through
    /// the toggle their caller passed in, so this returns `false` for them.
    pub fn stop(&self) -> bool {
        match &self.control {
            Some(control) => {
                control.stop();
                true
            }
            None => false,
        }
    }

    /// Waits for the loop to end and returns its outcome.
    pub async fn wait(self) -> Result<RunOutcome, SessionError> {
        self.join.await?
    }

    /// Waits for the loop, calling `stop` if `stop_signal` resolves first. The
    /// in-flight frame still completes and the run is recorded as cancelled.
    pub async fn wait_or_stop<F>(mut self, stop_signal: F) -> Result<RunOutcome, SessionError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            joined = &mut self.join => return joined?,
            _ = stop_signal => {
                self.stop();
            }
        }
        self.join.await?
    }
}

/// Session-scoped state shared by every run.
pub struct Session {
    config: Arc<EmberConfig>,
    detector: Arc<dyn Detector>,
    alarm: AlarmDispatcher,
    history: Arc<Mutex<HistoryLog>>,
    run_slot: Arc<Semaphore>,
    events: EventBus,
    next_run_id: AtomicU64,
}

impl Session {
    pub fn new(config: EmberConfig, detector: Arc<dyn Detector>, alarm: AlarmDispatcher) -> Self {
        let history = HistoryLog::new(config.history_retention);
        let events = EventBus::new(config.event_capacity);
        Self {
            config: Arc::new(config),
            detector,
            alarm,
            history: Arc::new(Mutex::new(history)),
            run_slot: Arc::new(Semaphore::new(1)),
            events,
            next_run_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &EmberConfig {
        &self.config
    }

    pub fn alarm(&self) -> &AlarmDispatcher {
        &self.alarm
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// True while a video or camera run holds the admission slot.
    pub fn is_busy(&self) -> bool {
        self.run_slot.available_permits() == 0
    }

    /// The display window: the last `max_history` records, most recent last.
    pub fn history(&self) -> Vec<HistoryRecord> {
        self.recent_history(self.config.max_history)
    }

    pub fn recent_history(&self, n: usize) -> Vec<HistoryRecord> {
        lock_history(&self.history).recent(n)
    }

    pub fn history_len(&self) -> usize {
        lock_history(&self.history).len()
    }

    /// Clears the whole log, not only the displayed window.
    pub fn clear_history(&self) {
        lock_history(&self.history).clear();
        log::info!("history cleared");
    }

    /// Analyzes a single still image and records the result.
    pub async fn analyze_image<S>(&self, source: S) -> Result<RunOutcome, SessionError>
    where
        S: FrameSource + 'static,
    {
        self.check_alarm()?;
        let (_, join) = self.spawn_run(source, None, None);
        join.await?
    }

    /// Starts a recorded-video run. Rejected while another video or camera run is active.
    /// Must be called from within a tokio runtime.
    pub fn start_video<S>(&self, source: S) -> Result<RunHandle, SessionError>
    where
        S: FrameSource + 'static,
    {
        self.check_alarm()?;
        let permit = self.admit()?;
        let (control, toggle) = ControlHandle::channel();
        let (run_id, join) = self.spawn_run(source, Some(toggle), Some(permit));
        Ok(RunHandle {
            run_id,
            control: Some(control),
            join,
        })
    }

    /// Starts a live camera run gated by `toggle`. The loop keeps going while the
    /// toggle reads `true` and the source keeps delivering frames.
    /// Must be called from within a tokio runtime.
    pub fn start_camera<S>(
        &self,
        source: S,
        toggle: watch::Receiver<bool>,
    ) -> Result<RunHandle, SessionError>
    where
        S: FrameSource + 'static,
    {
        self.check_alarm()?;
        let permit = self.admit()?;
        let (run_id, join) = self.spawn_run(source, Some(toggle), Some(permit));
        Ok(RunHandle {
            run_id,
            control: None,
            join,
        })
    }

    fn check_alarm(&self) -> Result<(), SessionError> {
        self.alarm.check().map_err(|e| {
            log::error!("{e}");
            SessionError::from(e)
        })
    }

    fn admit(&self) -> Result<OwnedSemaphorePermit, SessionError> {
        self.run_slot.clone().try_acquire_owned().map_err(|_| {
            log::warn!("rejected run start: another run is active");
            SessionError::RunBusy
        })
    }

    fn spawn_run<S>(
        &self,
        source: S,
        toggle: Option<watch::Receiver<bool>>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> (u64, JoinHandle<Result<RunOutcome, SessionError>>)
    where
        S: FrameSource + 'static,
    {
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let mut pipeline = HazardPipeline::new(
            run_id,
            self.config.clone(),
            self.detector.clone(),
            self.alarm.clone(),
            self.events.clone(),
        );
        if let Some(toggle) = toggle {
            pipeline = pipeline.with_toggle(toggle);
        }
        let history = self.history.clone();
        let events = self.events.clone();

        let join = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let outcome = pipeline.run(source).map_err(SessionError::SourceUnavailable)?;
            if let (SourceKind::Image, Termination::InferenceFailure { message }) =
                (outcome.record.source_type, &outcome.termination)
            {
                log::error!("run {run_id}: image not recorded, {message}");
                return Err(SessionError::InferenceFailed {
                    message: message.clone(),
                });
            }
            lock_history(&history).append(outcome.record.clone());
            events.publish(RunEvent::Finished {
                run_id,
                record: outcome.record.clone(),
                termination: outcome.termination.clone(),
            });
            Ok(outcome)
        });
        (run_id, join)
    }
}

fn lock_history(history: &Mutex<HistoryLog>) -> MutexGuard<'_, HistoryLog> {
    history.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::alarm::SoundFileAlarm;
    use crate::core_modules::detection::Detection;
    use crate::core_modules::frame_source::{Frame, FrameSequence};
    use crate::error::InferenceError;

    struct NothingDetector;

    impl Detector for NothingDetector {
        fn predict(&self, _frame: &Frame, _threshold: f32) -> Result<Vec<Detection>, InferenceError> {
            Ok(Vec::new())
        }
    }

    fn session(alarm: AlarmDispatcher) -> Session {
        Session::new(EmberConfig::default(), Arc::new(NothingDetector), alarm)
    }

    #[tokio::test]
    async fn missing_asset_blocks_every_run_kind() {
        let alarm = AlarmDispatcher::new(Arc::new(SoundFileAlarm::new("/no/such/alarm.mp3")));
        let session = session(alarm);
        let frame = Frame::filled(0, 2, 2, [0, 0, 0, 255]);

        let err = session
            .analyze_image(FrameSequence::still(frame.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingAsset { .. }));

        let err = session
            .start_video(FrameSequence::video(vec![frame.clone()], None))
            .err()
            .expect("video rejected");
        assert!(matches!(err, SessionError::MissingAsset { .. }));

        let (_control, toggle) = ControlHandle::channel();
        let err = session
            .start_camera(FrameSequence::live(vec![frame], None), toggle)
            .err()
            .expect("camera rejected");
        assert!(matches!(err, SessionError::MissingAsset { .. }));

        assert_eq!(session.history_len(), 0);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn image_runs_are_recorded() {
        let session = session(AlarmDispatcher::logging());
        let outcome = session
            .analyze_image(FrameSequence::still(Frame::filled(0, 2, 2, [0, 0, 0, 255])))
            .await
            .expect("image run");
        assert!(!outcome.record.hazard_detected);
        assert_eq!(session.history(), vec![outcome.record]);
    }
}
