// THEORY:
// The `pipeline` module drives one run from the first frame to the last. It wires
// the stages together in a fixed order for every frame:
//
//     FrameSource -> Detector -> classify -> Debouncer -> { AlarmDispatcher, events }
//
// and, when the source stops producing frames, condenses the run into a single
// `HistoryRecord`. The three source shapes differ only in how the loop ends, so
// there is exactly one loop here; the `SourceKind` only decides how the final
// record is summarised.
//
// Ownership is strict: a `HazardPipeline` is built per run, owns its `Debouncer`,
// and owns the source through a `CaptureGuard`. Nothing in here is shared with
// another run except the alarm dispatcher and the event bus, both of which are
// designed to be cloned.

use crate::bus::{EventBus, FrameReport, RunEvent, Termination};
use crate::config::{EmberConfig, InferenceFailurePolicy};
use crate::core_modules::alarm::AlarmDispatcher;
use crate::core_modules::classifier::classify;
use crate::core_modules::debounce::{Debouncer, EpisodeStatus};
use crate::core_modules::detection::Detector;
use crate::core_modules::frame_source::{CaptureGuard, Frame, FrameSource, SourceInfo};
use crate::core_modules::history::{HistoryRecord, SourceKind};
use crate::error::{InferenceError, SourceError};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Everything a finished run reports back to the session.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub record: HistoryRecord,
    pub termination: Termination,
    /// Status after the last processed frame.
    pub final_status: EpisodeStatus,
    pub required_frames: u64,
    /// Alarms fired during this run.
    pub alarms_fired: u64,
}

/// Per-run processing state.
pub struct HazardPipeline {
    run_id: u64,
    config: Arc<EmberConfig>,
    detector: Arc<dyn Detector>,
    alarm: AlarmDispatcher,
    events: EventBus,
    keep_running: Option<watch::Receiver<bool>>,
}

impl HazardPipeline {
    pub fn new(
        run_id: u64,
        config: Arc<EmberConfig>,
        detector: Arc<dyn Detector>,
        alarm: AlarmDispatcher,
        events: EventBus,
    ) -> Self {
        Self {
            run_id,
            config,
            detector,
            alarm,
            events,
            keep_running: None,
        }
    }

    /// Gates the loop on a toggle. It is read once per frame, before the next read.
    pub fn with_toggle(mut self, keep_running: watch::Receiver<bool>) -> Self {
        self.keep_running = Some(keep_running);
        self
    }

    fn should_continue(&self) -> bool {
        self.keep_running.as_ref().is_none_or(|rx| *rx.borrow())
    }

    fn notice(&self, message: String) {
        self.events.publish(RunEvent::Notice {
            run_id: self.run_id,
            message,
        });
    }

    /// Runs the source to completion. Only fails when the source cannot be opened;
    /// every failure after that ends the run with a record and a `Termination`.
    pub fn run<S: FrameSource>(self, source: S) -> Result<RunOutcome, SourceError> {
        let started = Instant::now();
        let mut guard = CaptureGuard::new(source);

        let info = match guard.open() {
            Ok(info) => info,
            Err(e) => {
                guard.release();
                log::error!("run {}: {e}", self.run_id);
                self.notice(e.to_string());
                return Err(e);
            }
        };

        let mut debouncer = Debouncer::new(info.frame_rate, self.config.alarm_duration_secs);
        log::info!(
            "run {}: started {} from {} at {:.2} fps, alarm after {} frames",
            self.run_id,
            info.kind,
            info.origin,
            debouncer.frame_rate(),
            debouncer.required_frames()
        );
        self.events.publish(RunEvent::Started {
            run_id: self.run_id,
            kind: info.kind,
            origin: info.origin.clone(),
            frame_rate: debouncer.frame_rate(),
            required_frames: debouncer.required_frames(),
            total_frames: info.total_frames,
        });

        // Skipping the only frame of a still image would leave nothing analyzed.
        let policy = match info.kind {
            SourceKind::Image => InferenceFailurePolicy::Abort,
            SourceKind::Video | SourceKind::Camera => self.config.inference_failure,
        };
        let mut processed = 0u64;
        let mut alarms_fired = 0u64;
        let termination = loop {
            if !self.should_continue() {
                break Termination::Cancelled;
            }

            let frame = match guard.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => break Termination::Exhausted,
                Err(e) => {
                    log::warn!("run {}: {e}", self.run_id);
                    self.notice(format!("stopped early: {e}"));
                    break Termination::ReadFailure {
                        message: e.to_string(),
                    };
                }
            };

            match self.process_frame(&frame, &info, &mut debouncer, processed + 1) {
                Ok(report) => {
                    processed = report.processed;
                    if report.alarm_fired {
                        alarms_fired += 1;
                    }
                    self.events.publish(RunEvent::Frame {
                        run_id: self.run_id,
                        report,
                    });
                }
                Err(e) => match policy {
                    InferenceFailurePolicy::Abort => {
                        log::error!("run {}: {e}, aborting", self.run_id);
                        self.notice(format!("aborted: {e}"));
                        break Termination::InferenceFailure {
                            message: e.to_string(),
                        };
                    }
                    InferenceFailurePolicy::Skip => {
                        log::warn!("run {}: {e}, skipping frame", self.run_id);
                        self.notice(format!("skipped frame {}: {e}", frame.index));
                        processed += 1;
                        self.events.publish(RunEvent::Frame {
                            run_id: self.run_id,
                            report: FrameReport {
                                frame_index: frame.index,
                                status: debouncer.status(),
                                matched_labels: Vec::new(),
                                alarm_fired: false,
                                skipped: true,
                                processed,
                                total: info.total_frames,
                            },
                        });
                    }
                },
            }
        };

        guard.release();

        let hazard_detected = match info.kind {
            SourceKind::Image => debouncer.any_hazard(),
            SourceKind::Video | SourceKind::Camera => debouncer.ever_triggered(),
        };
        let record = HistoryRecord::new(
            info.kind,
            hazard_detected,
            started.elapsed().as_secs_f64(),
            processed,
        );
        log::info!(
            "run {}: {} after {} frames in {:.2}s ({:?})",
            self.run_id,
            record.result_label,
            processed,
            record.processing_time,
            termination
        );

        Ok(RunOutcome {
            record,
            termination,
            final_status: debouncer.status(),
            required_frames: debouncer.required_frames(),
            alarms_fired,
        })
    }

    /// Classifies one frame and advances the debouncer. Fires the alarm when due.
    pub fn process_frame(
        &self,
        frame: &Frame,
        info: &SourceInfo,
        debouncer: &mut Debouncer,
        processed: u64,
    ) -> Result<FrameReport, InferenceError> {
        let detections = self
            .detector
            .predict(frame, self.config.confidence_threshold)?;
        let classification = classify(
            &detections,
            self.config.confidence_threshold,
            &self.config.hazard_labels,
        );
        let step = debouncer.step(classification.hazard_present);

        let still_alarm = info.kind == SourceKind::Image
            && self.config.alarm_on_still_hazard
            && classification.hazard_present;
        let alarm_fired = step.fire_alarm || still_alarm;
        if alarm_fired {
            log::warn!(
                "run {}: alarm on frame {} ({})",
                self.run_id,
                frame.index,
                step.status
            );
            self.alarm.fire();
            self.events.publish(RunEvent::Alarm {
                run_id: self.run_id,
                frame_index: frame.index,
            });
        }

        Ok(FrameReport {
            frame_index: frame.index,
            status: step.status,
            matched_labels: classification.matched_labels.into_iter().collect(),
            alarm_fired,
            skipped: false,
            processed,
            total: info.total_frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::Detection;
    use crate::core_modules::frame_source::FrameSequence;

    /// Reports fire on the frame indices listed in `hot`.
    struct Scripted {
        hot: Vec<u64>,
    }

    impl Detector for Scripted {
        fn predict(&self, frame: &Frame, _threshold: f32) -> Result<Vec<Detection>, InferenceError> {
            if self.hot.contains(&frame.index) {
                Ok(vec![Detection::new("Fire", 0.9)])
            } else {
                Ok(vec![Detection::new("person", 0.9)])
            }
        }
    }

    fn frames(n: usize) -> Vec<Frame> {
        vec![Frame::filled(0, 2, 2, [0, 0, 0, 255]); n]
    }

    fn pipeline(hot: Vec<u64>, alarm: AlarmDispatcher) -> HazardPipeline {
        HazardPipeline::new(
            1,
            Arc::new(EmberConfig::default()),
            Arc::new(Scripted { hot }),
            alarm,
            EventBus::new(16),
        )
    }

    #[test]
    fn video_summary_uses_triggered_episodes() {
        let alarm = AlarmDispatcher::logging();
        // 20 hazard frames at 30 fps never reach 30 consecutive frames.
        let outcome = pipeline((0..20).collect(), alarm.clone())
            .run(FrameSequence::video(frames(25), Some(30.0)))
            .expect("run");
        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(outcome.record.frame_count, 25);
        assert!(!outcome.record.hazard_detected);
        assert_eq!(alarm.fired_count(), 0);
    }

    #[test]
    fn still_image_fires_on_hazard_without_sustaining() {
        let alarm = AlarmDispatcher::logging();
        let outcome = pipeline(vec![0], alarm.clone())
            .run(FrameSequence::still(Frame::filled(0, 2, 2, [0, 0, 0, 255])))
            .expect("run");
        assert!(outcome.record.hazard_detected);
        assert_eq!(outcome.record.source_type, SourceKind::Image);
        assert_eq!(
            outcome.final_status,
            EpisodeStatus::Warning {
                count: 1,
                duration_secs: 1.0 / 30.0
            }
        );
        assert_eq!(outcome.alarms_fired, 1);
        assert_eq!(alarm.fired_count(), 1);
    }

    #[test]
    fn toggle_off_before_start_processes_nothing() {
        let (control, rx) = crate::bus::ControlHandle::channel();
        control.stop();
        let outcome = pipeline(vec![], AlarmDispatcher::logging())
            .with_toggle(rx)
            .run(FrameSequence::live(frames(1), None))
            .expect("run");
        assert_eq!(outcome.termination, Termination::Cancelled);
        assert_eq!(outcome.record.frame_count, 0);
    }
}
