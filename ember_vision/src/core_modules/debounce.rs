// THEORY:
// The `debounce` module is the temporal heart of the decision layer. A detector
// answers per frame and is noisy: a reflection, a red jacket, or a single bad
// frame can all look like fire for an instant. The `Debouncer` only believes a
// hazard once it has been observed on enough *consecutive* frames to cover the
// configured alarm duration at the source's frame rate.
//
// Key rules:
// 1.  **Hard reset**: one clean frame drops the episode entirely. There is no
//     grace period and no decay, the count goes straight back to zero.
// 2.  **Edge-triggered alarm**: the alarm is requested on the single frame where
//     the count first reaches `required_frames`. Staying in `Sustained` does not
//     request it again; only a reset re-arms it.
// 3.  **Decoupled outputs**: the display status and the alarm request are
//     separate fields of a `Step`, so a presentation layer can render the status
//     without caring whether this was the edge frame.

use serde::{Deserialize, Serialize};

/// Frame rate assumed when a source reports zero, nothing, or garbage.
pub const FALLBACK_FRAME_RATE: f64 = 30.0;

/// Returns the reported frame rate, or `FALLBACK_FRAME_RATE` when it is unusable.
pub fn effective_frame_rate(reported: Option<f64>) -> f64 {
    match reported {
        Some(fps) if fps.is_finite() && fps > 0.0 => fps,
        _ => FALLBACK_FRAME_RATE,
    }
}

/// `max(1, round(frame_rate * alarm_duration_secs))`.
pub fn required_frames(frame_rate: Option<f64>, alarm_duration_secs: f64) -> u64 {
    let frames = (effective_frame_rate(frame_rate) * alarm_duration_secs).round();
    if frames.is_finite() && frames >= 1.0 {
        frames as u64
    } else {
        1
    }
}

/// The mutable part of an episode. Owned by exactly one run loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpisodeState {
    pub consecutive_count: u64,
    pub triggered: bool,
}

/// Display status for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EpisodeStatus {
    Safe,
    /// Hazard seen, but not for long enough yet.
    Warning { count: u64, duration_secs: f64 },
    /// Hazard persisted for at least `required_frames`.
    Sustained {
        count: u64,
        duration_secs: f64,
        triggered: bool,
    },
}

impl EpisodeStatus {
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }

    pub fn is_sustained(&self) -> bool {
        matches!(self, Self::Sustained { .. })
    }
}

impl std::fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Warning { duration_secs, .. } => {
                write!(f, "hazard detected for {duration_secs:.1}s")
            }
            Self::Sustained { duration_secs, .. } => {
                write!(f, "sustained hazard for {duration_secs:.1}s")
            }
        }
    }
}

/// Result of feeding one frame's hazard flag to the `Debouncer`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub status: EpisodeStatus,
    /// True only on the frame that first reaches `required_frames` since the last reset.
    pub fire_alarm: bool,
}

/// Pure transition function. Returns the next state and whether the alarm must fire.
pub fn transition(state: EpisodeState, hazard_present: bool, required_frames: u64) -> (EpisodeState, bool) {
    if !hazard_present {
        return (EpisodeState::default(), false);
    }

    let consecutive_count = state.consecutive_count.saturating_add(1);
    if consecutive_count < required_frames {
        return (
            EpisodeState {
                consecutive_count,
                triggered: false,
            },
            false,
        );
    }

    let fire = !state.triggered;
    (
        EpisodeState {
            consecutive_count,
            triggered: true,
        },
        fire,
    )
}

/// Per-run debounce state machine.
#[derive(Debug, Clone)]
pub struct Debouncer {
    frame_rate: f64,
    required_frames: u64,
    state: EpisodeState,
    /// Any episode reached `Sustained` during this run.
    ever_triggered: bool,
    /// Any frame of this run was a hazard frame.
    any_hazard: bool,
}

impl Debouncer {
    pub fn new(frame_rate: Option<f64>, alarm_duration_secs: f64) -> Self {
        Self {
            frame_rate: effective_frame_rate(frame_rate),
            required_frames: required_frames(frame_rate, alarm_duration_secs),
            state: EpisodeState::default(),
            ever_triggered: false,
            any_hazard: false,
        }
    }

    pub fn step(&mut self, hazard_present: bool) -> Step {
        let (next, fire_alarm) = transition(self.state, hazard_present, self.required_frames);
        self.state = next;
        self.any_hazard |= hazard_present;
        self.ever_triggered |= fire_alarm;
        Step {
            status: self.status(),
            fire_alarm,
        }
    }

    /// Status for the current state, without advancing it.
    pub fn status(&self) -> EpisodeStatus {
        let count = self.state.consecutive_count;
        let duration_secs = count as f64 / self.frame_rate;
        if count == 0 {
            EpisodeStatus::Safe
        } else if count < self.required_frames {
            EpisodeStatus::Warning {
                count,
                duration_secs,
            }
        } else {
            EpisodeStatus::Sustained {
                count,
                duration_secs,
                triggered: self.state.triggered,
            }
        }
    }

    pub fn state(&self) -> EpisodeState {
        self.state
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn required_frames(&self) -> u64 {
        self.required_frames
    }

    pub fn ever_triggered(&self) -> bool {
        self.ever_triggered
    }

    pub fn any_hazard(&self) -> bool {
        self.any_hazard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_frames_rounds_and_falls_back() {
        assert_eq!(required_frames(Some(30.0), 1.0), 30);
        assert_eq!(required_frames(Some(0.0), 1.0), 30);
        assert_eq!(required_frames(None, 1.0), 30);
        assert_eq!(required_frames(Some(f64::NAN), 1.0), 30);
        assert_eq!(required_frames(Some(29.97), 1.0), 30);
        assert_eq!(required_frames(Some(25.0), 0.5), 13);
        assert_eq!(required_frames(Some(30.0), 0.001), 1);
    }

    #[test]
    fn clean_frame_is_a_hard_reset() {
        let mut debouncer = Debouncer::new(Some(10.0), 0.3);
        for _ in 0..5 {
            debouncer.step(true);
        }
        assert!(debouncer.state().triggered);

        let step = debouncer.step(false);
        assert_eq!(step.status, EpisodeStatus::Safe);
        assert!(!step.fire_alarm);
        assert_eq!(debouncer.state(), EpisodeState::default());
    }

    #[test]
    fn alarm_is_edge_triggered_per_episode() {
        let mut debouncer = Debouncer::new(Some(10.0), 0.3);
        let pattern = [
            true, true, true, true, true, // episode 1: fires on frame 3
            false, // re-arm
            true, true, // too short
            false, true, true, true, true, // episode 2: fires again
        ];
        let fired: Vec<usize> = pattern
            .iter()
            .enumerate()
            .filter_map(|(i, &hazard)| debouncer.step(hazard).fire_alarm.then_some(i))
            .collect();
        assert_eq!(fired, vec![2, 11]);
        assert!(debouncer.ever_triggered());
    }

    #[test]
    fn warning_reports_duration_then_sustained() {
        let mut debouncer = Debouncer::new(Some(4.0), 1.0);
        let step = debouncer.step(true);
        assert_eq!(
            step.status,
            EpisodeStatus::Warning {
                count: 1,
                duration_secs: 0.25
            }
        );
        debouncer.step(true);
        debouncer.step(true);
        let step = debouncer.step(true);
        assert!(step.fire_alarm);
        assert_eq!(
            step.status,
            EpisodeStatus::Sustained {
                count: 4,
                duration_secs: 1.0,
                triggered: true
            }
        );
        let step = debouncer.step(true);
        assert!(!step.fire_alarm);
        assert!(step.status.is_sustained());
    }

    #[test]
    fn single_frame_threshold_fires_every_episode() {
        let mut debouncer = Debouncer::new(Some(1.0), 0.2);
        assert_eq!(debouncer.required_frames(), 1);
        assert!(debouncer.step(true).fire_alarm);
        assert!(!debouncer.step(true).fire_alarm);
        assert!(!debouncer.step(false).fire_alarm);
        assert!(debouncer.step(true).fire_alarm);
    }

    #[test]
    fn transition_keeps_triggered_only_above_threshold() {
        let (state, fire) = transition(EpisodeState::default(), true, 3);
        assert_eq!(state.consecutive_count, 1);
        assert!(!state.triggered);
        assert!(!fire);

        let (state, fire) = transition(
            EpisodeState {
                consecutive_count: 2,
                triggered: false,
            },
            true,
            3,
        );
        assert!(state.triggered);
        assert!(fire);
    }
}
