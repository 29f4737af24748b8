use crate::error::AlarmError;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// The notification collaborator that actually makes noise.
pub trait AlarmSink: Send + Sync {
    /// Verifies that everything the sink needs is present. Called before a run starts.
    fn check(&self) -> Result<(), AlarmError> {
        Ok(())
    }

    fn play(&self) -> Result<(), AlarmError>;
}

/// Sink that only writes a log line.
#[derive(Debug, Default)]
pub struct LogAlarm;

impl AlarmSink for LogAlarm {
    fn play(&self) -> Result<(), AlarmError> {
        log::warn!("ALARM: sustained hazard detected");
        Ok(())
    }
}

/// Sink backed by a sound asset on disk. Playback itself is left to the terminal:
/// it rings the bell and logs the asset that a real player would open.
#[derive(Debug, Clone)]
pub struct SoundFileAlarm {
    path: PathBuf,
}

impl SoundFileAlarm {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl AlarmSink for SoundFileAlarm {
    fn check(&self) -> Result<(), AlarmError> {
        if self.path.is_file() {
            Ok(())
        } else {
            Err(AlarmError::MissingAsset {
                path: self.path.display().to_string(),
            })
        }
    }

    fn play(&self) -> Result<(), AlarmError> {
        self.check()?;
        let mut stderr = std::io::stderr();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(AlarmError::playback)?;
        log::warn!("ALARM: sustained hazard detected, playing {}", self.path.display());
        Ok(())
    }
}

/// Fires the alarm on behalf of the debouncer. Performs no deduplication: the
/// caller decides when an alarm is due, this only delivers it.
#[derive(Clone)]
pub struct AlarmDispatcher {
    sink: Arc<dyn AlarmSink>,
    fired: Arc<AtomicU64>,
}

impl AlarmDispatcher {
    pub fn new(sink: Arc<dyn AlarmSink>) -> Self {
        Self {
            sink,
            fired: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn logging() -> Self {
        Self::new(Arc::new(LogAlarm))
    }

    pub fn check(&self) -> Result<(), AlarmError> {
        self.sink.check()
    }

    /// Best-effort delivery. Sink failures are logged and swallowed so the
    /// processing loop keeps running.
    pub fn fire(&self) {
        self.fired.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.sink.play() {
            log::warn!("alarm delivery failed: {e}");
        }
    }

    /// Number of times `fire` has been called across all runs.
    pub fn fired_count(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for AlarmDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmDispatcher")
            .field("fired", &self.fired_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FailingSink {
        attempts: AtomicUsize,
    }

    impl AlarmSink for FailingSink {
        fn play(&self) -> Result<(), AlarmError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(AlarmError::playback("speaker unplugged"))
        }
    }

    #[test]
    fn fire_swallows_sink_failures() {
        let sink = Arc::new(FailingSink {
            attempts: AtomicUsize::new(0),
        });
        let dispatcher = AlarmDispatcher::new(sink.clone());
        dispatcher.fire();
        dispatcher.fire();
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.fired_count(), 2);
    }

    #[test]
    fn sound_file_alarm_requires_asset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = SoundFileAlarm::new(dir.path().join("alarm.mp3"));
        assert!(matches!(missing.check(), Err(AlarmError::MissingAsset { .. })));

        let path = dir.path().join("present.mp3");
        std::fs::write(&path, b"ID3").expect("write asset");
        let present = SoundFileAlarm::new(&path);
        present.check().expect("asset exists");
        assert_eq!(present.path(), path.as_path());
    }

    #[test]
    fn clones_share_the_counter() {
        let dispatcher = AlarmDispatcher::logging();
        let clone = dispatcher.clone();
        clone.fire();
        assert_eq!(dispatcher.fired_count(), 1);
        dispatcher.check().expect("log sink has no asset");
    }
}
