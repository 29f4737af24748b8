// THEORY:
// A `FrameSource` hides where frames come from. The decision layer sees three
// shapes of input and treats them identically except for how the loop ends:
//
// - a still image: exactly one frame, then exhausted;
// - a recorded video: a finite, ordered run with a known total, so progress can be
//   reported as `processed / total`;
// - a live camera: unbounded, ended only by the caller's toggle or a failed read.
//
// Every source holds some capture resource (a decoder, a device handle). The
// `CaptureGuard` owns the source for the lifetime of a run and releases it exactly
// once, whether the loop finishes, breaks early, returns an error, or unwinds.

use crate::core_modules::history::SourceKind;
use crate::error::SourceError;
use std::path::PathBuf;
use std::sync::Arc;

/// One RGBA frame handed to the detector.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based position of the frame within its run.
    pub index: u64,
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 pixels, `width * height * 4` bytes.
    pub data: Arc<[u8]>,
}

impl Frame {
    pub fn from_rgba(index: u64, width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            index,
            width,
            height,
            data: data.into(),
        }
    }

    /// A frame where every pixel has the same RGBA value.
    pub fn filled(index: u64, width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Self::from_rgba(index, width, height, data)
    }

    /// Returns a copy of this frame re-numbered to `index`. Pixel data is shared.
    pub fn renumbered(&self, index: u64) -> Self {
        Self {
            index,
            ..self.clone()
        }
    }
}

/// What a source reports about itself once opened.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub kind: SourceKind,
    /// Frames per second as reported by the source, if it reports one.
    pub frame_rate: Option<f64>,
    /// Known frame count for bounded sources.
    pub total_frames: Option<u64>,
    /// Human-readable origin, used in logs and messages.
    pub origin: String,
}

/// Produces frames on demand, one at a time, in order.
pub trait FrameSource: Send {
    /// Acquires the underlying resource. Failing here means the run never starts.
    fn open(&mut self) -> Result<SourceInfo, SourceError>;

    /// Returns the next frame, `None` once a bounded source is exhausted.
    fn read(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Releases the underlying resource. Only ever called once, by `CaptureGuard`.
    fn release(&mut self);
}

/// Scoped ownership of a source. Releases it exactly once, at the latest on drop.
pub struct CaptureGuard<S: FrameSource> {
    source: S,
    released: bool,
}

impl<S: FrameSource> CaptureGuard<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            released: false,
        }
    }

    pub fn open(&mut self) -> Result<SourceInfo, SourceError> {
        self.source.open()
    }

    pub fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        self.source.read()
    }

    /// Releases now instead of waiting for drop. Further calls are no-ops.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl<S: FrameSource> Drop for CaptureGuard<S> {
    fn drop(&mut self) {
        self.release();
    }
}

enum StillOrigin {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// A single decoded still image.
pub struct StillImage {
    origin: StillOrigin,
    frame: Option<Frame>,
}

impl StillImage {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            origin: StillOrigin::Path(path.into()),
            frame: None,
        }
    }

    /// An encoded image already in memory, such as an uploaded file.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            origin: StillOrigin::Bytes(bytes),
            frame: None,
        }
    }

    fn describe(&self) -> String {
        match &self.origin {
            StillOrigin::Path(path) => path.display().to_string(),
            StillOrigin::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
        }
    }
}

impl FrameSource for StillImage {
    fn open(&mut self) -> Result<SourceInfo, SourceError> {
        let origin = self.describe();
        let decoded = match &self.origin {
            StillOrigin::Path(path) => image::open(path),
            StillOrigin::Bytes(bytes) => image::load_from_memory(bytes),
        }
        .map_err(|e| SourceError::unavailable(origin.clone(), e))?;

        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        self.frame = Some(Frame::from_rgba(0, width, height, rgba.into_raw()));
        log::debug!("decoded still image {origin} ({width}x{height})");

        Ok(SourceInfo {
            kind: SourceKind::Image,
            frame_rate: None,
            total_frames: Some(1),
            origin,
        })
    }

    fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        Ok(self.frame.take())
    }

    fn release(&mut self) {
        self.frame = None;
        if let StillOrigin::Bytes(bytes) = &mut self.origin {
            bytes.clear();
        }
    }
}

/// Frames already held in memory. Finite sources behave like a recorded video,
/// looping sources like a live camera that never runs out.
pub struct FrameSequence {
    frames: Vec<Frame>,
    kind: SourceKind,
    frame_rate: Option<f64>,
    looping: bool,
    cursor: u64,
    opened: bool,
}

impl FrameSequence {
    pub fn video(frames: Vec<Frame>, frame_rate: Option<f64>) -> Self {
        Self {
            frames,
            kind: SourceKind::Video,
            frame_rate,
            looping: false,
            cursor: 0,
            opened: false,
        }
    }

    /// Cycles through `frames` forever, reporting itself as a camera.
    pub fn live(frames: Vec<Frame>, frame_rate: Option<f64>) -> Self {
        Self {
            looping: true,
            kind: SourceKind::Camera,
            ..Self::video(frames, frame_rate)
        }
    }

    pub fn still(frame: Frame) -> Self {
        Self {
            kind: SourceKind::Image,
            ..Self::video(vec![frame], None)
        }
    }
}

impl FrameSource for FrameSequence {
    fn open(&mut self) -> Result<SourceInfo, SourceError> {
        if self.frames.is_empty() && self.looping {
            return Err(SourceError::unavailable("frame sequence", "no frames to loop over"));
        }
        self.opened = true;
        self.cursor = 0;
        Ok(SourceInfo {
            kind: self.kind,
            frame_rate: self.frame_rate,
            total_frames: (!self.looping).then_some(self.frames.len() as u64),
            origin: format!("in-memory {} ({} frames)", self.kind, self.frames.len()),
        })
    }

    fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        if !self.opened {
            return Err(SourceError::read_failure(self.cursor, "sequence is not open"));
        }
        let len = self.frames.len() as u64;
        if len == 0 || (!self.looping && self.cursor >= len) {
            return Ok(None);
        }
        let frame = self.frames[(self.cursor % len) as usize].renumbered(self.cursor);
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.opened = false;
    }
}
