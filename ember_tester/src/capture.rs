use ember_vision::{Frame, FrameSource, SourceError, SourceInfo, SourceKind};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::PathBuf;

enum Target {
    File(PathBuf),
    Device(i32),
}

/// OpenCV `VideoCapture` behind the `FrameSource` trait. Frames are converted from
/// BGR to the RGBA layout the detectors expect.
pub struct OpenCvCapture {
    target: Target,
    cap: Option<VideoCapture>,
    bgr: Mat,
    frames_read: u64,
}

impl OpenCvCapture {
    pub fn video(path: impl Into<PathBuf>) -> Self {
        Self::new(Target::File(path.into()))
    }

    pub fn camera(device: i32) -> Self {
        Self::new(Target::Device(device))
    }

    fn new(target: Target) -> Self {
        Self {
            target,
            cap: None,
            bgr: Mat::default(),
            frames_read: 0,
        }
    }

    fn origin(&self) -> String {
        match &self.target {
            Target::File(path) => path.display().to_string(),
            Target::Device(index) => format!("camera {index}"),
        }
    }

    fn to_frame(&self) -> opencv::Result<Frame> {
        let mut rgba = Mat::default();
        imgproc::cvt_color(&self.bgr, &mut rgba, imgproc::COLOR_BGR2RGBA, 0)?;
        let data: Vec<u8> = rgba.data_bytes()?.to_vec();
        Ok(Frame::from_rgba(
            self.frames_read,
            rgba.cols() as u32,
            rgba.rows() as u32,
            data,
        ))
    }
}

impl FrameSource for OpenCvCapture {
    fn open(&mut self) -> Result<SourceInfo, SourceError> {
        let origin = self.origin();
        let (cap, kind) = match &self.target {
            Target::File(path) => (
                VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY),
                SourceKind::Video,
            ),
            Target::Device(index) => (VideoCapture::new(*index, videoio::CAP_ANY), SourceKind::Camera),
        };
        let cap = cap.map_err(|e| SourceError::unavailable(origin.clone(), e))?;
        if !cap
            .is_opened()
            .map_err(|e| SourceError::unavailable(origin.clone(), e))?
        {
            return Err(SourceError::unavailable(origin, "could not be opened"));
        }

        let frame_rate = cap.get(videoio::CAP_PROP_FPS).ok().filter(|fps| *fps > 0.0);
        let total_frames = match kind {
            SourceKind::Video => cap
                .get(videoio::CAP_PROP_FRAME_COUNT)
                .ok()
                .filter(|count| *count >= 1.0)
                .map(|count| count as u64),
            _ => None,
        };
        log::debug!("opened {origin}: fps={frame_rate:?} frames={total_frames:?}");

        self.cap = Some(cap);
        self.frames_read = 0;
        Ok(SourceInfo {
            kind,
            frame_rate,
            total_frames,
            origin,
        })
    }

    fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        let frames_read = self.frames_read;
        let Some(cap) = self.cap.as_mut() else {
            return Err(SourceError::read_failure(frames_read, "capture is not open"));
        };
        let got_frame = cap
            .read(&mut self.bgr)
            .map_err(|e| SourceError::read_failure(frames_read, e))?;

        if !got_frame || self.bgr.empty() {
            return match self.target {
                // End of file.
                Target::File(_) => Ok(None),
                Target::Device(_) => Err(SourceError::read_failure(
                    frames_read,
                    "camera delivered no frame",
                )),
            };
        }

        let frame = self
            .to_frame()
            .map_err(|e| SourceError::read_failure(frames_read, e))?;
        self.frames_read += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if let Some(mut cap) = self.cap.take() {
            if let Err(e) = cap.release() {
                log::warn!("failed to release {}: {e}", self.origin());
            }
        }
    }
}
