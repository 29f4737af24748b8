// THEORY:
// The `detection` module is the seam between the decision layer and whatever
// model actually looks at the pixels. The model is an opaque collaborator: it is
// handed one frame and a confidence floor and answers with a list of labelled,
// scored boxes. Nothing downstream of this module knows how the answer was made,
// which keeps a trained network, the colour heuristic in `chroma_detector`, and
// the scripted detectors used by the tests interchangeable.

use crate::core_modules::frame_source::Frame;
use crate::error::InferenceError;
use serde::{Deserialize, Serialize};

/// Pixel-space rectangle around a detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

/// A single labelled result reported by the detector for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_label: String,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
}

impl Detection {
    pub fn new(class_label: impl Into<String>, confidence: f32) -> Self {
        Self {
            class_label: class_label.into(),
            confidence,
            bounding_box: None,
        }
    }

    pub fn with_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = Some(bounding_box);
        self
    }
}

/// The inference collaborator. Implementations may filter by `confidence_threshold`
/// themselves; the classifier applies the threshold again regardless.
pub trait Detector: Send + Sync {
    fn predict(
        &self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, InferenceError>;
}

impl<D: Detector + ?Sized> Detector for std::sync::Arc<D> {
    fn predict(
        &self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, InferenceError> {
        (**self).predict(frame, confidence_threshold)
    }
}
