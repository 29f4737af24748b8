// THEORY:
// `ChromaDetector` is a reference implementation of the `Detector` seam that needs
// no trained model. It works the way the rest of this crate looks at images: the
// frame is sliced into a grid of fixed-size chunks, each chunk is reduced to its
// average pixel (which cancels single-pixel sensor noise), and each average is
// judged on single-pixel heuristics only: hue, saturation and value.
//
// - Flame-like chunks are warm (red to yellow hue), saturated, bright, and have
//   the classic `R >= G >= B` channel ordering.
// - Smoke-like chunks are nearly achromatic and mid-bright.
//
// The fraction of flagged chunks becomes the confidence, saturating once
// `full_confidence_coverage` of the frame is covered. It is deliberately crude; a
// real deployment plugs a trained detector into the same trait.

use crate::core_modules::detection::{BoundingBox, Detection, Detector};
use crate::core_modules::frame_source::Frame;
use crate::error::InferenceError;

const CHANNELS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct ChromaConfig {
    pub chunk_width: u32,
    pub chunk_height: u32,
    pub fire_label: String,
    pub smoke_label: String,
    /// Upper bound of the flame hue band, in degrees from red.
    pub flame_hue_max: f32,
    pub flame_min_saturation: f32,
    pub flame_min_value: f32,
    pub smoke_max_saturation: f32,
    pub smoke_min_value: f32,
    pub smoke_max_value: f32,
    /// Share of chunks that maps to confidence 1.0.
    pub full_confidence_coverage: f32,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            chunk_width: 10,
            chunk_height: 10,
            fire_label: "Fire".to_string(),
            smoke_label: "smoke".to_string(),
            flame_hue_max: 65.0,
            flame_min_saturation: 0.45,
            flame_min_value: 0.55,
            smoke_max_saturation: 0.12,
            smoke_min_value: 0.35,
            smoke_max_value: 0.85,
            full_confidence_coverage: 0.08,
        }
    }
}

/// Hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
fn hsv(red: f32, green: f32, blue: f32) -> (f32, f32, f32) {
    let max = red.max(green).max(blue);
    let min = red.min(green).min(blue);
    let chroma = max - min;
    let value = max / 255.0;
    let saturation = if max > 0.0 { chroma / max } else { 0.0 };
    let hue = if chroma <= f32::EPSILON {
        0.0
    } else if max == red {
        60.0 * ((green - blue) / chroma).rem_euclid(6.0)
    } else if max == green {
        60.0 * ((blue - red) / chroma + 2.0)
    } else {
        60.0 * ((red - green) / chroma + 4.0)
    };
    (hue, saturation, value)
}

#[derive(Debug, Default)]
struct Coverage {
    chunks: u32,
    bounds: Option<BoundingBox>,
}

impl Coverage {
    fn mark(&mut self, x0: u32, y0: u32, x1: u32, y1: u32) {
        self.chunks += 1;
        self.bounds = Some(match self.bounds {
            None => BoundingBox { x0, y0, x1, y1 },
            Some(b) => BoundingBox {
                x0: b.x0.min(x0),
                y0: b.y0.min(y0),
                x1: b.x1.max(x1),
                y1: b.y1.max(y1),
            },
        });
    }
}

/// Colour-heuristic fire and smoke detector.
#[derive(Debug, Clone, Default)]
pub struct ChromaDetector {
    config: ChromaConfig,
}

impl ChromaDetector {
    pub fn new(config: ChromaConfig) -> Self {
        Self { config }
    }

    fn is_flame(&self, (red, green, blue): (f32, f32, f32)) -> bool {
        let (hue, saturation, value) = hsv(red, green, blue);
        red >= green
            && green >= blue
            && hue <= self.config.flame_hue_max
            && saturation >= self.config.flame_min_saturation
            && value >= self.config.flame_min_value
    }

    fn is_smoke(&self, (red, green, blue): (f32, f32, f32)) -> bool {
        let (_, saturation, value) = hsv(red, green, blue);
        saturation <= self.config.smoke_max_saturation
            && (self.config.smoke_min_value..=self.config.smoke_max_value).contains(&value)
    }

    fn average_chunk(frame: &Frame, x0: u32, y0: u32, x1: u32, y1: u32) -> (f32, f32, f32) {
        let mut sums = [0u64; 3];
        let mut count = 0u64;
        for y in y0..y1 {
            let row = (y * frame.width) as usize * CHANNELS;
            for x in x0..x1 {
                let i = row + x as usize * CHANNELS;
                sums[0] += frame.data[i] as u64;
                sums[1] += frame.data[i + 1] as u64;
                sums[2] += frame.data[i + 2] as u64;
                count += 1;
            }
        }
        let count = count.max(1) as f32;
        (
            sums[0] as f32 / count,
            sums[1] as f32 / count,
            sums[2] as f32 / count,
        )
    }

    fn confidence(&self, coverage: &Coverage, total_chunks: u32) -> f32 {
        let share = coverage.chunks as f32 / total_chunks.max(1) as f32;
        (share / self.config.full_confidence_coverage.max(f32::EPSILON)).min(1.0)
    }
}

impl Detector for ChromaDetector {
    fn predict(
        &self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, InferenceError> {
        let expected = frame.width as usize * frame.height as usize * CHANNELS;
        if frame.data.len() < expected {
            return Err(InferenceError::new(
                frame.index,
                format!(
                    "frame buffer holds {} bytes, {}x{} RGBA needs {expected}",
                    frame.data.len(),
                    frame.width,
                    frame.height
                ),
            ));
        }
        if frame.width == 0 || frame.height == 0 {
            return Ok(Vec::new());
        }

        let chunk_w = self.config.chunk_width.clamp(1, frame.width);
        let chunk_h = self.config.chunk_height.clamp(1, frame.height);
        let grid_w = frame.width / chunk_w;
        let grid_h = frame.height / chunk_h;

        let mut flame = Coverage::default();
        let mut smoke = Coverage::default();
        for gy in 0..grid_h {
            for gx in 0..grid_w {
                let (x0, y0) = (gx * chunk_w, gy * chunk_h);
                let (x1, y1) = (x0 + chunk_w, y0 + chunk_h);
                let average = Self::average_chunk(frame, x0, y0, x1, y1);
                if self.is_flame(average) {
                    flame.mark(x0, y0, x1, y1);
                } else if self.is_smoke(average) {
                    smoke.mark(x0, y0, x1, y1);
                }
            }
        }

        let total_chunks = grid_w * grid_h;
        let mut detections = Vec::new();
        for (label, coverage) in [(&self.config.fire_label, &flame), (&self.config.smoke_label, &smoke)] {
            let Some(bounds) = coverage.bounds else {
                continue;
            };
            let confidence = self.confidence(coverage, total_chunks);
            if confidence >= confidence_threshold {
                detections.push(Detection::new(label.clone(), confidence).with_box(bounds));
            }
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsv_of_primary_colours() {
        let (h, s, v) = hsv(255.0, 0.0, 0.0);
        assert_eq!((h, s, v), (0.0, 1.0, 1.0));
        let (h, _, _) = hsv(0.0, 255.0, 0.0);
        assert_eq!(h, 120.0);
        let (h, s, _) = hsv(128.0, 128.0, 128.0);
        assert_eq!((h, s), (0.0, 0.0));
    }

    #[test]
    fn flame_coloured_frame_is_fire() {
        let frame = Frame::filled(0, 40, 40, [230, 90, 20, 255]);
        let detections = ChromaDetector::default().predict(&frame, 0.5).expect("predict");
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_label, "Fire");
        assert_eq!(detections[0].confidence, 1.0);
        assert_eq!(
            detections[0].bounding_box,
            Some(BoundingBox { x0: 0, y0: 0, x1: 40, y1: 40 })
        );
    }

    #[test]
    fn grey_frame_is_smoke_and_dark_frame_is_nothing() {
        let detector = ChromaDetector::default();
        let grey = Frame::filled(0, 20, 20, [128, 128, 128, 255]);
        let detections = detector.predict(&grey, 0.5).expect("predict");
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_label, "smoke");

        let dark = Frame::filled(1, 20, 20, [10, 12, 30, 255]);
        assert!(detector.predict(&dark, 0.0).expect("predict").is_empty());
    }

    #[test]
    fn small_flame_patch_scales_confidence_and_box() {
        // 10x10 grid of chunks, a single flame chunk in the corner is 1% coverage.
        let mut data = vec![0u8; 100 * 100 * CHANNELS];
        for pixel in data.chunks_mut(CHANNELS) {
            pixel.copy_from_slice(&[20, 60, 20, 255]);
        }
        for y in 90..100 {
            for x in 90..100 {
                let i = (y * 100 + x) * CHANNELS;
                data[i..i + CHANNELS].copy_from_slice(&[240, 120, 30, 255]);
            }
        }
        let frame = Frame::from_rgba(0, 100, 100, data);
        let detector = ChromaDetector::default();

        let detections = detector.predict(&frame, 0.0).expect("predict");
        assert_eq!(detections.len(), 1);
        assert!((detections[0].confidence - 0.125).abs() < 1e-6);
        assert_eq!(
            detections[0].bounding_box,
            Some(BoundingBox { x0: 90, y0: 90, x1: 100, y1: 100 })
        );

        assert!(detector.predict(&frame, 0.5).expect("predict").is_empty());
    }

    #[test]
    fn truncated_buffer_is_an_inference_error() {
        let frame = Frame::from_rgba(7, 10, 10, vec![0u8; 12]);
        let err = ChromaDetector::default().predict(&frame, 0.5).unwrap_err();
        assert_eq!(err.frame_index, 7);
    }
}
