//! Rule-based stand-in classifier

use crate::{BatchClassifier, Classification, ClassifierError, PredictedClass};
use frame_source::VideoFrame;
use tracing::debug;

/// Luminance-threshold classifier (development mode).
///
/// Stands in for the neural model: dark frames read as closed eyes / low
/// cabin light and classify as drowsy, bright frames as alert. Confidence
/// scales with distance from the threshold. Useful for exercising the full
/// pipeline without model weights on disk.
pub struct LuminanceClassifier {
    /// Mean luminance below which a frame classifies as drowsy
    dark_threshold: f32,
}

impl LuminanceClassifier {
    pub fn new(dark_threshold: f32) -> Self {
        debug!(dark_threshold, "luminance classifier created");
        Self { dark_threshold }
    }

    fn classify_one(&self, frame: &VideoFrame) -> Classification {
        let luma = frame.mean_luminance();
        let distance = (luma - self.dark_threshold).abs() / 255.0;
        let confidence = (0.5 + distance * 2.0).clamp(0.5, 0.99);

        let class = if luma < self.dark_threshold {
            PredictedClass::Drowsy
        } else {
            PredictedClass::Alert
        };
        Classification::new(class, confidence)
    }
}

impl Default for LuminanceClassifier {
    fn default() -> Self {
        Self::new(64.0)
    }
}

impl BatchClassifier for LuminanceClassifier {
    fn classify_batch(&self, frames: &[VideoFrame]) -> Result<Vec<Classification>, ClassifierError> {
        Ok(frames.iter().map(|f| self.classify_one(f)).collect())
    }
}
