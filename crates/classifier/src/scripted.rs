//! Scripted classifier for deterministic tests

use crate::{BatchClassifier, Classification, ClassifierError};
use frame_source::VideoFrame;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Replays a fixed sequence of classifications, cycling when exhausted.
///
/// Lets tests drive the pipeline with a known prediction stream regardless
/// of frame contents. An empty script makes every batch fail, which is handy
/// for exercising the worker's error path.
pub struct ScriptedClassifier {
    script: Vec<Classification>,
    cursor: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(script: Vec<Classification>) -> Self {
        Self {
            script,
            cursor: AtomicUsize::new(0),
        }
    }

    /// A classifier whose every batch fails
    pub fn failing() -> Self {
        Self::new(Vec::new())
    }
}

impl BatchClassifier for ScriptedClassifier {
    fn classify_batch(&self, frames: &[VideoFrame]) -> Result<Vec<Classification>, ClassifierError> {
        if self.script.is_empty() {
            return Err(ClassifierError::Inference("script exhausted".into()));
        }

        Ok(frames
            .iter()
            .map(|_| {
                let i = self.cursor.fetch_add(1, Ordering::Relaxed);
                self.script[i % self.script.len()]
            })
            .collect())
    }
}
