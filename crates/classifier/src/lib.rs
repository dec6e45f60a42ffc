//! Drowsiness Classifier Interface
//!
//! The detection pipeline treats the neural classifier as an opaque batch
//! capability: hand over a slice of frames, get back one class/confidence
//! pair per frame. Model loading and inference live behind the
//! [`BatchClassifier`] trait; this crate ships two development-mode
//! implementations ([`LuminanceClassifier`], [`ScriptedClassifier`]) in the
//! same spirit as running an inference engine in mock mode until the real
//! model is wired up.

mod luminance;
mod scripted;

pub use luminance::LuminanceClassifier;
pub use scripted::ScriptedClassifier;

use frame_source::VideoFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classifier error types
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Predicted driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictedClass {
    Alert,
    Drowsy,
}

impl PredictedClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictedClass::Alert => "alert",
            PredictedClass::Drowsy => "drowsy",
        }
    }

    pub fn is_drowsy(&self) -> bool {
        matches!(self, PredictedClass::Drowsy)
    }
}

/// Single-frame classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub class: PredictedClass,
    /// Model confidence in [0, 1]
    pub confidence: f32,
}

impl Classification {
    pub fn new(class: PredictedClass, confidence: f32) -> Self {
        Self { class, confidence }
    }
}

/// Batch image classification capability.
///
/// Implementations must return exactly one [`Classification`] per input
/// frame, in input order. Inference may be slow; callers keep it off the
/// per-frame hot path.
pub trait BatchClassifier: Send {
    fn classify_batch(&self, frames: &[VideoFrame]) -> Result<Vec<Classification>, ClassifierError>;
}
