//! Rolling classification window

use std::collections::VecDeque;

/// Fixed-capacity window of recent per-frame classifications.
///
/// Holds `(is_drowsy, confidence)` pairs in arrival order, evicting the
/// oldest when full. The drowsiness ratio is only defined once the window
/// holds at least `min_samples` entries; before that the pipeline treats it
/// as insufficient evidence and makes no decision.
pub struct RollingWindow {
    samples: VecDeque<(bool, f32)>,
    capacity: usize,
    min_samples: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize, min_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            min_samples,
        }
    }

    /// Append a sample, evicting the oldest at capacity
    pub fn push(&mut self, is_drowsy: bool, confidence: f32) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((is_drowsy, confidence));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether enough samples have accumulated for a ratio decision
    pub fn has_evidence(&self) -> bool {
        self.samples.len() >= self.min_samples
    }

    /// Fraction of drowsy samples, or `None` below the sample floor
    pub fn drowsy_ratio(&self) -> Option<f32> {
        if !self.has_evidence() {
            return None;
        }
        let drowsy = self.samples.iter().filter(|(d, _)| *d).count();
        Some(drowsy as f32 / self.samples.len() as f32)
    }

    /// Mean confidence over the window, or `None` below the sample floor
    pub fn avg_confidence(&self) -> Option<f32> {
        if !self.has_evidence() {
            return None;
        }
        let sum: f32 = self.samples.iter().map(|(_, c)| c).sum();
        Some(sum / self.samples.len() as f32)
    }

    /// Current contents, oldest first
    pub fn samples(&self) -> impl Iterator<Item = &(bool, f32)> {
        self.samples.iter()
    }
}
