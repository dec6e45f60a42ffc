//! Violation Lifecycle
//!
//! Tracks open drowsy episodes between an alert firing and the human verdict.
//! Frames observed during an open episode are buffered in memory; only a
//! confirmed episode pays any persistence cost, and then only for frames
//! above the confidence floor.

mod manager;

pub use manager::{ViolationConfig, ViolationManager};
