//! Drowsiness Detection Pipeline
//!
//! Real-time classification of a live video stream into a debounced alert
//! signal:
//! - bounded frame ingestion (drop-newest, freshness over completeness)
//! - batched asynchronous inference on a dedicated worker thread
//! - sliding-window drowsiness ratio with hysteresis and cooldown
//! - bounded evidence ring with detached, at-most-one-in-flight persistence
//!
//! The caller drives [`DrowsinessPipeline::process_frame`] once per displayed
//! frame; that path never blocks on inference or I/O.

pub mod config;
pub mod overlay;
pub mod persister;
pub mod pipeline;
pub mod state;
pub mod window;
pub mod worker;

pub use config::DetectorConfig;
pub use persister::EvidencePersister;
pub use pipeline::{AlertCallback, DrowsinessPipeline, PipelineStats, PipelineStatus};
pub use state::{AlertPhase, AlertStateMachine};
pub use window::RollingWindow;
pub use worker::ClassifiedFrame;

use thiserror::Error;

/// Detection pipeline error types
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline already started")]
    AlreadyStarted,
}
