//! Frame Source Abstraction
//!
//! Provides the video frame type consumed by the detection pipeline and a
//! trait boundary over the capture device. Real deployments plug a camera
//! behind [`FrameSource`]; tests and demos use [`SyntheticFrameSource`].

pub mod frame;
pub mod synthetic;

pub use frame::VideoFrame;
pub use synthetic::SyntheticFrameSource;

use thiserror::Error;

/// Capture source error types
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open capture device: {0}")]
    Open(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Capture device disconnected")]
    Disconnected,

    #[error("Capture timeout")]
    Timeout,
}

/// A source of video frames.
///
/// `read` returns `Ok(None)` when the stream has ended (e.g. a file source
/// ran out of frames). A live camera source blocks until the next frame or
/// returns an error.
pub trait FrameSource {
    fn read(&mut self) -> Result<Option<VideoFrame>, SourceError>;
}
