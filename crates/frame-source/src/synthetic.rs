//! Synthetic frame generation for tests and demos

use crate::frame::VideoFrame;
use crate::{FrameSource, SourceError};
use tracing::debug;

/// Generates solid-luminance frames on demand.
///
/// Stands in for a camera where none is attached: each `read` yields the
/// next frame in a scripted luminance sequence, cycling when exhausted.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    luma_script: Vec<u8>,
    cursor: usize,
    next_id: u64,
    /// Stop after this many frames (None = endless)
    limit: Option<u64>,
    produced: u64,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32, luma_script: Vec<u8>) -> Self {
        debug!(width, height, script_len = luma_script.len(), "synthetic source created");
        Self {
            width,
            height,
            luma_script,
            cursor: 0,
            next_id: 0,
            limit: None,
            produced: 0,
        }
    }

    /// Limit the number of frames produced before the stream ends
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl FrameSource for SyntheticFrameSource {
    fn read(&mut self) -> Result<Option<VideoFrame>, SourceError> {
        if let Some(limit) = self.limit {
            if self.produced >= limit {
                return Ok(None);
            }
        }
        if self.luma_script.is_empty() {
            return Err(SourceError::Capture("empty luminance script".into()));
        }

        let luma = self.luma_script[self.cursor];
        self.cursor = (self.cursor + 1) % self.luma_script.len();

        let id = self.next_id;
        self.next_id += 1;
        self.produced += 1;

        let data = vec![luma; (self.width * self.height * 3) as usize];
        Ok(Some(VideoFrame::new(id, data, self.width, self.height, 0)))
    }
}
