//! Storage Layer
//!
//! Persistence boundary for drowsy episodes, their evidence frames, and the
//! retraining datasets confirmed frames feed into. The pipeline talks to a
//! trait so the backend can be swapped; an in-memory [`Repository`] is the
//! reference implementation. Every call may fail independently; callers
//! log and carry on, persistence here is best-effort.

mod repository;

pub use repository::Repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Record not found")]
    NotFound,
}

/// A drowsy episode bracketed by start/end markers.
///
/// `start_marker`/`end_marker` are frame ids: the oldest evidence frame
/// retained when the alert fired, and the frame that triggered it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub id: i64,
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub start_marker: Option<u64>,
    pub end_marker: Option<u64>,
    /// Human confirmation: true = confirmed drowsy, false = false positive
    pub user_label: Option<bool>,
    pub user_note: Option<String>,
}

/// A persisted evidence frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceFrameRecord {
    pub id: i64,
    pub episode_id: i64,
    pub confidence: f32,
    pub predicted_drowsy: bool,
    pub image_ref: String,
    pub dataset_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Dataset lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetStatus {
    Active,
    Exhausted,
}

/// A retraining dataset accumulating confirmed frames up to a capacity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: i64,
    pub user_id: i64,
    pub capacity: usize,
    pub status: DatasetStatus,
    pub created_at: DateTime<Utc>,
}

/// Episode and dataset persistence operations
pub trait EpisodeStore: Send + Sync {
    /// Create an open episode; returns its id
    fn create_episode(
        &self,
        session_id: Uuid,
        started_at: DateTime<Utc>,
        start_marker: Option<u64>,
        end_marker: Option<u64>,
    ) -> Result<i64, StorageError>;

    /// Close an episode with its end time and the user's verdict
    fn close_episode(
        &self,
        episode_id: i64,
        ended_at: DateTime<Utc>,
        user_label: Option<bool>,
        user_note: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Record a persisted evidence frame; returns its id
    fn insert_evidence_frame(
        &self,
        episode_id: i64,
        confidence: f32,
        predicted_drowsy: bool,
        image_ref: &str,
        dataset_id: Option<i64>,
    ) -> Result<i64, StorageError>;

    /// The user's currently active dataset, if one exists
    fn get_active_dataset(&self, user_id: i64) -> Result<Option<DatasetRecord>, StorageError>;

    /// Create a fresh active dataset; returns its id
    fn create_dataset(&self, user_id: i64, capacity: usize) -> Result<i64, StorageError>;

    /// Mark a dataset as full; it stops accepting frames
    fn mark_dataset_exhausted(&self, dataset_id: i64) -> Result<(), StorageError>;

    /// Number of frames assigned to a dataset
    fn count_dataset_frames(&self, dataset_id: i64) -> Result<usize, StorageError>;
}
