//! In-memory repository implementation

use crate::{
    DatasetRecord, DatasetStatus, EpisodeRecord, EpisodeStore, EvidenceFrameRecord, StorageError,
};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// In-memory implementation of [`EpisodeStore`].
///
/// Serves tests and single-process deployments; a SQLite-backed
/// implementation slots in behind the same trait.
pub struct Repository {
    episodes: Mutex<Vec<EpisodeRecord>>,
    evidence: Mutex<Vec<EvidenceFrameRecord>>,
    datasets: Mutex<Vec<DatasetRecord>>,
    next_id: Mutex<i64>,
}

impl Repository {
    pub fn new() -> Self {
        info!("Creating in-memory episode repository");
        Self {
            episodes: Mutex::new(Vec::new()),
            evidence: Mutex::new(Vec::new()),
            datasets: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }

    fn allocate_id(&self) -> Result<i64, StorageError> {
        let mut id = self
            .next_id
            .lock()
            .map_err(|e| StorageError::Backend(format!("Lock error: {}", e)))?;
        let allocated = *id;
        *id += 1;
        Ok(allocated)
    }

    /// Episodes awaiting a human verdict
    pub fn unlabeled_episodes(&self) -> Vec<EpisodeRecord> {
        self.episodes
            .lock()
            .map(|e| {
                e.iter()
                    .filter(|ep| ep.user_label.is_none())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All evidence frames recorded for an episode
    pub fn evidence_for_episode(&self, episode_id: i64) -> Vec<EvidenceFrameRecord> {
        self.evidence
            .lock()
            .map(|f| {
                f.iter()
                    .filter(|r| r.episode_id == episode_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total episode count
    pub fn episode_count(&self) -> usize {
        self.episodes.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Total evidence frame count
    pub fn evidence_count(&self) -> usize {
        self.evidence.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        if let Ok(mut e) = self.episodes.lock() {
            e.clear();
        }
        if let Ok(mut f) = self.evidence.lock() {
            f.clear();
        }
        if let Ok(mut d) = self.datasets.lock() {
            d.clear();
        }
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

impl EpisodeStore for Repository {
    fn create_episode(
        &self,
        session_id: Uuid,
        started_at: DateTime<Utc>,
        start_marker: Option<u64>,
        end_marker: Option<u64>,
    ) -> Result<i64, StorageError> {
        let id = self.allocate_id()?;
        let mut episodes = self
            .episodes
            .lock()
            .map_err(|e| StorageError::Backend(format!("Lock error: {}", e)))?;

        episodes.push(EpisodeRecord {
            id,
            session_id,
            started_at,
            ended_at: None,
            start_marker,
            end_marker,
            user_label: None,
            user_note: None,
        });
        debug!(episode_id = id, "episode created");
        Ok(id)
    }

    fn close_episode(
        &self,
        episode_id: i64,
        ended_at: DateTime<Utc>,
        user_label: Option<bool>,
        user_note: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut episodes = self
            .episodes
            .lock()
            .map_err(|e| StorageError::Backend(format!("Lock error: {}", e)))?;

        let episode = episodes
            .iter_mut()
            .find(|ep| ep.id == episode_id)
            .ok_or(StorageError::NotFound)?;

        episode.ended_at = Some(ended_at);
        episode.user_label = user_label;
        episode.user_note = user_note.map(str::to_string);
        debug!(episode_id, ?user_label, "episode closed");
        Ok(())
    }

    fn insert_evidence_frame(
        &self,
        episode_id: i64,
        confidence: f32,
        predicted_drowsy: bool,
        image_ref: &str,
        dataset_id: Option<i64>,
    ) -> Result<i64, StorageError> {
        let id = self.allocate_id()?;
        let mut evidence = self
            .evidence
            .lock()
            .map_err(|e| StorageError::Backend(format!("Lock error: {}", e)))?;

        evidence.push(EvidenceFrameRecord {
            id,
            episode_id,
            confidence,
            predicted_drowsy,
            image_ref: image_ref.to_string(),
            dataset_id,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    fn get_active_dataset(&self, user_id: i64) -> Result<Option<DatasetRecord>, StorageError> {
        let datasets = self
            .datasets
            .lock()
            .map_err(|e| StorageError::Backend(format!("Lock error: {}", e)))?;

        Ok(datasets
            .iter()
            .find(|d| d.user_id == user_id && d.status == DatasetStatus::Active)
            .cloned())
    }

    fn create_dataset(&self, user_id: i64, capacity: usize) -> Result<i64, StorageError> {
        let id = self.allocate_id()?;
        let mut datasets = self
            .datasets
            .lock()
            .map_err(|e| StorageError::Backend(format!("Lock error: {}", e)))?;

        datasets.push(DatasetRecord {
            id,
            user_id,
            capacity,
            status: DatasetStatus::Active,
            created_at: Utc::now(),
        });
        info!(dataset_id = id, user_id, capacity, "dataset created");
        Ok(id)
    }

    fn mark_dataset_exhausted(&self, dataset_id: i64) -> Result<(), StorageError> {
        let mut datasets = self
            .datasets
            .lock()
            .map_err(|e| StorageError::Backend(format!("Lock error: {}", e)))?;

        let dataset = datasets
            .iter_mut()
            .find(|d| d.id == dataset_id)
            .ok_or(StorageError::NotFound)?;

        dataset.status = DatasetStatus::Exhausted;
        info!(dataset_id, "dataset exhausted");
        Ok(())
    }

    fn count_dataset_frames(&self, dataset_id: i64) -> Result<usize, StorageError> {
        let evidence = self
            .evidence
            .lock()
            .map_err(|e| StorageError::Backend(format!("Lock error: {}", e)))?;

        Ok(evidence
            .iter()
            .filter(|f| f.dataset_id == Some(dataset_id))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_create_and_close() {
        let repo = Repository::new();
        let session = Uuid::new_v4();

        let id = repo
            .create_episode(session, Utc::now(), Some(10), Some(42))
            .unwrap();
        assert_eq!(repo.unlabeled_episodes().len(), 1);

        repo.close_episode(id, Utc::now(), Some(true), Some("confirmed"))
            .unwrap();
        assert!(repo.unlabeled_episodes().is_empty());
    }

    #[test]
    fn test_close_unknown_episode_is_not_found() {
        let repo = Repository::new();
        let err = repo.close_episode(99, Utc::now(), None, None).unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[test]
    fn test_evidence_frames_by_episode() {
        let repo = Repository::new();
        let ep = repo
            .create_episode(Uuid::new_v4(), Utc::now(), None, None)
            .unwrap();

        repo.insert_evidence_frame(ep, 0.9, true, "a.jpg", None).unwrap();
        repo.insert_evidence_frame(ep, 0.85, true, "b.jpg", None).unwrap();

        let frames = repo.evidence_for_episode(ep);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].image_ref, "a.jpg");
    }

    #[test]
    fn test_active_dataset_lifecycle() {
        let repo = Repository::new();
        assert!(repo.get_active_dataset(7).unwrap().is_none());

        let ds = repo.create_dataset(7, 100).unwrap();
        assert_eq!(repo.get_active_dataset(7).unwrap().unwrap().id, ds);

        repo.mark_dataset_exhausted(ds).unwrap();
        assert!(repo.get_active_dataset(7).unwrap().is_none());
    }

    #[test]
    fn test_dataset_frame_count() {
        let repo = Repository::new();
        let ep = repo
            .create_episode(Uuid::new_v4(), Utc::now(), None, None)
            .unwrap();
        let ds = repo.create_dataset(1, 10).unwrap();

        repo.insert_evidence_frame(ep, 0.9, true, "a.jpg", Some(ds)).unwrap();
        repo.insert_evidence_frame(ep, 0.8, true, "b.jpg", None).unwrap();

        assert_eq!(repo.count_dataset_frames(ds).unwrap(), 1);
    }
}
