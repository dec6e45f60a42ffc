//! Violation manager implementation

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::EpisodeStore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Violation lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationConfig {
    /// Minimum gap between the end of one episode and the start of the next
    pub episode_cooldown_secs: u64,
    /// Confidence floor for durably storing a confirmed frame
    pub persist_confidence: f32,
    /// Frame capacity of a retraining dataset before rotation
    pub dataset_capacity: usize,
}

impl Default for ViolationConfig {
    fn default() -> Self {
        Self {
            episode_cooldown_secs: 5,
            persist_confidence: 0.8,
            dataset_capacity: 5000,
        }
    }
}

/// A frame buffered while its episode awaits confirmation
#[derive(Debug, Clone)]
struct BufferedFrame {
    image_ref: String,
    confidence: f32,
    predicted_drowsy: bool,
}

struct OpenEpisode {
    id: i64,
}

/// Tracks open/closed drowsy episodes and decides which buffered frames are
/// durably stored.
///
/// At most one episode is open at a time; a new one cannot start within the
/// inter-episode cooldown of the previous end. Buffered frames are held in
/// memory until the human verdict arrives: confirmed episodes persist the
/// frames above the confidence floor into the active dataset (rotating it
/// when full), unconfirmed episodes discard everything.
pub struct ViolationManager {
    session_id: Uuid,
    user_id: i64,
    store: Arc<dyn EpisodeStore>,
    config: ViolationConfig,
    open: Option<OpenEpisode>,
    pending: Vec<BufferedFrame>,
    last_ended: Option<DateTime<Utc>>,
    dataset_id: Option<i64>,
}

impl ViolationManager {
    pub fn new(
        session_id: Uuid,
        user_id: i64,
        store: Arc<dyn EpisodeStore>,
        config: ViolationConfig,
    ) -> Self {
        info!(%session_id, user_id, "Creating violation manager with config: {:?}", config);
        let mut manager = Self {
            session_id,
            user_id,
            store,
            config,
            open: None,
            pending: Vec::new(),
            last_ended: None,
            dataset_id: None,
        };
        manager.ensure_dataset();
        manager
    }

    /// Replace the lifecycle configuration
    pub fn set_config(&mut self, config: ViolationConfig) {
        self.config = config;
    }

    /// Resolve the active dataset, creating one if missing. Failures are
    /// logged; resolution is retried on the next confirmation.
    fn ensure_dataset(&mut self) -> Option<i64> {
        if self.dataset_id.is_some() {
            return self.dataset_id;
        }
        match self.store.get_active_dataset(self.user_id) {
            Ok(Some(dataset)) => self.dataset_id = Some(dataset.id),
            Ok(None) => match self.store.create_dataset(self.user_id, self.config.dataset_capacity) {
                Ok(id) => self.dataset_id = Some(id),
                Err(e) => warn!(error = %e, "failed to create dataset"),
            },
            Err(e) => warn!(error = %e, "failed to look up active dataset"),
        }
        self.dataset_id
    }

    /// Open a new episode, unless one is already open or the inter-episode
    /// cooldown has not elapsed. Returns the episode id.
    pub fn start_violation(&mut self) -> Option<i64> {
        self.start_violation_at(Utc::now())
    }

    pub fn start_violation_at(&mut self, now: DateTime<Utc>) -> Option<i64> {
        if self.open.is_some() {
            debug!("episode already open, start ignored");
            return None;
        }
        if let Some(ended) = self.last_ended {
            let cooldown = Duration::seconds(self.config.episode_cooldown_secs as i64);
            if now - ended < cooldown {
                debug!("within episode cooldown, start ignored");
                return None;
            }
        }

        match self
            .store
            .create_episode(self.session_id, now, None, None)
        {
            Ok(id) => {
                info!(episode_id = id, "violation episode opened");
                self.open = Some(OpenEpisode { id });
                self.pending.clear();
                Some(id)
            }
            Err(e) => {
                warn!(error = %e, "failed to create episode");
                None
            }
        }
    }

    /// Buffer a frame pending confirmation. No-op when no episode is open.
    /// Returns the buffered count.
    pub fn buffer_frame(
        &mut self,
        image_ref: &str,
        confidence: f32,
        predicted_drowsy: bool,
    ) -> Option<usize> {
        self.open.as_ref()?;
        self.pending.push(BufferedFrame {
            image_ref: image_ref.to_string(),
            confidence,
            predicted_drowsy,
        });
        Some(self.pending.len())
    }

    /// Close the open episode with the user's verdict.
    ///
    /// `user_label == Some(true)` persists buffered frames at or above the
    /// confidence floor into the active dataset, rotating the dataset when it
    /// reaches capacity. Anything else discards the buffer. Store failures
    /// are logged; the in-memory episode always closes.
    pub fn end_violation(&mut self, user_label: Option<bool>, user_note: Option<&str>) {
        self.end_violation_at(Utc::now(), user_label, user_note)
    }

    pub fn end_violation_at(
        &mut self,
        now: DateTime<Utc>,
        user_label: Option<bool>,
        user_note: Option<&str>,
    ) {
        let Some(episode) = self.open.take() else {
            return;
        };

        if let Err(e) = self
            .store
            .close_episode(episode.id, now, user_label, user_note)
        {
            warn!(episode_id = episode.id, error = %e, "failed to close episode");
        }

        if user_label == Some(true) {
            self.persist_confirmed(episode.id);
        } else {
            debug!(
                episode_id = episode.id,
                discarded = self.pending.len(),
                "episode not confirmed, buffer discarded"
            );
        }

        self.last_ended = Some(now);
        self.pending.clear();
    }

    fn persist_confirmed(&mut self, episode_id: i64) {
        let dataset_id = self.ensure_dataset();
        let mut stored = 0usize;

        for frame in &self.pending {
            if frame.confidence < self.config.persist_confidence {
                continue;
            }
            match self.store.insert_evidence_frame(
                episode_id,
                frame.confidence,
                frame.predicted_drowsy,
                &frame.image_ref,
                dataset_id,
            ) {
                Ok(_) => stored += 1,
                Err(e) => warn!(episode_id, error = %e, "failed to store evidence frame"),
            }
        }
        info!(episode_id, stored, buffered = self.pending.len(), "confirmed episode persisted");

        // Rotate the dataset once it reaches capacity
        if let Some(ds) = dataset_id {
            match self.store.count_dataset_frames(ds) {
                Ok(count) if count >= self.config.dataset_capacity => {
                    if let Err(e) = self.store.mark_dataset_exhausted(ds) {
                        warn!(dataset_id = ds, error = %e, "failed to mark dataset exhausted");
                    }
                    self.dataset_id = None;
                    match self
                        .store
                        .create_dataset(self.user_id, self.config.dataset_capacity)
                    {
                        Ok(id) => self.dataset_id = Some(id),
                        Err(e) => warn!(error = %e, "failed to create replacement dataset"),
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(dataset_id = ds, error = %e, "failed to count dataset frames"),
            }
        }
    }

    /// Whether an episode is currently open
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Id of the open episode, if any
    pub fn open_episode_id(&self) -> Option<i64> {
        self.open.as_ref().map(|e| e.id)
    }

    /// Frames currently buffered pending confirmation
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::Repository;

    fn manager_with(config: ViolationConfig) -> (ViolationManager, Arc<Repository>) {
        let repo = Arc::new(Repository::new());
        let manager = ViolationManager::new(Uuid::new_v4(), 1, repo.clone(), config);
        (manager, repo)
    }

    #[test]
    fn test_confirmed_episode_persists_filtered_frames() {
        let (mut manager, repo) = manager_with(ViolationConfig::default());

        let episode = manager.start_violation().unwrap();
        manager.buffer_frame("frame_1.jpg", 0.9, true);
        manager.buffer_frame("frame_2.jpg", 0.6, true);
        manager.buffer_frame("frame_3.jpg", 0.85, false);

        manager.end_violation(Some(true), Some("definitely drowsy"));

        let frames = repo.evidence_for_episode(episode);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.confidence >= 0.8));
        assert!(!manager.is_open());
    }

    #[test]
    fn test_unconfirmed_episode_persists_nothing() {
        let (mut manager, repo) = manager_with(ViolationConfig::default());

        let episode = manager.start_violation().unwrap();
        manager.buffer_frame("frame_1.jpg", 0.95, true);
        manager.buffer_frame("frame_2.jpg", 0.99, true);

        manager.end_violation(Some(false), None);

        assert!(repo.evidence_for_episode(episode).is_empty());
        assert_eq!(manager.pending_len(), 0);
    }

    #[test]
    fn test_unlabeled_close_also_discards() {
        let (mut manager, repo) = manager_with(ViolationConfig::default());

        let episode = manager.start_violation().unwrap();
        manager.buffer_frame("frame_1.jpg", 0.9, true);
        manager.end_violation(None, None);

        assert!(repo.evidence_for_episode(episode).is_empty());
    }

    #[test]
    fn test_cooldown_blocks_new_episode() {
        let (mut manager, _repo) = manager_with(ViolationConfig::default());
        let t0 = Utc::now();

        assert!(manager.start_violation_at(t0).is_some());
        manager.end_violation_at(t0 + Duration::seconds(2), Some(false), None);

        // 3 seconds after the end: still inside the 5 s cooldown
        assert!(manager
            .start_violation_at(t0 + Duration::seconds(5))
            .is_none());
        // 6 seconds after the end: allowed again
        assert!(manager
            .start_violation_at(t0 + Duration::seconds(8))
            .is_some());
    }

    #[test]
    fn test_one_episode_open_at_a_time() {
        let (mut manager, _repo) = manager_with(ViolationConfig::default());

        assert!(manager.start_violation().is_some());
        assert!(manager.start_violation().is_none());
    }

    #[test]
    fn test_buffer_frame_without_episode_is_noop() {
        let (mut manager, _repo) = manager_with(ViolationConfig::default());
        assert!(manager.buffer_frame("frame.jpg", 0.9, true).is_none());
    }

    #[test]
    fn test_dataset_rotates_at_capacity() {
        let config = ViolationConfig {
            episode_cooldown_secs: 0,
            dataset_capacity: 2,
            ..Default::default()
        };
        let (mut manager, repo) = manager_with(config);
        let first_dataset = manager.dataset_id.unwrap();

        manager.start_violation().unwrap();
        manager.buffer_frame("a.jpg", 0.9, true);
        manager.buffer_frame("b.jpg", 0.9, true);
        manager.end_violation(Some(true), None);

        // Capacity reached: the first dataset is retired and a fresh one opened
        let active = repo.get_active_dataset(1).unwrap().unwrap();
        assert_ne!(active.id, first_dataset);
        assert_eq!(repo.count_dataset_frames(first_dataset).unwrap(), 2);
    }
}
