//! Detached evidence persistence

use crate::worker::ClassifiedFrame;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use storage::EpisodeStore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Manifest written next to the evidence images of one episode
#[derive(Debug, Serialize)]
struct EpisodeManifest {
    session_id: Uuid,
    episode_id: Option<i64>,
    start_marker: u64,
    end_marker: u64,
    frame_count: usize,
    images_written: usize,
    created_at: DateTime<Utc>,
}

/// Persists evidence ring snapshots off the hot path.
///
/// Each request runs on its own short-lived thread: episode row, one JPEG
/// per buffered frame, evidence rows, manifest. At most one job runs at a
/// time; a request arriving while one is in flight is dropped, which keeps
/// a burst of alerts from writing the same buffer contents twice. Storage
/// and I/O failures are logged and skipped; the job always completes.
pub struct EvidencePersister {
    store: Arc<dyn EpisodeStore>,
    session_id: Uuid,
    root: PathBuf,
    in_flight: Arc<AtomicBool>,
    last_job: Mutex<Option<JoinHandle<()>>>,
}

impl EvidencePersister {
    pub fn new(store: Arc<dyn EpisodeStore>, session_id: Uuid, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            session_id,
            root: root.into(),
            in_flight: Arc::new(AtomicBool::new(false)),
            last_job: Mutex::new(None),
        }
    }

    /// Relative path an evidence image is written to within an episode.
    /// Deterministic so other components can reference frames by id.
    pub fn image_ref(evidence_dir: &str, end_marker: u64, frame_id: u64) -> String {
        format!("{}/episode_{}/frame_{}.jpg", evidence_dir, end_marker, frame_id)
    }

    /// Request persistence of a ring snapshot. Returns `false` when a job is
    /// already in flight (the request is dropped) or the snapshot is empty.
    pub fn request(&self, entries: Vec<ClassifiedFrame>, start_marker: u64, end_marker: u64) -> bool {
        if entries.is_empty() {
            debug!("empty evidence snapshot, nothing to persist");
            return false;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("evidence persistence already in flight, request dropped");
            return false;
        }

        let store = self.store.clone();
        let session_id = self.session_id;
        let dir = self.root.join(format!("episode_{}", end_marker));
        let in_flight = self.in_flight.clone();

        let handle = std::thread::Builder::new()
            .name("evidence-persister".into())
            .spawn(move || {
                run_job(store, session_id, &dir, entries, start_marker, end_marker);
                in_flight.store(false, Ordering::Release);
            });

        match handle {
            Ok(handle) => {
                let mut last = self.last_job.lock().unwrap_or_else(|e| e.into_inner());
                *last = Some(handle);
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn persister thread");
                self.in_flight.store(false, Ordering::Release);
                false
            }
        }
    }

    /// Whether no persistence job is currently running
    pub fn is_idle(&self) -> bool {
        !self.in_flight.load(Ordering::Acquire)
    }

    /// Best-effort wait for an in-flight job. Returns `false` if the
    /// deadline expired with the job still running (it is left detached).
    pub fn shutdown(&self, deadline: Duration) -> bool {
        let handle = {
            let mut last = self.last_job.lock().unwrap_or_else(|e| e.into_inner());
            last.take()
        };
        let Some(handle) = handle else {
            return true;
        };

        let until = Instant::now() + deadline;
        while !handle.is_finished() {
            if Instant::now() >= until {
                warn!("persister job still running at shutdown, detaching");
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        handle.join().is_ok()
    }
}

fn run_job(
    store: Arc<dyn EpisodeStore>,
    session_id: Uuid,
    dir: &Path,
    entries: Vec<ClassifiedFrame>,
    start_marker: u64,
    end_marker: u64,
) {
    let started_at = Utc::now();

    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!(dir = %dir.display(), error = %e, "failed to create evidence directory");
        return;
    }

    let episode_id = match store.create_episode(
        session_id,
        started_at,
        Some(start_marker),
        Some(end_marker),
    ) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(error = %e, "failed to create episode row, persisting images only");
            None
        }
    };

    let mut images_written = 0usize;
    for entry in &entries {
        let path = dir.join(format!("frame_{}.jpg", entry.frame.id));
        match image::RgbImage::from_raw(
            entry.frame.width,
            entry.frame.height,
            entry.frame.data.clone(),
        ) {
            Some(img) => match img.save(&path) {
                Ok(()) => images_written += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to write evidence image");
                    continue;
                }
            },
            None => {
                warn!(frame = entry.frame.id, "frame buffer does not match its dimensions");
                continue;
            }
        }

        if let Some(id) = episode_id {
            if let Err(e) = store.insert_evidence_frame(
                id,
                entry.confidence,
                entry.is_drowsy(),
                &path.to_string_lossy(),
                None,
            ) {
                warn!(episode_id = id, frame = entry.frame.id, error = %e, "failed to record evidence frame");
            }
        }
    }

    let manifest = EpisodeManifest {
        session_id,
        episode_id,
        start_marker,
        end_marker,
        frame_count: entries.len(),
        images_written,
        created_at: started_at,
    };
    match serde_json::to_string_pretty(&manifest) {
        Ok(json) => {
            if let Err(e) = std::fs::write(dir.join("manifest.json"), json) {
                warn!(error = %e, "failed to write episode manifest");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize episode manifest"),
    }

    info!(
        ?episode_id,
        start_marker,
        end_marker,
        images_written,
        "evidence persisted"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use classifier::PredictedClass;
    use frame_source::VideoFrame;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use storage::{DatasetRecord, Repository, StorageError};

    fn entry(id: u64) -> ClassifiedFrame {
        ClassifiedFrame {
            frame: VideoFrame::new(id, vec![128; 4 * 4 * 3], 4, 4, 0),
            class: PredictedClass::Drowsy,
            confidence: 0.9,
        }
    }

    fn temp_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("evidence_{}_{}", tag, std::process::id()))
    }

    /// Store whose `create_episode` blocks until released, for holding a
    /// persistence job open mid-test.
    struct GatedStore {
        gate: Mutex<mpsc::Receiver<()>>,
        episodes: AtomicUsize,
        inner: Repository,
    }

    impl EpisodeStore for GatedStore {
        fn create_episode(
            &self,
            session_id: Uuid,
            started_at: DateTime<Utc>,
            start_marker: Option<u64>,
            end_marker: Option<u64>,
        ) -> Result<i64, StorageError> {
            self.gate.lock().unwrap().recv().ok();
            self.episodes.fetch_add(1, Ordering::SeqCst);
            self.inner
                .create_episode(session_id, started_at, start_marker, end_marker)
        }

        fn close_episode(
            &self,
            episode_id: i64,
            ended_at: DateTime<Utc>,
            user_label: Option<bool>,
            user_note: Option<&str>,
        ) -> Result<(), StorageError> {
            self.inner.close_episode(episode_id, ended_at, user_label, user_note)
        }

        fn insert_evidence_frame(
            &self,
            episode_id: i64,
            confidence: f32,
            predicted_drowsy: bool,
            image_ref: &str,
            dataset_id: Option<i64>,
        ) -> Result<i64, StorageError> {
            self.inner
                .insert_evidence_frame(episode_id, confidence, predicted_drowsy, image_ref, dataset_id)
        }

        fn get_active_dataset(&self, user_id: i64) -> Result<Option<DatasetRecord>, StorageError> {
            self.inner.get_active_dataset(user_id)
        }

        fn create_dataset(&self, user_id: i64, capacity: usize) -> Result<i64, StorageError> {
            self.inner.create_dataset(user_id, capacity)
        }

        fn mark_dataset_exhausted(&self, dataset_id: i64) -> Result<(), StorageError> {
            self.inner.mark_dataset_exhausted(dataset_id)
        }

        fn count_dataset_frames(&self, dataset_id: i64) -> Result<usize, StorageError> {
            self.inner.count_dataset_frames(dataset_id)
        }
    }

    #[test]
    fn test_persists_snapshot_and_manifest() {
        let repo = Arc::new(Repository::new());
        let root = temp_root("snapshot");
        let persister = EvidencePersister::new(repo.clone(), Uuid::new_v4(), &root);

        assert!(persister.request(vec![entry(10), entry(11), entry(12)], 10, 12));
        assert!(persister.shutdown(Duration::from_secs(5)));

        assert_eq!(repo.episode_count(), 1);
        assert_eq!(repo.evidence_count(), 3);

        let dir = root.join("episode_12");
        assert!(dir.join("frame_10.jpg").exists());
        assert!(dir.join("manifest.json").exists());

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_second_request_dropped_while_in_flight() {
        let (tx, rx) = mpsc::channel();
        let store = Arc::new(GatedStore {
            gate: Mutex::new(rx),
            episodes: AtomicUsize::new(0),
            inner: Repository::new(),
        });
        let root = temp_root("inflight");
        let persister = EvidencePersister::new(store.clone(), Uuid::new_v4(), &root);

        // First request parks inside create_episode
        assert!(persister.request(vec![entry(1)], 1, 1));
        assert!(!persister.is_idle());

        // Second request for the same buffer contents is dropped
        assert!(!persister.request(vec![entry(1)], 1, 1));

        tx.send(()).unwrap();
        assert!(persister.shutdown(Duration::from_secs(5)));
        assert!(persister.is_idle());
        assert_eq!(store.episodes.load(Ordering::SeqCst), 1);

        // Once idle, a new request is accepted again
        tx.send(()).unwrap();
        assert!(persister.request(vec![entry(2)], 2, 2));
        persister.shutdown(Duration::from_secs(5));
        assert_eq!(store.episodes.load(Ordering::SeqCst), 2);

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_empty_snapshot_is_rejected() {
        let repo = Arc::new(Repository::new());
        let persister = EvidencePersister::new(repo, Uuid::new_v4(), temp_root("empty"));
        assert!(!persister.request(Vec::new(), 0, 0));
        assert!(persister.is_idle());
    }

    #[test]
    fn test_storage_failure_still_writes_images() {
        struct FailingStore;
        impl EpisodeStore for FailingStore {
            fn create_episode(
                &self,
                _: Uuid,
                _: DateTime<Utc>,
                _: Option<u64>,
                _: Option<u64>,
            ) -> Result<i64, StorageError> {
                Err(StorageError::Backend("down".into()))
            }
            fn close_episode(
                &self,
                _: i64,
                _: DateTime<Utc>,
                _: Option<bool>,
                _: Option<&str>,
            ) -> Result<(), StorageError> {
                Err(StorageError::Backend("down".into()))
            }
            fn insert_evidence_frame(
                &self,
                _: i64,
                _: f32,
                _: bool,
                _: &str,
                _: Option<i64>,
            ) -> Result<i64, StorageError> {
                Err(StorageError::Backend("down".into()))
            }
            fn get_active_dataset(&self, _: i64) -> Result<Option<DatasetRecord>, StorageError> {
                Err(StorageError::Backend("down".into()))
            }
            fn create_dataset(&self, _: i64, _: usize) -> Result<i64, StorageError> {
                Err(StorageError::Backend("down".into()))
            }
            fn mark_dataset_exhausted(&self, _: i64) -> Result<(), StorageError> {
                Err(StorageError::Backend("down".into()))
            }
            fn count_dataset_frames(&self, _: i64) -> Result<usize, StorageError> {
                Err(StorageError::Backend("down".into()))
            }
        }

        let root = temp_root("storefail");
        let persister = EvidencePersister::new(Arc::new(FailingStore), Uuid::new_v4(), &root);

        assert!(persister.request(vec![entry(5)], 5, 5));
        assert!(persister.shutdown(Duration::from_secs(5)));

        // Evidence images and manifest survive a dead store
        assert!(root.join("episode_5").join("frame_5.jpg").exists());
        assert!(root.join("episode_5").join("manifest.json").exists());

        std::fs::remove_dir_all(&root).ok();
    }
}
