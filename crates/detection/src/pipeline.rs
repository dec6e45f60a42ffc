//! Drowsiness pipeline facade

use crate::config::DetectorConfig;
use crate::overlay;
use crate::persister::EvidencePersister;
use crate::state::{AlertPhase, AlertStateMachine};
use crate::window::RollingWindow;
use crate::worker::{spawn_inference_worker, ClassifiedFrame};
use crate::DetectionError;
use classifier::{BatchClassifier, PredictedClass};
use frame_buffer::{BoundedQueue, OverwriteRing};
use frame_source::VideoFrame;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use storage::EpisodeStore;
use tracing::{info, warn};
use uuid::Uuid;
use violation::{ViolationConfig, ViolationManager};

/// Invoked on the caller's thread when an alert fires:
/// `(triggering_frame, drowsy_ratio, avg_confidence)`
pub type AlertCallback = Box<dyn FnMut(&VideoFrame, f32, f32) + Send>;

/// Snapshot of the monitoring state returned with every processed frame
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    /// Most recent classification, `None` until the first result lands
    pub current_class: Option<PredictedClass>,
    pub current_confidence: f32,
    /// Drowsy fraction of the rolling window (0.0 while evidence is
    /// insufficient)
    pub drowsy_ratio: f32,
    /// UI-facing alert flag, held for the display duration after a fire
    pub alert_active: bool,
    /// Progress of the suspect timer toward firing, in [0, 1]
    pub alert_progress: f32,
}

/// Observability counters aggregated across the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub frames_accepted: u64,
    pub frames_dropped: u64,
    pub frames_classified: u64,
    pub results_evicted: u64,
    pub evidence_evicted: u64,
    pub failed_batches: u64,
}

/// The real-time drowsiness detection pipeline.
///
/// Owns the ingestion queue, the inference worker, the rolling window and
/// alert state machine, the evidence ring, and the episode lifecycle. The
/// caller constructs it, calls [`start`](Self::start) once, then drives
/// [`process_frame`](Self::process_frame) once per displayed frame. That
/// path is synchronous and fast: it hands the frame to the worker, folds
/// any finished results into the window, and returns. All I/O happens on
/// other threads.
pub struct DrowsinessPipeline {
    config: DetectorConfig,
    classifier: Option<Box<dyn BatchClassifier>>,

    ingest: Arc<BoundedQueue<VideoFrame>>,
    results: Arc<OverwriteRing<ClassifiedFrame>>,
    evidence: Arc<OverwriteRing<ClassifiedFrame>>,

    window: RollingWindow,
    machine: AlertStateMachine,
    current: Option<(PredictedClass, f32)>,

    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    failed_batches: Arc<AtomicU64>,

    persister: EvidencePersister,
    violations: ViolationManager,
    open_episode_marker: Option<u64>,

    alert_display: Arc<AtomicBool>,
    display_epoch: Arc<AtomicU64>,
    on_alert: Option<AlertCallback>,

    next_frame_id: u64,
}

impl DrowsinessPipeline {
    pub fn new(
        config: DetectorConfig,
        classifier: Box<dyn BatchClassifier>,
        store: Arc<dyn EpisodeStore>,
        session_id: Uuid,
        user_id: i64,
    ) -> Self {
        let window = RollingWindow::new(config.window_capacity(), config.min_samples);
        let machine = AlertStateMachine::new(&config);
        let persister = EvidencePersister::new(store.clone(), session_id, config.evidence_dir.clone());
        let violations =
            ViolationManager::new(session_id, user_id, store, ViolationConfig::default());

        Self {
            ingest: Arc::new(BoundedQueue::new(config.ingest_capacity)),
            results: Arc::new(OverwriteRing::new(config.result_capacity)),
            evidence: Arc::new(OverwriteRing::new(config.evidence_capacity)),
            window,
            machine,
            current: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            failed_batches: Arc::new(AtomicU64::new(0)),
            persister,
            violations,
            open_episode_marker: None,
            alert_display: Arc::new(AtomicBool::new(false)),
            display_epoch: Arc::new(AtomicU64::new(0)),
            on_alert: None,
            next_frame_id: 0,
            classifier: Some(classifier),
            config,
        }
    }

    /// Replace the episode lifecycle configuration (before `start`)
    pub fn with_violation_config(mut self, config: ViolationConfig) -> Self {
        self.violations.set_config(config);
        self
    }

    /// Register the alert callback
    pub fn on_alert(mut self, callback: AlertCallback) -> Self {
        self.on_alert = Some(callback);
        self
    }

    /// Spawn the inference worker. A pipeline starts once.
    pub fn start(&mut self) -> Result<(), DetectionError> {
        let classifier = self.classifier.take().ok_or(DetectionError::AlreadyStarted)?;
        self.running.store(true, Ordering::Release);
        self.worker = Some(spawn_inference_worker(
            classifier,
            self.ingest.clone(),
            self.results.clone(),
            self.evidence.clone(),
            self.running.clone(),
            self.failed_batches.clone(),
            self.config.batch_size,
            self.config.worker_idle(),
        ));
        info!("pipeline started");
        Ok(())
    }

    /// Process one captured frame: enqueue a copy for inference, fold any
    /// finished classifications into the window and state machine, and
    /// return the annotated frame with the current status.
    pub fn process_frame(&mut self, frame: &VideoFrame) -> (VideoFrame, PipelineStatus) {
        let now = Instant::now();

        let id = self.next_frame_id;
        self.next_frame_id += 1;
        let mut queued = frame.clone();
        queued.id = id;
        self.ingest.offer(queued);

        for classified in self.results.drain_all() {
            self.apply_result(classified, now);
        }

        let status = self.status(now);
        let annotated = overlay::draw_status_overlay(frame, &status);
        (annotated, status)
    }

    fn apply_result(&mut self, classified: ClassifiedFrame, now: Instant) {
        self.current = Some((classified.class, classified.confidence));
        self.window.push(classified.is_drowsy(), classified.confidence);

        // Frames observed while an episode awaits confirmation are buffered
        // for the lifecycle manager under their deterministic evidence ref
        if let Some(marker) = self.open_episode_marker {
            let image_ref = EvidencePersister::image_ref(
                &self.config.evidence_dir,
                marker,
                classified.frame.id,
            );
            self.violations
                .buffer_frame(&image_ref, classified.confidence, classified.is_drowsy());
        }

        let Some(ratio) = self.window.drowsy_ratio() else {
            // Insufficient evidence: defined no-decision state
            return;
        };
        if self.machine.observe(ratio, now) {
            let avg = self.window.avg_confidence().unwrap_or(0.0);
            self.fire_alert(&classified, ratio, avg);
        }
    }

    fn fire_alert(&mut self, classified: &ClassifiedFrame, ratio: f32, avg_confidence: f32) {
        info!(
            frame = classified.frame.id,
            ratio, avg_confidence, "drowsiness alert fired"
        );

        self.raise_display_flag();

        let snapshot = self.evidence.snapshot();
        let start_marker = snapshot
            .first()
            .map(|c| c.frame.id)
            .unwrap_or(classified.frame.id);
        let end_marker = classified.frame.id;
        self.persister.request(snapshot, start_marker, end_marker);

        if self.violations.start_violation().is_some() {
            self.open_episode_marker = Some(end_marker);
        }

        if let Some(callback) = self.on_alert.as_mut() {
            callback(&classified.frame, ratio, avg_confidence);
        }
    }

    /// Raise the UI-facing flag and schedule its one-shot reset, so the
    /// firing path never sleeps. A newer fire supersedes the pending reset.
    fn raise_display_flag(&self) {
        let epoch = self.display_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.alert_display.store(true, Ordering::Release);

        let flag = self.alert_display.clone();
        let epochs = self.display_epoch.clone();
        let hold = self.config.display_hold();
        let spawned = std::thread::Builder::new()
            .name("alert-display-reset".into())
            .spawn(move || {
                std::thread::sleep(hold);
                if epochs.load(Ordering::Acquire) == epoch {
                    flag.store(false, Ordering::Release);
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to schedule display reset");
            self.alert_display.store(false, Ordering::Release);
        }
    }

    fn status(&self, now: Instant) -> PipelineStatus {
        let (current_class, current_confidence) = match self.current {
            Some((class, confidence)) => (Some(class), confidence),
            None => (None, 0.0),
        };
        PipelineStatus {
            current_class,
            current_confidence,
            drowsy_ratio: self.window.drowsy_ratio().unwrap_or(0.0),
            alert_active: self.alert_display.load(Ordering::Acquire),
            alert_progress: self.machine.progress(now),
        }
    }

    /// Record the human verdict for the open episode (if any)
    pub fn confirm_violation(&mut self, user_label: Option<bool>, note: Option<&str>) {
        self.violations.end_violation(user_label, note);
        self.open_episode_marker = None;
    }

    pub fn phase(&self) -> AlertPhase {
        self.machine.phase()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            frames_accepted: self.ingest.accepted(),
            frames_dropped: self.ingest.rejected(),
            frames_classified: self.results.total_written(),
            results_evicted: self.results.evicted(),
            evidence_evicted: self.evidence.evicted(),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker and wait briefly for in-flight work. Best-effort:
    /// threads that miss the deadline are detached, not killed.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);

        if let Some(handle) = self.worker.take() {
            let deadline = Instant::now() + Duration::from_secs(2);
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                handle.join().ok();
            } else {
                warn!("inference worker did not stop in time, detaching");
            }
        }
        self.persister.shutdown(Duration::from_secs(2));
        info!("pipeline stopped");
    }
}

impl Drop for DrowsinessPipeline {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}
