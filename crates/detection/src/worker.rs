//! Inference worker thread

use classifier::{BatchClassifier, PredictedClass};
use frame_buffer::{BoundedQueue, OverwriteRing};
use frame_source::VideoFrame;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A frame together with its classification, produced exactly once per
/// accepted frame.
#[derive(Debug, Clone)]
pub struct ClassifiedFrame {
    pub frame: VideoFrame,
    pub class: PredictedClass,
    pub confidence: f32,
}

impl ClassifiedFrame {
    pub fn is_drowsy(&self) -> bool {
        self.class.is_drowsy()
    }
}

/// Spawn the dedicated inference thread.
///
/// The loop drains up to `batch_size` frames without waiting for a full
/// batch (latency over batching efficiency), classifies them, and pushes one
/// result per frame into the result ring and the evidence ring. An empty
/// queue earns a bounded sleep rather than a busy spin. Classifier failures
/// discard the batch; frames are perishable, there is no retry.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_inference_worker(
    classifier: Box<dyn BatchClassifier>,
    ingest: Arc<BoundedQueue<VideoFrame>>,
    results: Arc<OverwriteRing<ClassifiedFrame>>,
    evidence: Arc<OverwriteRing<ClassifiedFrame>>,
    running: Arc<AtomicBool>,
    failed_batches: Arc<AtomicU64>,
    batch_size: usize,
    idle: Duration,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("inference-worker".into())
        .spawn(move || {
            info!(batch_size, "inference worker started");

            while running.load(Ordering::Relaxed) {
                let batch = ingest.drain(batch_size);
                if batch.is_empty() {
                    std::thread::sleep(idle);
                    continue;
                }

                let predictions = match classifier.classify_batch(&batch) {
                    Ok(p) => p,
                    Err(e) => {
                        failed_batches.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, dropped = batch.len(), "classifier batch failed, frames discarded");
                        continue;
                    }
                };
                if predictions.len() != batch.len() {
                    failed_batches.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        expected = batch.len(),
                        got = predictions.len(),
                        "classifier returned wrong result count, batch discarded"
                    );
                    continue;
                }

                debug!(frames = batch.len(), "batch classified");
                for (frame, prediction) in batch.into_iter().zip(predictions) {
                    let classified = ClassifiedFrame {
                        frame,
                        class: prediction.class,
                        confidence: prediction.confidence,
                    };
                    evidence.push(classified.clone());
                    results.push(classified);
                }
            }

            info!("inference worker stopped");
        })
        .expect("failed to spawn inference worker thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use classifier::{Classification, ScriptedClassifier};
    use std::time::Instant;

    fn frame(id: u64) -> VideoFrame {
        VideoFrame::new(id, vec![0; 2 * 2 * 3], 2, 2, 0)
    }

    fn wait_until(deadline_ms: u64, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    struct Harness {
        ingest: Arc<BoundedQueue<VideoFrame>>,
        results: Arc<OverwriteRing<ClassifiedFrame>>,
        evidence: Arc<OverwriteRing<ClassifiedFrame>>,
        running: Arc<AtomicBool>,
        failed: Arc<AtomicU64>,
        handle: JoinHandle<()>,
    }

    fn spawn(classifier: impl BatchClassifier + 'static) -> Harness {
        let ingest = Arc::new(BoundedQueue::new(30));
        let results = Arc::new(OverwriteRing::new(30));
        let evidence = Arc::new(OverwriteRing::new(90));
        let running = Arc::new(AtomicBool::new(true));
        let failed = Arc::new(AtomicU64::new(0));

        let handle = spawn_inference_worker(
            Box::new(classifier),
            ingest.clone(),
            results.clone(),
            evidence.clone(),
            running.clone(),
            failed.clone(),
            4,
            Duration::from_millis(1),
        );
        Harness {
            ingest,
            results,
            evidence,
            running,
            failed,
            handle,
        }
    }

    #[test]
    fn test_results_preserve_frame_identity() {
        let script = ScriptedClassifier::new(vec![
            Classification::new(PredictedClass::Drowsy, 0.9),
        ]);
        let harness = spawn(script);

        for id in 0..6 {
            assert!(harness.ingest.offer(frame(id)));
        }
        assert!(wait_until(2000, || harness.results.len() == 6));

        let classified = harness.results.drain_all();
        let ids: Vec<u64> = classified.iter().map(|c| c.frame.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
        assert!(classified.iter().all(|c| c.is_drowsy()));

        // Evidence ring mirrors every result
        assert_eq!(harness.evidence.len(), 6);

        harness.running.store(false, Ordering::Relaxed);
        harness.handle.join().unwrap();
    }

    #[test]
    fn test_classifier_failure_discards_batch_and_continues() {
        let harness = spawn(ScriptedClassifier::failing());

        harness.ingest.offer(frame(1));
        assert!(wait_until(2000, || harness.failed.load(Ordering::Relaxed) >= 1));
        assert!(harness.results.is_empty());

        // The worker survives the failure and keeps draining
        harness.ingest.offer(frame(2));
        assert!(wait_until(2000, || harness.failed.load(Ordering::Relaxed) >= 2));

        harness.running.store(false, Ordering::Relaxed);
        harness.handle.join().unwrap();
    }

    #[test]
    fn test_worker_stops_on_running_flag() {
        let script = ScriptedClassifier::new(vec![
            Classification::new(PredictedClass::Alert, 0.6),
        ]);
        let harness = spawn(script);

        harness.running.store(false, Ordering::Relaxed);
        assert!(wait_until(2000, || harness.handle.is_finished()));
    }
}
