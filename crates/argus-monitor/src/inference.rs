//! Per-camera inference worker.
//!
//! Polls the latest-frame slot at the target FPS and processes every
//! N-th frame: detect, score quality, identify against the embedding
//! store, feed the tracker, and forward finalized observations to the
//! presence machine. The tracker table is owned by this thread alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use argus_match::{EmbeddingStore, FaceTracker, TrackDetection, TrackerConfig};
use argus_models::CameraId;
use argus_vision::{FaceEngine, Frame, QualityScorer};
use chrono::Utc;
use tracing::{debug, info};

use crate::frames::FrameSlot;
use crate::presence::PresenceBoard;

/// Everything one camera's inference thread needs.
pub struct InferenceContext {
    pub camera_id: CameraId,
    pub engine: Arc<FaceEngine>,
    pub store: Arc<EmbeddingStore>,
    pub scorer: QualityScorer,
    pub tracker_config: TrackerConfig,
    pub presence: Arc<PresenceBoard>,
    /// Minimum cosine similarity to accept an identity candidate.
    pub similarity_threshold: f64,
    pub frame_interval: Duration,
    /// Process every N-th polled frame.
    pub stride: u32,
}

/// Spawn the inference thread for one camera.
pub fn spawn_inference(
    ctx: InferenceContext,
    slot: FrameSlot,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("inference-{}", ctx.camera_id))
        .spawn(move || run_inference(ctx, slot, stop))
        .expect("failed to spawn inference thread")
}

fn run_inference(ctx: InferenceContext, slot: FrameSlot, stop: Arc<AtomicBool>) {
    info!(camera = ctx.camera_id, "inference worker started");
    let mut tracker = FaceTracker::new(ctx.tracker_config.clone());
    let stride = ctx.stride.max(1);
    let mut frame_idx: u64 = 0;

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(ctx.frame_interval);
        let Some(frame) = slot.latest() else {
            continue;
        };
        frame_idx += 1;
        if frame_idx % u64::from(stride) != 0 {
            continue;
        }
        process_frame(&ctx, &mut tracker, &frame);
    }
    info!(camera = ctx.camera_id, "inference worker stopped");
}

/// Run detection + identification + tracking for one frame and forward
/// finalized observations.
pub fn process_frame(ctx: &InferenceContext, tracker: &mut FaceTracker, frame: &Frame) -> usize {
    let now = Utc::now();
    let faces = ctx.engine.detect(frame);
    if faces.is_empty() && tracker.track_count() == 0 {
        return 0;
    }
    metrics::counter!("argus_frames_processed_total").increment(1);

    let detections: Vec<TrackDetection> = faces
        .into_iter()
        .map(|face| {
            let quality = ctx.scorer.score(frame, &face.bbox);
            let mut candidate = None;
            let mut similarity = 0.0;
            // Low-quality crops keep their geometry for tracking but are
            // excluded from the identity vote.
            if ctx.scorer.accepts(&quality) {
                if let Some(embedding) = &face.embedding {
                    let (matched, sim) = ctx.store.best_match(embedding);
                    if let Some(employee_id) = matched {
                        if sim >= ctx.similarity_threshold {
                            candidate = Some(employee_id);
                            similarity = sim;
                        }
                    }
                }
            }
            TrackDetection {
                bbox: face.bbox,
                candidate,
                similarity,
                quality: quality.score,
            }
        })
        .collect();

    let observations = tracker.update(&detections, now);
    let forwarded = observations.len();
    for obs in observations {
        debug!(
            camera = ctx.camera_id,
            employee = obs.employee_id,
            track = obs.track_id,
            "track finalized employee sighting"
        );
        ctx.presence.handle_seen(
            obs.employee_id,
            ctx.camera_id,
            now,
            obs.similarity,
            Some(obs.track_id),
        );
    }
    forwarded
}
