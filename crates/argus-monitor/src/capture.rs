//! Per-camera capture worker.
//!
//! A dedicated OS thread blocks on source reads and pushes the newest
//! frame into the camera's single-slot buffer. After enough consecutive
//! read failures the source is released and reopened with a small
//! backoff. The thread observes a stop flag between iterations and is
//! joined with a bounded timeout on shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use argus_models::Camera;
use argus_vision::{FrameSource, VisionResult};
use tracing::{debug, info, warn};

use crate::frames::FrameSlot;

/// Consecutive read failures before the source is reopened.
pub const FAIL_THRESHOLD: u32 = 10;
/// Pause between a release and the reopen attempt.
pub const REOPEN_BACKOFF: Duration = Duration::from_millis(300);
/// Pause after a failed open before trying again.
pub const OPEN_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Factory the worker uses to (re)open its source. Tests substitute
/// synthetic sources here.
pub type SourceFactory =
    Arc<dyn Fn(&str) -> VisionResult<Box<dyn FrameSource>> + Send + Sync>;

/// Factory backed by the production source opener.
pub fn default_source_factory() -> SourceFactory {
    Arc::new(|url| argus_vision::open_source(url))
}

/// Spawn the capture thread for one camera.
pub fn spawn_capture(
    camera: Camera,
    slot: FrameSlot,
    stop: Arc<AtomicBool>,
    factory: SourceFactory,
    frame_interval: Duration,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("capture-{}", camera.id))
        .spawn(move || run_capture(&camera, &slot, &stop, &factory, frame_interval))
        .expect("failed to spawn capture thread")
}

fn run_capture(
    camera: &Camera,
    slot: &FrameSlot,
    stop: &AtomicBool,
    factory: &SourceFactory,
    frame_interval: Duration,
) {
    info!(camera = camera.id, source = %camera.source_url, "capture worker started");
    let mut source: Option<Box<dyn FrameSource>> = None;
    let mut fail_count: u32 = 0;

    while !stop.load(Ordering::Relaxed) {
        let src = match source.as_mut() {
            Some(s) => s,
            None => match factory(&camera.source_url) {
                Ok(s) => {
                    fail_count = 0;
                    source.insert(s)
                }
                Err(e) => {
                    debug!(camera = camera.id, error = %e, "source open failed");
                    interruptible_sleep(stop, OPEN_RETRY_BACKOFF);
                    continue;
                }
            },
        };

        match src.read() {
            Ok(frame) => {
                fail_count = 0;
                slot.store(frame);
                metrics::counter!("argus_frames_captured_total").increment(1);
                interruptible_sleep(stop, frame_interval);
            }
            Err(e) => {
                fail_count += 1;
                if fail_count >= FAIL_THRESHOLD {
                    warn!(
                        camera = camera.id,
                        failures = fail_count,
                        error = %e,
                        "read failures over threshold; reopening source"
                    );
                    source = None;
                    fail_count = 0;
                    interruptible_sleep(stop, REOPEN_BACKOFF);
                } else {
                    interruptible_sleep(stop, Duration::from_millis(50));
                }
            }
        }
    }
    info!(camera = camera.id, "capture worker stopped");
}

/// Sleep in short steps so the stop flag is observed promptly.
fn interruptible_sleep(stop: &AtomicBool, total: Duration) {
    let step = Duration::from_millis(20);
    let mut remaining = total;
    while !stop.load(Ordering::Relaxed) && remaining > Duration::ZERO {
        let chunk = remaining.min(step);
        std::thread::sleep(chunk);
        remaining = remaining.saturating_sub(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_vision::{Frame, VisionError};
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    struct ScriptedSource {
        script: Arc<Mutex<Vec<Result<u32, ()>>>>,
    }

    impl FrameSource for ScriptedSource {
        fn read(&mut self) -> VisionResult<Frame> {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Err(VisionError::source_read("script exhausted"));
            }
            match script.remove(0) {
                Ok(w) => Ok(Frame::zeros(w, 1)),
                Err(()) => Err(VisionError::source_read("scripted failure")),
            }
        }
    }

    fn camera() -> Camera {
        Camera {
            id: 1,
            name: "Test".into(),
            area: None,
            source_url: "rtsp://test/1".into(),
            enabled: true,
            stream_enabled: false,
        }
    }

    #[test]
    fn test_capture_stores_frames_and_stops() {
        let slot = FrameSlot::new();
        let stop = Arc::new(AtomicBool::new(false));
        let script = Arc::new(Mutex::new(vec![Ok(8), Ok(16)]));
        let factory: SourceFactory = {
            let script = script.clone();
            Arc::new(move |_| {
                Ok(Box::new(ScriptedSource {
                    script: script.clone(),
                }) as Box<dyn FrameSource>)
            })
        };

        let handle = spawn_capture(
            camera(),
            slot.clone(),
            stop.clone(),
            factory,
            Duration::from_millis(1),
        );

        // wait for both scripted frames to land
        for _ in 0..200 {
            if slot.latest().map(|f| f.width) == Some(16) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(slot.latest().unwrap().width, 16);

        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }

    #[test]
    fn test_capture_reopens_after_threshold() {
        let slot = FrameSlot::new();
        let stop = Arc::new(AtomicBool::new(false));
        let opens = Arc::new(AtomicU32::new(0));
        let factory: SourceFactory = {
            let opens = opens.clone();
            Arc::new(move |_| {
                let n = opens.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    // first source only fails
                    Ok(Box::new(ScriptedSource {
                        script: Arc::new(Mutex::new(vec![])),
                    }) as Box<dyn FrameSource>)
                } else {
                    // second source delivers a frame
                    Ok(Box::new(ScriptedSource {
                        script: Arc::new(Mutex::new(vec![Ok(32)])),
                    }) as Box<dyn FrameSource>)
                }
            })
        };

        let handle = spawn_capture(
            camera(),
            slot.clone(),
            stop.clone(),
            factory,
            Duration::from_millis(1),
        );

        for _ in 0..400 {
            if slot.latest().is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(slot.latest().unwrap().width, 32);
        assert!(opens.load(Ordering::SeqCst) >= 2);

        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
