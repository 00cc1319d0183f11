//! Rolling per-camera snapshots.
//!
//! Every period, each camera with a live worker pair or the stream flag
//! gets its latest annotated frame written to
//! `captures/<camera_id>/<YYYYMMDD_HHMMSS>.jpg`; only the newest N files
//! per camera are kept. Write failures are logged and never propagate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use argus_models::CameraId;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::state::MonitorState;
use crate::time::LocalClock;

/// Snapshot saver configuration.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub root: PathBuf,
    /// Newest files kept per camera.
    pub keep_per_camera: usize,
    pub jpeg_quality: u8,
    pub period: StdDuration,
}

impl SnapshotConfig {
    pub fn new(root: PathBuf, jpeg_quality: u8) -> Self {
        Self {
            root,
            keep_per_camera: 5,
            jpeg_quality,
            period: StdDuration::from_secs(5),
        }
    }
}

/// Periodic saver loop; stops when the shutdown flag flips.
pub async fn run_snapshot_saver(
    state: Arc<MonitorState>,
    config: SnapshotConfig,
    clock: LocalClock,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(root = %config.root.display(), "snapshot saver started");
    let mut interval = tokio::time::interval(config.period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                save_snapshots_once(&state, &config, clock.now_utc(), clock);
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("snapshot saver stopped");
}

/// One sweep over the snapshot targets; returns how many files landed.
pub fn save_snapshots_once(
    state: &MonitorState,
    config: &SnapshotConfig,
    now: DateTime<Utc>,
    clock: LocalClock,
) -> usize {
    let mut saved = 0;
    for camera_id in state.snapshot_targets() {
        let Some(frame) = state.get_latest_frame(camera_id) else {
            continue;
        };
        let annotated = state.annotate(&frame);
        let jpeg = match annotated.encode_jpeg(config.jpeg_quality) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(camera = camera_id, error = %e, "snapshot encode failed");
                continue;
            }
        };
        let stamp = now
            .with_timezone(&clock.tz())
            .format("%Y%m%d_%H%M%S")
            .to_string();
        let dir = config.root.join(camera_id.to_string());
        let path = dir.join(format!("{stamp}.jpg"));
        if let Err(e) = std::fs::create_dir_all(&dir).and_then(|_| std::fs::write(&path, &jpeg)) {
            warn!(camera = camera_id, error = %e, "snapshot write failed");
            continue;
        }
        debug!(camera = camera_id, path = %path.display(), "snapshot saved");
        rotate_keep_newest(&dir, config.keep_per_camera);
        saved += 1;
    }
    saved
}

/// Keep only the lexicographically newest `keep` jpg files in `dir`.
/// Timestamped names sort chronologically.
fn rotate_keep_newest(dir: &Path, keep: usize) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case("jpg"))
        })
        .collect();
    if files.len() <= keep {
        return;
    }
    files.sort();
    let excess = files.len() - keep;
    for old in files.into_iter().take(excess) {
        if let Err(e) = std::fs::remove_file(&old) {
            warn!(path = %old.display(), error = %e, "snapshot rotation failed");
        }
    }
}

/// URL-ish relative path of the capture closest to `target_ts` for a
/// camera, within `max_delta`; falls back to the newest capture.
pub fn nearest_capture_for(
    root: &Path,
    camera_id: CameraId,
    target_ts: DateTime<Utc>,
    clock: LocalClock,
    max_delta: chrono::Duration,
) -> Option<String> {
    let dir = root.join(camera_id.to_string());
    let entries = std::fs::read_dir(&dir).ok()?;
    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| n.to_ascii_lowercase().ends_with(".jpg"))
        .collect();
    if names.is_empty() {
        return None;
    }
    names.sort();

    let target_local = target_ts.with_timezone(&clock.tz()).naive_local();
    let mut best: Option<(chrono::Duration, &String)> = None;
    for name in &names {
        let stem = name.trim_end_matches(".jpg");
        let Ok(file_dt) = chrono::NaiveDateTime::parse_from_str(stem, "%Y%m%d_%H%M%S") else {
            continue;
        };
        let diff = (file_dt - target_local).abs();
        if best.as_ref().map_or(true, |(d, _)| diff < *d) {
            best = Some((diff, name));
        }
    }
    match best {
        Some((diff, name)) if diff <= max_delta => Some(format!("{camera_id}/{name}")),
        // window missed: newest capture as fallback
        _ => names.last().map(|n| format!("{camera_id}/{n}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "20240506_090000.jpg",
            "20240506_090005.jpg",
            "20240506_090010.jpg",
            "20240506_090015.jpg",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        rotate_keep_newest(dir.path(), 2);
        let mut left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().into_string().unwrap())
            .collect();
        left.sort();
        assert_eq!(left, vec!["20240506_090010.jpg", "20240506_090015.jpg"]);
    }

    #[test]
    fn test_nearest_capture_picks_closest() {
        let dir = tempfile::tempdir().unwrap();
        let cam_dir = dir.path().join("3");
        std::fs::create_dir_all(&cam_dir).unwrap();
        for name in ["20240506_090000.jpg", "20240506_120000.jpg"] {
            std::fs::write(cam_dir.join(name), b"x").unwrap();
        }
        let clock = LocalClock::new(chrono_tz::Asia::Jakarta);
        // 09:05 WIB = 02:05 UTC
        let target = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 5, 6, 2, 5, 0).unwrap();
        let url = nearest_capture_for(
            dir.path(),
            3,
            target,
            clock,
            chrono::Duration::hours(1),
        )
        .unwrap();
        assert_eq!(url, "3/20240506_090000.jpg");
    }

    #[test]
    fn test_nearest_capture_falls_back_to_latest() {
        let dir = tempfile::tempdir().unwrap();
        let cam_dir = dir.path().join("3");
        std::fs::create_dir_all(&cam_dir).unwrap();
        std::fs::write(cam_dir.join("20240506_090000.jpg"), b"x").unwrap();
        let clock = LocalClock::new(chrono_tz::Asia::Jakarta);
        let target = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 6, 1, 0, 0, 0).unwrap();
        let url = nearest_capture_for(
            dir.path(),
            3,
            target,
            clock,
            chrono::Duration::minutes(5),
        )
        .unwrap();
        assert_eq!(url, "3/20240506_090000.jpg");
    }
}
