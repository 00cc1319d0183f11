//! Attendance evidence captures.
//!
//! Writes `attendance_captures/<YYYY-MM-DD>/<employee_id>/{first_in.jpg,
//! last_out.jpg, meta.json}` in reaction to presence transitions.
//! `first_in.jpg` is write-once per day unless the overwrite flag is set
//! or the request is forced (first sighting of a newly enrolled
//! employee). Failures are logged and never propagate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use argus_models::{CameraId, EmployeeId, NewEmployeeSeen};
use argus_vision::Frame;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::time::LocalClock;

/// Which evidence file a request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceKind {
    FirstIn {
        /// Overwrite an existing file regardless of configuration.
        force: bool,
    },
    LastOut,
}

/// Capture request emitted by the presence machine.
#[derive(Debug, Clone)]
pub struct EvidenceRequest {
    pub employee_id: EmployeeId,
    pub camera_id: CameraId,
    pub ts: DateTime<Utc>,
    pub kind: EvidenceKind,
}

/// Camera display metadata recorded into `meta.json`.
#[derive(Debug, Clone)]
pub struct CameraMeta {
    pub name: String,
    pub area: Option<String>,
}

/// Read access to frames and camera metadata, implemented by the monitor
/// state view.
pub trait FrameView: Send + Sync {
    /// Latest annotated frame for a camera.
    fn annotated_snapshot(&self, camera_id: CameraId) -> Option<Frame>;
    fn camera_meta(&self, camera_id: CameraId) -> Option<CameraMeta>;
}

/// Evidence writer configuration.
#[derive(Debug, Clone)]
pub struct EvidenceConfig {
    pub root: PathBuf,
    pub first_in_overwrite: bool,
    /// Delay before the last-out capture, letting the tracker settle.
    pub last_out_delay: StdDuration,
    pub jpeg_quality: u8,
}

/// Consumes evidence requests and new-employee announcements.
pub struct EvidenceWriter {
    config: EvidenceConfig,
    view: Arc<dyn FrameView>,
    clock: LocalClock,
}

impl EvidenceWriter {
    pub fn new(config: EvidenceConfig, view: Arc<dyn FrameView>, clock: LocalClock) -> Self {
        Self {
            config,
            view,
            clock,
        }
    }

    /// Drain both channels until the request channel closes.
    pub async fn run(
        self: Arc<Self>,
        mut requests: mpsc::UnboundedReceiver<EvidenceRequest>,
        mut new_employees: broadcast::Receiver<NewEmployeeSeen>,
    ) {
        info!(root = %self.config.root.display(), "evidence writer started");
        loop {
            tokio::select! {
                req = requests.recv() => {
                    match req {
                        Some(req) => Self::dispatch(&self, req),
                        None => break,
                    }
                }
                seen = new_employees.recv() => {
                    match seen {
                        Ok(seen) => {
                            // First detection of a newly enrolled employee
                            // always refreshes the first-in evidence.
                            Self::dispatch(&self, EvidenceRequest {
                                employee_id: seen.employee_id,
                                camera_id: seen.camera_id,
                                ts: seen.ts,
                                kind: EvidenceKind::FirstIn { force: true },
                            });
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "new-employee channel lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        info!("evidence writer stopped");
    }

    fn dispatch(writer: &Arc<Self>, req: EvidenceRequest) {
        let delay = match req.kind {
            EvidenceKind::LastOut => writer.config.last_out_delay,
            EvidenceKind::FirstIn { .. } => StdDuration::ZERO,
        };
        let writer = Arc::clone(writer);
        tokio::spawn(async move {
            if delay > StdDuration::ZERO {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = writer.write(&req) {
                warn!(
                    employee = req.employee_id,
                    camera = req.camera_id,
                    error = %e,
                    "evidence capture failed"
                );
            }
        });
    }

    /// Perform one capture. Public for tests.
    pub fn write(&self, req: &EvidenceRequest) -> std::io::Result<()> {
        let date = self.clock.local_date(req.ts);
        let dir = self.employee_dir(date, req.employee_id);
        let (file_name, force) = match req.kind {
            EvidenceKind::FirstIn { force } => ("first_in.jpg", force),
            EvidenceKind::LastOut => ("last_out.jpg", false),
        };
        let target = dir.join(file_name);

        if file_name == "first_in.jpg"
            && target.is_file()
            && !(force || self.config.first_in_overwrite)
        {
            debug!(
                employee = req.employee_id,
                date = %date,
                "first-in evidence already exists; skipping"
            );
            return Ok(());
        }

        let frame = match self.view.annotated_snapshot(req.camera_id) {
            Some(f) => f,
            None => {
                debug!(camera = req.camera_id, "no frame available for evidence");
                return Ok(());
            }
        };
        let jpeg = frame
            .encode_jpeg(self.config.jpeg_quality)
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        std::fs::create_dir_all(&dir)?;
        std::fs::write(&target, jpeg)?;
        self.merge_meta(&dir, req, file_name)?;
        info!(
            employee = req.employee_id,
            camera = req.camera_id,
            file = %target.display(),
            "evidence saved"
        );
        Ok(())
    }

    fn employee_dir(&self, date: NaiveDate, employee_id: EmployeeId) -> PathBuf {
        self.config
            .root
            .join(date.format("%Y-%m-%d").to_string())
            .join(employee_id.to_string())
    }

    fn merge_meta(&self, dir: &Path, req: &EvidenceRequest, file_name: &str) -> std::io::Result<()> {
        let meta_path = dir.join("meta.json");
        let mut root: serde_json::Value = std::fs::read_to_string(&meta_path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_else(|| serde_json::json!({}));

        let cam = self.view.camera_meta(req.camera_id);
        let key = match req.kind {
            EvidenceKind::FirstIn { .. } => "first_in",
            EvidenceKind::LastOut => "last_out",
        };
        root[key] = serde_json::json!({
            "ts": req.ts.to_rfc3339(),
            "camera_id": req.camera_id,
            "camera_name": cam.as_ref().map(|c| c.name.clone()),
            "camera_area": cam.as_ref().and_then(|c| c.area.clone()),
            "file": file_name,
        });
        std::fs::write(&meta_path, serde_json::to_vec_pretty(&root)?)?;
        Ok(())
    }
}

/// Delete `attendance_captures/<date>/` directories older than `cutoff`.
pub fn cleanup_old_captures(root: &Path, cutoff: NaiveDate) -> usize {
    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(_) => return 0,
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(name, "%Y-%m-%d") else {
            continue;
        };
        if date < cutoff {
            if std::fs::remove_dir_all(&path).is_ok() {
                removed += 1;
            }
        }
    }
    if removed > 0 {
        info!(removed, cutoff = %cutoff, "removed old attendance capture folders");
    }
    removed
}
