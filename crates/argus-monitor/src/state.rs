//! Read-only state view for the UI collaborator.
//!
//! Serves the live presence table, latest/annotated frames and stream
//! preferences without touching the database: presence comes from the
//! in-memory board (persisted rows only seed the first snapshot), names
//! and departments from the embedding store, frames from the frame hub.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use argus_match::EmbeddingStore;
use argus_models::{Camera, CameraId, EmployeeId, Presence, PresenceStatus, RuntimeParams};
use argus_vision::{annotate_frame, FaceEngine, FaceLabel, Frame};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::evidence::{CameraMeta, FrameView};
use crate::frames::FrameHub;
use crate::presence::{PresenceBoard, PresenceEntry};

/// Streaming knobs the UI pipeline asks for.
#[derive(Debug, Clone, Serialize)]
pub struct StreamPreferences {
    pub max_width: u32,
    pub jpeg_quality: u8,
    pub annotation_stride: u32,
    pub target_fps: u32,
}

/// One employee row in the live view.
#[derive(Debug, Clone, Serialize)]
pub struct StateItem {
    pub employee_id: EmployeeId,
    pub name: String,
    pub department: Option<String>,
    pub status: PresenceStatus,
    pub last_seen_ts: Option<DateTime<Utc>>,
    pub seconds_since: Option<i64>,
    pub is_present: bool,
    pub camera_id: Option<CameraId>,
    pub camera_name: Option<String>,
}

/// Aggregate live view.
#[derive(Debug, Clone, Serialize)]
pub struct StateReport {
    pub running: bool,
    pub present_count: usize,
    pub off_count: usize,
    pub total: usize,
    pub active_total: usize,
    pub items: Vec<StateItem>,
}

/// Shared read surface over the pipeline's in-memory state.
pub struct MonitorState {
    params: RuntimeParams,
    presence: Arc<PresenceBoard>,
    store: Arc<EmbeddingStore>,
    hub: Arc<FrameHub>,
    engine: Arc<FaceEngine>,
    cameras: RwLock<HashMap<CameraId, Camera>>,
    /// Cameras with live worker pairs, maintained by the orchestrator.
    active_cameras: Arc<RwLock<HashSet<CameraId>>>,
    running: Arc<AtomicBool>,
    /// Persisted presence rows, shown until live signals replace them.
    initial_presence: RwLock<HashMap<EmployeeId, PresenceEntry>>,
}

impl MonitorState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: RuntimeParams,
        presence: Arc<PresenceBoard>,
        store: Arc<EmbeddingStore>,
        hub: Arc<FrameHub>,
        engine: Arc<FaceEngine>,
        cameras: Vec<Camera>,
        active_cameras: Arc<RwLock<HashSet<CameraId>>>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            params,
            presence,
            store,
            hub,
            engine,
            cameras: RwLock::new(cameras.into_iter().map(|c| (c.id, c)).collect()),
            active_cameras,
            running,
            initial_presence: RwLock::new(HashMap::new()),
        }
    }

    /// Seed the view with persisted presence rows. Status survives as the
    /// initial snapshot; `last_seen` is replayed from live signals only.
    pub fn seed_presence(&self, rows: Vec<Presence>) {
        let mut initial = self
            .initial_presence
            .write()
            .unwrap_or_else(|p| p.into_inner());
        for row in rows {
            initial.insert(
                row.employee_id,
                PresenceEntry {
                    employee_id: row.employee_id,
                    status: row.status,
                    last_seen: row.last_seen_ts,
                    last_camera: row.last_camera_id,
                },
            );
        }
    }

    /// Refresh the camera table after config changes.
    pub fn set_cameras(&self, cameras: Vec<Camera>) {
        let mut map = self.cameras.write().unwrap_or_else(|p| p.into_inner());
        *map = cameras.into_iter().map(|c| (c.id, c)).collect();
    }

    pub fn cameras(&self) -> Vec<Camera> {
        let map = self.cameras.read().unwrap_or_else(|p| p.into_inner());
        let mut cams: Vec<Camera> = map.values().cloned().collect();
        cams.sort_by_key(|c| c.id);
        cams
    }

    /// Cameras the snapshot saver should persist: live workers plus
    /// stream-enabled cameras.
    pub fn snapshot_targets(&self) -> Vec<CameraId> {
        let cams = self.cameras.read().unwrap_or_else(|p| p.into_inner());
        let active = self
            .active_cameras
            .read()
            .unwrap_or_else(|p| p.into_inner());
        let mut ids: Vec<CameraId> = cams
            .values()
            .filter(|c| active.contains(&c.id) || c.stream_enabled)
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Aggregate live presence view, sorted most-recently-present first.
    pub fn get_state(&self, now: DateTime<Utc>) -> StateReport {
        let snapshot = self.store.snapshot();
        let timeout = self.params.presence_timeout() as i64;
        let cameras = self.cameras.read().unwrap_or_else(|p| p.into_inner());

        // Live board entries win over the persisted seed.
        let mut merged: HashMap<EmployeeId, PresenceEntry> = self
            .initial_presence
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        for entry in self.presence.entries() {
            merged.insert(entry.employee_id, entry);
        }

        let mut items = Vec::new();
        let mut present_count = 0;
        for (&employee_id, meta) in snapshot.iter_meta() {
            if !meta.is_active {
                continue;
            }
            let Some(entry) = merged.get(&employee_id) else {
                continue;
            };
            let seconds_since = entry
                .last_seen
                .map(|ts| (now - ts).num_seconds().max(0));
            let is_present = seconds_since.map_or(false, |s| s <= timeout);
            if is_present {
                present_count += 1;
            }
            let camera_name = entry
                .last_camera
                .and_then(|id| cameras.get(&id))
                .map(|c| c.name.clone());
            items.push(StateItem {
                employee_id,
                name: meta.name.clone(),
                department: meta.department.clone(),
                status: if is_present {
                    PresenceStatus::Available
                } else {
                    PresenceStatus::Off
                },
                last_seen_ts: entry.last_seen,
                seconds_since,
                is_present,
                camera_id: entry.last_camera,
                camera_name,
            });
        }

        items.sort_by(|a, b| {
            (!a.is_present)
                .cmp(&(!b.is_present))
                .then_with(|| {
                    a.seconds_since
                        .unwrap_or(i64::MAX)
                        .cmp(&b.seconds_since.unwrap_or(i64::MAX))
                })
                .then_with(|| a.name.cmp(&b.name))
        });

        let total = items.len();
        StateReport {
            running: self.running.load(Ordering::Relaxed),
            present_count,
            off_count: total - present_count,
            total,
            active_total: snapshot.active_employee_count(),
            items,
        }
    }

    /// Copy of the latest frame for a camera.
    pub fn get_latest_frame(&self, camera_id: CameraId) -> Option<Frame> {
        self.hub.latest(camera_id)
    }

    /// Detect, identify and draw boxes onto a copy of `frame`.
    pub fn annotate(&self, frame: &Frame) -> Frame {
        let snapshot = self.store.snapshot();
        let threshold = self.params.embedding_similarity_threshold;
        let labels: Vec<FaceLabel> = self
            .engine
            .detect(frame)
            .into_iter()
            .map(|det| {
                let employee = det.embedding.as_deref().and_then(|emb| {
                    let (matched, sim) = self.store.best_match(emb);
                    matched.filter(|_| sim >= threshold).map(|id| {
                        let name = snapshot
                            .meta(id)
                            .map(|m| m.name.clone())
                            .unwrap_or_else(|| format!("ID {id}"));
                        (id, name)
                    })
                });
                FaceLabel {
                    bbox: det.bbox,
                    employee,
                }
            })
            .collect();
        annotate_frame(frame, &labels)
    }

    pub fn stream_preferences(&self) -> StreamPreferences {
        StreamPreferences {
            max_width: self.params.stream_max_width,
            jpeg_quality: self.params.jpeg_quality,
            annotation_stride: self.params.annotation_stride,
            target_fps: self.params.fps_target,
        }
    }

    pub fn params(&self) -> &RuntimeParams {
        &self.params
    }
}

impl FrameView for MonitorState {
    fn annotated_snapshot(&self, camera_id: CameraId) -> Option<Frame> {
        self.get_latest_frame(camera_id)
            .map(|frame| self.annotate(&frame))
    }

    fn camera_meta(&self, camera_id: CameraId) -> Option<CameraMeta> {
        let cameras = self.cameras.read().unwrap_or_else(|p| p.into_inner());
        cameras.get(&camera_id).map(|c| CameraMeta {
            name: c.name.clone(),
            area: c.area.clone(),
        })
    }
}
