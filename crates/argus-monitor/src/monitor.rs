//! Pipeline orchestrator.
//!
//! Owns the engine, store, schedule controller, presence machine, writer
//! and daemons, plus the per-camera worker pairs. Construction wires the
//! channels; `start` spawns capture/inference threads per camera; `stop`
//! flips the stop flags and joins with a bounded timeout. Background
//! daemons observe a shutdown watch.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration as StdDuration, Instant};

use argus_db::{
    AttendanceRepository, CameraRepository, Db, EmployeeRepository, FaceTemplateRepository,
    IntentWriter, PresenceRepository, WriterConfig,
};
use argus_match::{EmbeddingStore, EmployeeMeta, TrackerConfig};
use argus_models::{
    Attendance, AttendanceStatus, Camera, CameraId, EmployeeId, RuntimeParams,
};
use argus_vision::{FaceEngine, QualityConfig, QualityScorer};
use chrono::NaiveDate;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::capture::{default_source_factory, spawn_capture, SourceFactory};
use crate::config::{load_camera_configs, resolve_timezone, MonitorConfig};
use crate::error::{MonitorError, MonitorResult};
use crate::evidence::{EvidenceConfig, EvidenceWriter};
use crate::frames::FrameHub;
use crate::inference::{spawn_inference, InferenceContext};
use crate::presence::{PresenceBoard, PresenceConfig};
use crate::retention::{run_absent_daemon, run_midnight_daemon};
use crate::schedule::{ScheduleController, EVALUATE_PERIOD};
use crate::snapshots::{run_snapshot_saver, SnapshotConfig};
use crate::state::MonitorState;
use crate::time::LocalClock;

/// Timeout when joining worker threads on shutdown.
const JOIN_TIMEOUT: StdDuration = StdDuration::from_secs(2);
/// Presence timeout scan period.
const TICK_PERIOD: StdDuration = StdDuration::from_secs(1);
/// How often the store refresher checks whether a reload is due.
const STORE_REFRESH_CHECK: StdDuration = StdDuration::from_secs(5);

struct WorkerPair {
    stop: Arc<AtomicBool>,
    capture: std::thread::JoinHandle<()>,
    inference: std::thread::JoinHandle<()>,
}

/// The assembled tracking and presence pipeline.
pub struct Monitor {
    config: MonitorConfig,
    params: RuntimeParams,
    clock: LocalClock,
    db: Db,
    engine: Arc<FaceEngine>,
    store: Arc<EmbeddingStore>,
    schedule: Arc<ScheduleController>,
    presence: Arc<PresenceBoard>,
    hub: Arc<FrameHub>,
    state: Arc<MonitorState>,
    source_factory: SourceFactory,
    workers: Mutex<HashMap<CameraId, WorkerPair>>,
    active_cameras: Arc<RwLock<HashSet<CameraId>>>,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
}

impl Monitor {
    /// Build the pipeline: load configuration, connect the database, seed
    /// cameras, wire channels and spawn the background daemons.
    pub async fn new(config: MonitorConfig) -> MonitorResult<Self> {
        Self::with_source_factory(config, default_source_factory()).await
    }

    /// Like `new`, with an injected source factory (tests use synthetic
    /// sources).
    pub async fn with_source_factory(
        config: MonitorConfig,
        source_factory: SourceFactory,
    ) -> MonitorResult<Self> {
        let params = config.load_params();
        let clock = LocalClock::new(resolve_timezone(&params));
        let db = Db::connect(&config.database_url).await?;

        // Keep the cameras table in sync with camera_configs/.
        let cameras = load_camera_configs(&config.camera_configs_dir())?;
        {
            let mut conn = db.pool().acquire().await?;
            for camera in &cameras {
                CameraRepository::upsert(&mut *conn, camera).await?;
            }
        }
        info!(cameras = cameras.len(), "camera configs seeded");

        let engine = Arc::new(FaceEngine::new((
            params.detection_size[0],
            params.detection_size[1],
        )));
        let store = Arc::new(EmbeddingStore::default());
        reload_store(&db, &store, true).await?;

        let schedule = Arc::new(ScheduleController::load(
            config.tracking_state_path(),
            clock,
        ));

        let (intents_tx, intents_rx) = mpsc::unbounded_channel();
        let (evidence_tx, evidence_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);

        let presence = Arc::new(PresenceBoard::new(
            PresenceConfig {
                presence_timeout: chrono::Duration::milliseconds(
                    (params.presence_timeout() * 1000.0) as i64,
                ),
                alert_min_interval: chrono::Duration::milliseconds(
                    (params.alert_min_interval_sec * 1000.0) as i64,
                ),
            },
            Arc::clone(&schedule),
            Arc::clone(&store),
            intents_tx.clone(),
            evidence_tx,
        ));

        let hub = Arc::new(FrameHub::new());
        let active_cameras = Arc::new(RwLock::new(HashSet::new()));
        let running = Arc::new(AtomicBool::new(false));
        let state = Arc::new(MonitorState::new(
            params.clone(),
            Arc::clone(&presence),
            Arc::clone(&store),
            Arc::clone(&hub),
            Arc::clone(&engine),
            cameras,
            Arc::clone(&active_cameras),
            Arc::clone(&running),
        ));

        // Persisted presence is only the initial snapshot for the view.
        {
            let mut conn = db.pool().acquire().await?;
            state.seed_presence(PresenceRepository::list(&mut *conn).await?);
        }

        let writer = IntentWriter::new(
            db.clone(),
            WriterConfig {
                event_min_interval: chrono::Duration::milliseconds(
                    (params.event_min_interval_sec * 1000.0) as i64,
                ),
                tz: clock.tz(),
                ..WriterConfig::default()
            },
            schedule.subscribe(),
        );
        let new_employee_rx = writer.subscribe_new_employee();
        tokio::spawn(writer.run(intents_rx));

        let view: Arc<dyn crate::evidence::FrameView> = state.clone();
        let evidence_writer = Arc::new(EvidenceWriter::new(
            EvidenceConfig {
                root: config.attendance_captures_dir(),
                first_in_overwrite: params.attendance_first_in_overwrite_enabled,
                last_out_delay: StdDuration::from_secs(params.attendance_last_out_delay_sec),
                jpeg_quality: params.jpeg_quality,
            },
            view,
            clock,
        ));
        tokio::spawn(evidence_writer.run(evidence_rx, new_employee_rx));

        // The presence board holds the only long-lived intent sender; the
        // writer task ends when it drops.
        drop(intents_tx);

        let monitor = Self {
            config,
            params,
            clock,
            db,
            engine,
            store,
            schedule,
            presence,
            hub,
            state,
            source_factory,
            workers: Mutex::new(HashMap::new()),
            active_cameras,
            running,
            shutdown_tx,
        };
        monitor.spawn_daemons();
        Ok(monitor)
    }

    fn spawn_daemons(&self) {
        // Schedule evaluator.
        let schedule = Arc::clone(&self.schedule);
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EVALUATE_PERIOD);
            loop {
                tokio::select! {
                    _ = interval.tick() => schedule.evaluate(),
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() { break; }
                    }
                }
            }
        });

        // Presence timeout ticker.
        let presence = Arc::clone(&self.presence);
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_PERIOD);
            loop {
                tokio::select! {
                    _ = interval.tick() => presence.tick(chrono::Utc::now()),
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() { break; }
                    }
                }
            }
        });

        // Embedding store refresher.
        let db = self.db.clone();
        let store = Arc::clone(&self.store);
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STORE_REFRESH_CHECK);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = reload_store(&db, &store, false).await {
                            warn!(error = %e, "embedding store reload failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() { break; }
                    }
                }
            }
        });

        // Snapshot saver.
        tokio::spawn(run_snapshot_saver(
            Arc::clone(&self.state),
            SnapshotConfig::new(self.config.captures_dir(), self.params.jpeg_quality),
            self.clock,
            self.shutdown_tx.subscribe(),
        ));

        // Midnight purge + capture retention.
        tokio::spawn(run_midnight_daemon(
            self.db.clone(),
            self.clock,
            self.config.attendance_captures_dir(),
            self.params.attendance_captures_retention_days,
            self.shutdown_tx.subscribe(),
        ));

        // End-of-day absent marker.
        tokio::spawn(run_absent_daemon(
            self.db.clone(),
            self.clock,
            self.params.clone(),
            self.shutdown_tx.subscribe(),
        ));
    }

    /// Start worker pairs for the given cameras, or every enabled camera.
    pub fn start(&self, camera_ids: Option<&[CameraId]>) {
        let cameras = self.state.cameras();
        let targets: Vec<Camera> = cameras
            .into_iter()
            .filter(|c| c.enabled)
            .filter(|c| camera_ids.map_or(true, |ids| ids.contains(&c.id)))
            .collect();

        let mut workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        for camera in targets {
            if workers.contains_key(&camera.id) {
                continue;
            }
            let stop = Arc::new(AtomicBool::new(false));
            let slot = self.hub.slot(camera.id);
            let capture = spawn_capture(
                camera.clone(),
                slot.clone(),
                Arc::clone(&stop),
                Arc::clone(&self.source_factory),
                self.params.frame_interval(),
            );
            let inference = spawn_inference(
                InferenceContext {
                    camera_id: camera.id,
                    engine: Arc::clone(&self.engine),
                    store: Arc::clone(&self.store),
                    scorer: QualityScorer::new(QualityConfig::from_params(&self.params)),
                    tracker_config: TrackerConfig {
                        iou_threshold: self.params.tracker_iou_threshold,
                        max_misses: self.params.tracker_max_misses,
                        vote_window: self.params.smoothing_window,
                        min_votes: self.params.smoothing_min_votes,
                    },
                    presence: Arc::clone(&self.presence),
                    similarity_threshold: self.params.embedding_similarity_threshold,
                    frame_interval: self.params.frame_interval(),
                    stride: self.params.annotation_stride,
                },
                slot,
                Arc::clone(&stop),
            );
            self.active_cameras
                .write()
                .unwrap_or_else(|p| p.into_inner())
                .insert(camera.id);
            workers.insert(
                camera.id,
                WorkerPair {
                    stop,
                    capture,
                    inference,
                },
            );
            info!(camera = camera.id, "camera workers started");
        }
        self.running.store(!workers.is_empty(), Ordering::Relaxed);
    }

    /// Stop one camera's worker pair and drop its frame slot.
    pub fn stop_camera(&self, camera_id: CameraId) {
        let pair = {
            let mut workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
            workers.remove(&camera_id)
        };
        if let Some(pair) = pair {
            pair.stop.store(true, Ordering::Relaxed);
            join_with_timeout(pair.capture, JOIN_TIMEOUT);
            join_with_timeout(pair.inference, JOIN_TIMEOUT);
        }
        self.active_cameras
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&camera_id);
        self.hub.remove(camera_id);
        let workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        self.running.store(!workers.is_empty(), Ordering::Relaxed);
        info!(camera = camera_id, "camera workers stopped");
    }

    /// Stop every worker and signal the daemons.
    pub fn stop(&self) {
        let pairs: Vec<(CameraId, WorkerPair)> = {
            let mut workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
            workers.drain().collect()
        };
        for (_, pair) in &pairs {
            pair.stop.store(true, Ordering::Relaxed);
        }
        for (camera_id, pair) in pairs {
            join_with_timeout(pair.capture, JOIN_TIMEOUT);
            join_with_timeout(pair.inference, JOIN_TIMEOUT);
            self.hub.remove(camera_id);
        }
        self.active_cameras
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
        self.running.store(false, Ordering::Relaxed);
        let _ = self.shutdown_tx.send(true);
        info!("all camera workers stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn is_camera_running(&self, camera_id: CameraId) -> bool {
        self.workers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&camera_id)
    }

    /// Read surface for the UI collaborator.
    pub fn state(&self) -> Arc<MonitorState> {
        Arc::clone(&self.state)
    }

    pub fn schedule(&self) -> Arc<ScheduleController> {
        Arc::clone(&self.schedule)
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Admin override: pin `(employee, date)` to a MANUAL status.
    pub async fn set_manual_attendance(
        &self,
        employee_id: EmployeeId,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> MonitorResult<Attendance> {
        if !matches!(status, AttendanceStatus::Present | AttendanceStatus::Absent) {
            return Err(MonitorError::config("status must be PRESENT or ABSENT"));
        }
        let mut conn = self.db.pool().acquire().await?;
        if EmployeeRepository::get(&mut *conn, employee_id).await?.is_none() {
            return Err(MonitorError::config(format!(
                "employee {employee_id} not found"
            )));
        }
        Ok(AttendanceRepository::set_manual(&mut *conn, employee_id, date, status).await?)
    }

    /// Flip a MANUAL row back to automatic updates.
    pub async fn reset_attendance(
        &self,
        employee_id: EmployeeId,
        date: NaiveDate,
    ) -> MonitorResult<Attendance> {
        let mut conn = self.db.pool().acquire().await?;
        Ok(AttendanceRepository::reset_to_auto(&mut *conn, employee_id, date).await?)
    }
}

/// Fetch employees and templates and install a fresh store snapshot.
///
/// `force` bypasses the reload rate limit (startup).
pub async fn reload_store(db: &Db, store: &EmbeddingStore, force: bool) -> MonitorResult<()> {
    if !store.should_reload(force) {
        return Ok(());
    }
    let mut conn = db.pool().acquire().await?;
    let employees = EmployeeRepository::list_active(&mut *conn).await?;
    let templates = FaceTemplateRepository::load_all(&mut *conn).await?;
    drop(conn);

    let mut meta = BTreeMap::new();
    for e in &employees {
        meta.insert(
            e.id,
            EmployeeMeta {
                name: e.name.clone(),
                department: e.department.clone(),
                is_active: e.is_active,
            },
        );
    }
    let mut by_employee: BTreeMap<EmployeeId, Vec<Vec<f32>>> = BTreeMap::new();
    for t in templates {
        by_employee.entry(t.employee_id).or_default().push(t.embedding);
    }
    store.install(by_employee, meta);
    Ok(())
}

/// Join a worker thread, detaching it if it overstays the timeout.
fn join_with_timeout(handle: std::thread::JoinHandle<()>, timeout: StdDuration) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(thread = ?handle.thread().name(), "worker did not stop in time; detaching");
            return;
        }
        std::thread::sleep(StdDuration::from_millis(10));
    }
    let _ = handle.join();
}
