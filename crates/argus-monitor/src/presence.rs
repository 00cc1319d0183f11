//! Presence state machine.
//!
//! Per employee, `available` while the last sighting from any camera is
//! within the presence timeout, `off` otherwise. Transitions emit write
//! intents to the serialized writer and, when the schedule gate allows,
//! ENTER/EXIT alert intents plus evidence-capture requests. In-memory
//! state is updated synchronously, before the persisted row, so readers
//! never observe a stale `available` after a real EXIT.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use argus_match::EmbeddingStore;
use argus_models::{
    AlertType, CameraId, EmployeeId, PresenceStatus, TtlCache, WriteIntent,
};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::evidence::{EvidenceKind, EvidenceRequest};
use crate::schedule::ScheduleController;

/// Presence machine tuning.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Seconds without a sighting before `available` flips to `off`.
    pub presence_timeout: Duration,
    /// Per `(employee, alert type)` debounce window.
    pub alert_min_interval: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            presence_timeout: Duration::seconds(60),
            alert_min_interval: Duration::seconds(60),
        }
    }
}

/// One employee's live presence, as held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceEntry {
    pub employee_id: EmployeeId,
    pub status: PresenceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_camera: Option<CameraId>,
}

struct BoardInner {
    status: HashMap<EmployeeId, PresenceStatus>,
    last_seen: HashMap<EmployeeId, DateTime<Utc>>,
    last_camera: HashMap<EmployeeId, CameraId>,
    last_alert: TtlCache<(EmployeeId, AlertType), DateTime<Utc>>,
}

impl BoardInner {
    fn new() -> Self {
        Self {
            status: HashMap::new(),
            last_seen: HashMap::new(),
            last_camera: HashMap::new(),
            // Bounded: one debounce slot per (employee, alert type).
            last_alert: TtlCache::new(500, Duration::hours(1)),
        }
    }
}

/// Shared presence state machine fed by every camera's tracker.
pub struct PresenceBoard {
    config: PresenceConfig,
    schedule: Arc<ScheduleController>,
    store: Arc<EmbeddingStore>,
    intents: mpsc::UnboundedSender<WriteIntent>,
    evidence: mpsc::UnboundedSender<EvidenceRequest>,
    inner: Mutex<BoardInner>,
}

impl PresenceBoard {
    pub fn new(
        config: PresenceConfig,
        schedule: Arc<ScheduleController>,
        store: Arc<EmbeddingStore>,
        intents: mpsc::UnboundedSender<WriteIntent>,
        evidence: mpsc::UnboundedSender<EvidenceRequest>,
    ) -> Self {
        Self {
            config,
            schedule,
            store,
            intents,
            evidence,
            inner: Mutex::new(BoardInner::new()),
        }
    }

    /// A finalized track saw this employee.
    ///
    /// While the schedule has tracking inactive the signal is dropped
    /// entirely; no presence or attendance mutation happens off-hours.
    pub fn handle_seen(
        &self,
        employee_id: EmployeeId,
        camera_id: CameraId,
        ts: DateTime<Utc>,
        similarity: f64,
        track_id: Option<i64>,
    ) {
        if !self.schedule.tracking_active() {
            return;
        }

        let was_off;
        {
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            was_off = inner
                .status
                .get(&employee_id)
                .map_or(true, |s| *s == PresenceStatus::Off);
            inner.status.insert(employee_id, PresenceStatus::Available);
            inner.last_seen.insert(employee_id, ts);
            inner.last_camera.insert(employee_id, camera_id);
        }

        self.send_intent(WriteIntent::EmployeeSeen {
            employee_id,
            camera_id,
            ts,
            similarity,
            track_id,
        });

        if was_off {
            debug!(employee = employee_id, camera = camera_id, "presence: off -> available");
            self.emit_alert(employee_id, Some(camera_id), ts, AlertType::Enter);
        }
    }

    /// Periodic timeout scan.
    pub fn tick(&self, now: DateTime<Utc>) {
        let expired: Vec<(EmployeeId, Option<CameraId>)> = {
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            let cutoff = now - self.config.presence_timeout;
            let expired: Vec<EmployeeId> = inner
                .status
                .iter()
                .filter(|(emp, status)| {
                    **status == PresenceStatus::Available
                        && inner.last_seen.get(*emp).map_or(true, |ts| *ts < cutoff)
                })
                .map(|(emp, _)| *emp)
                .collect();
            expired
                .into_iter()
                .map(|emp| {
                    inner.status.insert(emp, PresenceStatus::Off);
                    (emp, inner.last_camera.get(&emp).copied())
                })
                .collect()
        };

        for (employee_id, camera_id) in expired {
            debug!(employee = employee_id, "presence: available -> off");
            self.send_intent(WriteIntent::EmployeeTimeout { employee_id, ts: now });
            self.emit_alert(employee_id, camera_id, now, AlertType::Exit);
        }
    }

    /// Live entries for the UI state view.
    pub fn entries(&self) -> Vec<PresenceEntry> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let mut out: Vec<PresenceEntry> = inner
            .status
            .iter()
            .map(|(emp, status)| PresenceEntry {
                employee_id: *emp,
                status: *status,
                last_seen: inner.last_seen.get(emp).copied(),
                last_camera: inner.last_camera.get(emp).copied(),
            })
            .collect();
        out.sort_by_key(|e| e.employee_id);
        out
    }

    fn emit_alert(
        &self,
        employee_id: EmployeeId,
        camera_id: Option<CameraId>,
        ts: DateTime<Utc>,
        alert_type: AlertType,
    ) {
        // Suppressed entirely outside the schedule gate.
        if !self.schedule.alerts_allowed() {
            return;
        }
        // Per (employee, type) debounce.
        {
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            let key = (employee_id, alert_type);
            if let Some(last) = inner.last_alert.get(&key, ts) {
                if ts - *last < self.config.alert_min_interval {
                    return;
                }
            }
            inner.last_alert.insert(key, ts, ts);
        }

        let name = self
            .store
            .snapshot()
            .meta(employee_id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| format!("Employee {employee_id}"));
        let message = match alert_type {
            AlertType::Enter => format!("{name} has entered the area"),
            AlertType::Exit => format!("{name} has left the area"),
            AlertType::NewEmployee => format!("(New Employee) {name} has entered the area"),
        };

        self.send_intent(WriteIntent::AlertEmit {
            employee_id,
            camera_id,
            ts,
            alert_type,
            message,
            schedule: self.schedule.snapshot(),
        });

        if let Some(camera_id) = camera_id {
            let kind = match alert_type {
                AlertType::Exit => EvidenceKind::LastOut,
                _ => EvidenceKind::FirstIn { force: false },
            };
            let _ = self.evidence.send(EvidenceRequest {
                employee_id,
                camera_id,
                ts,
                kind,
            });
        }
    }

    fn send_intent(&self, intent: WriteIntent) {
        if self.intents.send(intent).is_err() {
            warn!("intent channel closed; writer gone");
        }
    }
}
