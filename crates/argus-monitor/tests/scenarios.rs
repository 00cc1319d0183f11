//! End-to-end scenarios: tracker observations drive the presence machine,
//! whose intents are applied by the serialized writer against an
//! in-memory database. Schedule gating uses manual mode so the tests are
//! independent of the wall clock.

use std::collections::BTreeMap;
use std::sync::Arc;

use argus_db::{
    AlertRepository, AttendanceRepository, Db, EmployeeRepository, EventRepository,
    IntentWriter, PresenceRepository, WriterConfig,
};
use argus_match::{EmbeddingStore, EmployeeMeta, FaceTracker, TrackDetection, TrackerConfig};
use argus_models::{
    AlertType, AttendanceStatus, BoundingBox, Employee, EmployeeId, EntryType, PresenceStatus,
    WriteIntent,
};
use argus_monitor::evidence::{EvidenceKind, EvidenceRequest};
use argus_monitor::{LocalClock, ModeUpdate, PresenceBoard, PresenceConfig, ScheduleController};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::mpsc;

struct Harness {
    db: Db,
    board: Arc<PresenceBoard>,
    schedule: Arc<ScheduleController>,
    store: Arc<EmbeddingStore>,
    meta: BTreeMap<EmployeeId, EmployeeMeta>,
    writer: IntentWriter,
    intents_rx: mpsc::UnboundedReceiver<WriteIntent>,
    evidence_rx: mpsc::UnboundedReceiver<EvidenceRequest>,
    _dir: tempfile::TempDir,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = LocalClock::new(chrono_tz::Asia::Jakarta);
        let schedule = Arc::new(ScheduleController::load(
            dir.path().join("tracking_mode.json"),
            clock,
        ));
        // Manual mode: tracking on, alerts allowed, independent of the clock.
        schedule.set_mode(ModeUpdate {
            auto_schedule: Some(false),
            tracking_active: Some(true),
            suppress_alerts: Some(false),
            work_hours: Some("08:00-17:00".into()),
            lunch_break: Some("12:00-13:00".into()),
            ..ModeUpdate::default()
        });

        let db = Db::connect_memory().await.unwrap();
        let store = Arc::new(EmbeddingStore::default());

        let (intents_tx, intents_rx) = mpsc::unbounded_channel();
        let (evidence_tx, evidence_rx) = mpsc::unbounded_channel();
        let board = Arc::new(PresenceBoard::new(
            PresenceConfig {
                presence_timeout: Duration::seconds(60),
                alert_min_interval: Duration::seconds(30),
            },
            Arc::clone(&schedule),
            Arc::clone(&store),
            intents_tx,
            evidence_tx,
        ));

        let writer = IntentWriter::new(db.clone(), WriterConfig::default(), schedule.subscribe());

        Self {
            db,
            board,
            schedule,
            store,
            meta: BTreeMap::new(),
            writer,
            intents_rx,
            evidence_rx,
            _dir: dir,
        }
    }

    async fn seed_employee(&mut self, code: &str, name: &str) -> EmployeeId {
        let id = {
            let mut conn = self.db.pool().acquire().await.unwrap();
            EmployeeRepository::insert(
                &mut *conn,
                &Employee {
                    id: 0,
                    employee_code: code.into(),
                    name: name.into(),
                    department: Some("Production".into()),
                    position: None,
                    phone_number: None,
                    is_active: true,
                    supervisor_id: None,
                },
            )
            .await
            .unwrap()
        };
        // mirror what the store refresher would load
        self.meta.insert(
            id,
            EmployeeMeta {
                name: name.into(),
                department: Some("Production".into()),
                is_active: true,
            },
        );
        self.store.install(BTreeMap::new(), self.meta.clone());
        id
    }

    /// Apply every queued intent through the writer, returning them.
    async fn drain(&mut self) -> Vec<WriteIntent> {
        let mut applied = Vec::new();
        while let Ok(intent) = self.intents_rx.try_recv() {
            self.writer.apply(&intent).await.unwrap();
            applied.push(intent);
        }
        applied
    }

    fn drain_evidence(&mut self) -> Vec<EvidenceRequest> {
        let mut out = Vec::new();
        while let Ok(req) = self.evidence_rx.try_recv() {
            out.push(req);
        }
        out
    }
}

fn t0() -> DateTime<Utc> {
    // 09:00 local (WIB) on a work day
    Utc.with_ymd_and_hms(2024, 5, 6, 2, 0, 0).unwrap()
}

fn alert_count(intents: &[WriteIntent], alert_type: AlertType) -> usize {
    intents
        .iter()
        .filter(|i| matches!(i, WriteIntent::AlertEmit { alert_type: t, .. } if *t == alert_type))
        .count()
}

#[tokio::test]
async fn scenario_enter_once_with_attendance() {
    let mut h = Harness::new().await;
    let emp = h.seed_employee("E-7", "Ayu").await;

    // ten sightings in one second, the way a finalized track re-emits
    for i in 0..10 {
        h.board
            .handle_seen(emp, 1, t0() + Duration::milliseconds(i * 100), 0.8, Some(1));
    }
    let intents = h.drain().await;

    assert_eq!(alert_count(&intents, AlertType::Enter), 1);
    assert_eq!(alert_count(&intents, AlertType::Exit), 0);

    let mut conn = h.db.pool().acquire().await.unwrap();
    let att = AttendanceRepository::get(&mut *conn, emp, t0().date_naive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(att.status, AttendanceStatus::Present);
    assert_eq!(att.entry_type, EntryType::Auto);
    assert_eq!(att.first_in_ts, Some(t0()));

    let pres = PresenceRepository::get(&mut *conn, emp).await.unwrap().unwrap();
    assert_eq!(pres.status, PresenceStatus::Available);

    // ENTER alert carried a first-in evidence request
    let evidence = h.drain_evidence();
    assert_eq!(evidence.len(), 1);
    assert!(matches!(
        evidence[0].kind,
        EvidenceKind::FirstIn { force: false }
    ));
}

#[tokio::test]
async fn scenario_timeout_emits_exit_and_last_out() {
    let mut h = Harness::new().await;
    let emp = h.seed_employee("E-7", "Ayu").await;

    h.board.handle_seen(emp, 1, t0(), 0.8, Some(1));
    h.drain().await;
    h.drain_evidence();

    // presence timeout is 60s; the tick one second past it flips to off
    let timeout_at = t0() + Duration::seconds(61);
    h.board.tick(timeout_at);
    let intents = h.drain().await;

    assert_eq!(alert_count(&intents, AlertType::Exit), 1);
    assert!(intents
        .iter()
        .any(|i| matches!(i, WriteIntent::EmployeeTimeout { .. })));

    let mut conn = h.db.pool().acquire().await.unwrap();
    let att = AttendanceRepository::get(&mut *conn, emp, t0().date_naive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(att.last_out_ts, Some(timeout_at));
    assert!(att.first_in_ts.unwrap() <= att.last_out_ts.unwrap());

    let pres = PresenceRepository::get(&mut *conn, emp).await.unwrap().unwrap();
    assert_eq!(pres.status, PresenceStatus::Off);

    // the EXIT carried a last-out evidence request
    let evidence = h.drain_evidence();
    assert_eq!(evidence.len(), 1);
    assert!(matches!(evidence[0].kind, EvidenceKind::LastOut));

    // further ticks while off stay quiet
    h.board.tick(timeout_at + Duration::seconds(10));
    assert!(h.drain().await.is_empty());
}

#[tokio::test]
async fn scenario_lunch_gate_blocks_alerts_not_attendance() {
    let mut h = Harness::new().await;
    let emp = h.seed_employee("E-7", "Ayu").await;

    // lunch: tracking stays on, alerts suppressed
    h.schedule.set_mode(ModeUpdate {
        suppress_alerts: Some(true),
        ..ModeUpdate::default()
    });

    h.board.handle_seen(emp, 1, t0(), 0.8, Some(1));
    let intents = h.drain().await;

    assert_eq!(alert_count(&intents, AlertType::Enter), 0);
    assert!(h.drain_evidence().is_empty());

    let mut conn = h.db.pool().acquire().await.unwrap();
    let att = AttendanceRepository::get(&mut *conn, emp, t0().date_naive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(att.status, AttendanceStatus::Present);
    drop(conn);

    // after lunch, a sighting while still available produces no late ENTER
    h.schedule.set_mode(ModeUpdate {
        suppress_alerts: Some(false),
        ..ModeUpdate::default()
    });
    h.board
        .handle_seen(emp, 1, t0() + Duration::seconds(5), 0.8, Some(1));
    let intents = h.drain().await;
    assert_eq!(alert_count(&intents, AlertType::Enter), 0);
}

#[tokio::test]
async fn scenario_tracking_inactive_drops_signals() {
    let mut h = Harness::new().await;
    let emp = h.seed_employee("E-7", "Ayu").await;

    h.schedule.set_mode(ModeUpdate {
        tracking_active: Some(false),
        ..ModeUpdate::default()
    });

    h.board.handle_seen(emp, 1, t0(), 0.8, Some(1));
    assert!(h.drain().await.is_empty());

    let mut conn = h.db.pool().acquire().await.unwrap();
    assert!(AttendanceRepository::get(&mut *conn, emp, t0().date_naive())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn scenario_alert_debounce_across_cycles() {
    let mut h = Harness::new().await;
    let emp = h.seed_employee("E-7", "Ayu").await;

    // enter, time out, and re-enter within the 30s debounce window
    h.board.handle_seen(emp, 1, t0(), 0.8, Some(1));
    h.drain().await;

    // force off by ticking past the timeout
    h.board.tick(t0() + Duration::seconds(61));
    h.drain().await;

    // re-enter 10 seconds later: inside the ENTER debounce window
    h.board
        .handle_seen(emp, 1, t0() + Duration::seconds(10), 0.8, Some(1));
    let intents = h.drain().await;
    assert_eq!(alert_count(&intents, AlertType::Enter), 0);
    // the seen intent itself still flows
    assert!(intents
        .iter()
        .any(|i| matches!(i, WriteIntent::EmployeeSeen { .. })));

    // a cycle past the window alerts again
    h.board.tick(t0() + Duration::seconds(120));
    h.drain().await;
    h.board
        .handle_seen(emp, 1, t0() + Duration::seconds(180), 0.8, Some(1));
    let intents = h.drain().await;
    assert_eq!(alert_count(&intents, AlertType::Enter), 1);
}

#[tokio::test]
async fn scenario_alert_rows_satisfy_schedule_gate() {
    let mut h = Harness::new().await;
    let emp = h.seed_employee("E-7", "Ayu").await;

    h.board.handle_seen(emp, 1, t0(), 0.8, Some(1));
    h.board.tick(t0() + Duration::seconds(61));
    h.drain().await;

    let mut conn = h.db.pool().acquire().await.unwrap();
    let alerts = AlertRepository::list_since(&mut *conn, t0() - Duration::hours(1))
        .await
        .unwrap();
    assert!(!alerts.is_empty());
    for alert in alerts.iter().filter(|a| a.alert_type != AlertType::NewEmployee) {
        assert!(alert.schedule.tracking_active);
        assert!(!alert.schedule.is_manual_pause);
    }
    // messages name the employee
    assert!(alerts
        .iter()
        .any(|a| a.message.as_deref() == Some("Ayu has entered the area")));
    assert!(alerts
        .iter()
        .any(|a| a.message.as_deref() == Some("Ayu has left the area")));
}

#[tokio::test]
async fn scenario_tracker_votes_drive_enter() {
    let mut h = Harness::new().await;
    let emp = h.seed_employee("E-7", "Ayu").await;

    let mut tracker = FaceTracker::new(TrackerConfig::default());
    let mut enter_seen = 0;
    for i in 0..10 {
        let ts = t0() + Duration::milliseconds(i * 100);
        let detections = vec![TrackDetection {
            bbox: BoundingBox::new(100.0 + i as f64, 100.0, 50.0, 50.0),
            candidate: Some(emp),
            similarity: 0.8,
            quality: 0.9,
        }];
        for obs in tracker.update(&detections, ts) {
            h.board
                .handle_seen(obs.employee_id, 1, ts, obs.similarity, Some(obs.track_id));
        }
        enter_seen = alert_count(&h.drain().await, AlertType::Enter) + enter_seen;
    }
    // votes reach plurality on the third frame; exactly one ENTER overall
    assert_eq!(enter_seen, 1);

    let mut conn = h.db.pool().acquire().await.unwrap();
    // first_in stamped at the third sighting, when the track finalized
    let att = AttendanceRepository::get(&mut *conn, emp, t0().date_naive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(att.first_in_ts, Some(t0() + Duration::milliseconds(200)));
    // events recorded with the track id
    let ev = EventRepository::latest_for_employee(&mut *conn, emp, t0() - Duration::hours(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ev.track_id, Some(1));
}

#[tokio::test]
async fn scenario_new_employee_announced_once() {
    let mut h = Harness::new().await;
    let emp = h.seed_employee("E-9", "Budi").await;
    let mut new_rx = h.writer.subscribe_new_employee();

    h.board.handle_seen(emp, 2, t0(), 0.9, Some(4));
    h.drain().await;

    let announced = new_rx.try_recv().unwrap();
    assert_eq!(announced.employee_id, emp);
    assert_eq!(announced.camera_id, 2);

    let mut conn = h.db.pool().acquire().await.unwrap();
    let alerts = AlertRepository::list_since(&mut *conn, t0() - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(
        alerts
            .iter()
            .filter(|a| a.alert_type == AlertType::NewEmployee)
            .count(),
        1
    );
}
