//! Serialized database writer.
//!
//! A single consumer drains an unbounded FIFO of `WriteIntent`s and applies
//! each inside its own transaction. Enqueue order is apply order, which
//! gives per-employee upserts a strict happened-before with the source
//! signals. A failed intent rolls back, is logged and skipped; producers
//! are never blocked.

use argus_models::{
    AlertType, CameraId, EmployeeId, NewEmployeeSeen, ScheduleSnapshot, TtlCache, WriteIntent,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};

use crate::alerts::AlertRepository;
use crate::attendance::AttendanceRepository;
use crate::db::Db;
use crate::employees::EmployeeRepository;
use crate::error::DbResult;
use crate::events::EventRepository;
use crate::presence::PresenceRepository;

/// Writer tuning knobs.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Minimum interval between Event rows per `(employee, camera)`.
    pub event_min_interval: Duration,
    /// Queue depth beyond which a warning is logged. The queue itself is
    /// unbounded.
    pub queue_high_water: usize,
    /// Zone whose calendar days attendance rows are keyed by.
    pub tz: Tz,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            event_min_interval: Duration::seconds(5),
            queue_high_water: 10_000,
            tz: chrono_tz::Asia::Jakarta,
        }
    }
}

/// Single consumer of write intents.
pub struct IntentWriter {
    db: Db,
    config: WriterConfig,
    /// Schedule state published by the controller, snapshotted onto
    /// NEW_EMPLOYEE alert rows written from this side.
    schedule_rx: watch::Receiver<ScheduleSnapshot>,
    new_employee_tx: broadcast::Sender<NewEmployeeSeen>,
    /// Event dedup per `(employee, camera)`, bounded.
    last_event: TtlCache<(EmployeeId, CameraId), DateTime<Utc>>,
    /// New-employee debounce, at most once per 24h per employee.
    welcomed: TtlCache<EmployeeId, ()>,
}

impl IntentWriter {
    pub fn new(
        db: Db,
        config: WriterConfig,
        schedule_rx: watch::Receiver<ScheduleSnapshot>,
    ) -> Self {
        let (new_employee_tx, _) = broadcast::channel(64);
        Self {
            db,
            config,
            schedule_rx,
            new_employee_tx,
            last_event: TtlCache::new(1000, Duration::hours(1)),
            welcomed: TtlCache::new(1000, Duration::hours(24)),
        }
    }

    /// Subscribe to first-sighting events of newly enrolled employees.
    pub fn subscribe_new_employee(&self) -> broadcast::Receiver<NewEmployeeSeen> {
        self.new_employee_tx.subscribe()
    }

    /// Local calendar day an instant belongs to.
    fn local_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.config.tz).date_naive()
    }

    /// Drain the queue until every sender is dropped.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WriteIntent>) {
        info!("database writer started");
        while let Some(intent) = rx.recv().await {
            let depth = rx.len();
            if depth > self.config.queue_high_water {
                warn!(depth, "intent queue above high-water mark");
            }
            match self.apply(&intent).await {
                Ok(()) => {
                    metrics::counter!("argus_intents_applied_total").increment(1);
                }
                Err(e) => {
                    metrics::counter!("argus_writer_errors_total").increment(1);
                    error!(kind = intent.kind(), error = %e, "intent failed; skipping");
                }
            }
        }
        info!("database writer stopped");
    }

    /// Apply one intent in its own transaction.
    pub async fn apply(&mut self, intent: &WriteIntent) -> DbResult<()> {
        match intent {
            WriteIntent::EmployeeSeen {
                employee_id,
                camera_id,
                ts,
                similarity,
                track_id,
            } => {
                self.apply_seen(*employee_id, *camera_id, *ts, *similarity, *track_id)
                    .await
            }
            WriteIntent::EmployeeTimeout { employee_id, ts } => {
                self.apply_timeout(*employee_id, *ts).await
            }
            WriteIntent::AlertEmit {
                employee_id,
                camera_id,
                ts,
                alert_type,
                message,
                schedule,
            } => {
                let mut tx = self.db.pool().begin().await?;
                AlertRepository::insert(
                    &mut *tx,
                    *employee_id,
                    *camera_id,
                    *ts,
                    *alert_type,
                    Some(message.as_str()),
                    None,
                    schedule,
                )
                .await?;
                tx.commit().await?;
                Ok(())
            }
        }
    }

    async fn apply_seen(
        &mut self,
        employee_id: EmployeeId,
        camera_id: CameraId,
        ts: DateTime<Utc>,
        similarity: f64,
        track_id: Option<i64>,
    ) -> DbResult<()> {
        let mut tx = self.db.pool().begin().await?;

        let employee = match EmployeeRepository::get(&mut *tx, employee_id).await? {
            Some(e) => e,
            None => {
                warn!(employee = employee_id, "seen intent for unknown employee");
                return Ok(());
            }
        };

        let date = self.local_date(ts);
        if !employee.is_active {
            // No event for deactivated employees; their day is pinned ABSENT.
            AttendanceRepository::ensure_absent(&mut *tx, employee_id, date).await?;
            tx.commit().await?;
            return Ok(());
        }

        let is_new = !AttendanceRepository::has_any(&mut *tx, employee_id).await?;

        let dedup_key = (employee_id, camera_id);
        let dup = self
            .last_event
            .get(&dedup_key, ts)
            .map_or(false, |last| ts - *last < self.config.event_min_interval);
        if !dup {
            EventRepository::insert(
                &mut *tx,
                Some(employee_id),
                camera_id,
                ts,
                Some(similarity),
                track_id,
            )
            .await?;
        }

        PresenceRepository::upsert_seen(&mut *tx, employee_id, ts, camera_id).await?;
        AttendanceRepository::apply_seen(&mut *tx, employee_id, date, ts).await?;

        let mut announce = None;
        if is_new && self.welcomed.get(&employee_id, ts).is_none() {
            let schedule = self.schedule_rx.borrow().clone();
            AlertRepository::insert(
                &mut *tx,
                employee_id,
                Some(camera_id),
                ts,
                AlertType::NewEmployee,
                Some(&format!(
                    "(New Employee) {} has entered the area",
                    employee.name
                )),
                None,
                &schedule,
            )
            .await?;
            announce = Some(NewEmployeeSeen {
                employee_id,
                camera_id,
                ts,
            });
        }

        tx.commit().await?;

        // Caches and the broadcast move only after a successful commit so a
        // rolled-back intent can be retried by the next sighting.
        if !dup {
            self.last_event.insert(dedup_key, ts, ts);
        }
        if let Some(seen) = announce {
            self.welcomed.insert(employee_id, (), ts);
            let _ = self.new_employee_tx.send(seen);
        }
        Ok(())
    }

    async fn apply_timeout(&mut self, employee_id: EmployeeId, ts: DateTime<Utc>) -> DbResult<()> {
        let date = self.local_date(ts);
        let mut tx = self.db.pool().begin().await?;
        let changed = PresenceRepository::set_off(&mut *tx, employee_id).await?;
        if changed {
            AttendanceRepository::apply_last_out(&mut *tx, employee_id, date, ts).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
