//! Daily retention daemons.
//!
//! - Midnight: purge Event and AlertLog rows outside the local day and
//!   delete attendance-capture folders past the retention window.
//! - End of day: mark active employees without an attendance row as
//!   ABSENT with a SYSTEM entry, sparing MANUAL rows.

use std::path::PathBuf;

use argus_db::{AlertRepository, AttendanceRepository, Db, EventRepository};
use argus_models::RuntimeParams;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::MonitorResult;
use crate::evidence::cleanup_old_captures;
use crate::time::LocalClock;

/// The absent sweep anchors to this local time, shifted earlier by the
/// configured offset.
const ABSENT_MARK_TIME: (u32, u32) = (17, 30);

/// Purge events/alerts outside today and old capture folders once.
pub async fn run_daily_purge(
    db: &Db,
    clock: LocalClock,
    captures_root: &PathBuf,
    retention_days: u32,
    now: DateTime<Utc>,
) -> MonitorResult<(u64, u64)> {
    let today = clock.local_date(now);
    let (start, end) = clock.day_bounds(today);

    let mut conn = db.pool().acquire().await?;
    let events = EventRepository::purge_outside(&mut *conn, start, end).await?;
    let alerts = AlertRepository::purge_outside(&mut *conn, start, end).await?;
    drop(conn);
    if events + alerts > 0 {
        info!(events, alerts, "purged rows outside today");
    }

    let cutoff = today - Duration::days(i64::from(retention_days.clamp(1, 3650)));
    cleanup_old_captures(captures_root, cutoff);
    Ok((events, alerts))
}

/// Mark absentees for the local day once. Returns `(marked, skipped)`.
pub async fn run_absent_sweep(
    db: &Db,
    clock: LocalClock,
    now: DateTime<Utc>,
) -> MonitorResult<(u64, u64)> {
    let today = clock.local_date(now);
    let mut conn = db.pool().acquire().await?;
    let sweep = AttendanceRepository::mark_absent_missing(&mut *conn, today).await?;
    if sweep.marked > 0 {
        info!(marked = sweep.marked, date = %today, "marked employees absent");
    }
    if sweep.skipped_manual > 0 {
        info!(skipped = sweep.skipped_manual, "absent sweep spared manual entries");
    }
    Ok((sweep.marked, sweep.skipped_manual))
}

/// Midnight daemon: runs a purge immediately, then at every local midnight.
pub async fn run_midnight_daemon(
    db: Db,
    clock: LocalClock,
    captures_root: PathBuf,
    retention_days: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("midnight retention daemon started");
    loop {
        if let Err(e) =
            run_daily_purge(&db, clock, &captures_root, retention_days, clock.now_utc()).await
        {
            warn!(error = %e, "daily purge failed");
        }
        let wait = clock.until_next_midnight(clock.now_utc());
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("midnight retention daemon stopped");
}

/// Absent-marker daemon: wakes at the configured local time every day.
pub async fn run_absent_daemon(
    db: Db,
    clock: LocalClock,
    params: RuntimeParams,
    mut shutdown: watch::Receiver<bool>,
) {
    if !params.mark_absent_enabled {
        info!("absent marking disabled");
        return;
    }
    let target = absent_mark_time(&params);
    info!(time = %target, "absent marker daemon started");
    loop {
        let wait = clock.until_next_time(clock.now_utc(), target);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                if let Err(e) = run_absent_sweep(&db, clock, clock.now_utc()).await {
                    warn!(error = %e, "absent sweep failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("absent marker daemon stopped");
}

fn absent_mark_time(params: &RuntimeParams) -> NaiveTime {
    let (h, m) = ABSENT_MARK_TIME;
    let base = NaiveTime::from_hms_opt(h, m, 0).expect("valid anchor time");
    let offset = params.mark_absent_offset_minutes_before_end.clamp(0, 12 * 60);
    base - Duration::minutes(offset)
}
