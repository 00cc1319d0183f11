//! Alert log repository. Append-only; retention is "today only".

use argus_models::{AlertLog, AlertType, CameraId, EmployeeId, ScheduleSnapshot};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::{DbError, DbResult};

/// Provides alert-log persistence.
pub struct AlertRepository;

impl AlertRepository {
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
        camera_id: Option<CameraId>,
        timestamp: DateTime<Utc>,
        alert_type: AlertType,
        message: Option<&str>,
        notified_to: Option<&str>,
        schedule: &ScheduleSnapshot,
    ) -> DbResult<i64> {
        let result = sqlx::query(
            "INSERT INTO alert_logs \
             (employee_id, camera_id, timestamp, alert_type, message, notified_to, \
              notified_external, schedule_work_hours, schedule_lunch_break, \
              schedule_is_manual_pause, schedule_tracking_active) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)",
        )
        .bind(employee_id)
        .bind(camera_id)
        .bind(timestamp)
        .bind(alert_type.as_str())
        .bind(message)
        .bind(notified_to)
        .bind(&schedule.work_hours)
        .bind(&schedule.lunch_break)
        .bind(schedule.is_manual_pause)
        .bind(schedule.tracking_active)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn list_since(
        conn: &mut SqliteConnection,
        since: DateTime<Utc>,
    ) -> DbResult<Vec<AlertLog>> {
        let rows = sqlx::query(
            "SELECT id, employee_id, camera_id, timestamp, alert_type, message, \
             notified_to, notified_external, schedule_work_hours, schedule_lunch_break, \
             schedule_is_manual_pause, schedule_tracking_active \
             FROM alert_logs WHERE timestamp >= ? ORDER BY timestamp",
        )
        .bind(since)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(row_to_alert).collect()
    }

    pub async fn count(conn: &mut SqliteConnection) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM alert_logs")
            .fetch_one(&mut *conn)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Delete rows outside `[start, end)`, the local-day window.
    pub async fn purge_outside(
        conn: &mut SqliteConnection,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<u64> {
        let result =
            sqlx::query("DELETE FROM alert_logs WHERE timestamp < ? OR timestamp >= ?")
                .bind(start)
                .bind(end)
                .execute(&mut *conn)
                .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_alert(row: &SqliteRow) -> DbResult<AlertLog> {
    let alert_type: String = row.try_get("alert_type")?;
    Ok(AlertLog {
        id: row.try_get("id")?,
        employee_id: row.try_get("employee_id")?,
        camera_id: row.try_get("camera_id")?,
        timestamp: row.try_get("timestamp")?,
        alert_type: AlertType::parse(&alert_type)
            .ok_or_else(|| DbError::decode(format!("bad alert type {alert_type:?}")))?,
        message: row.try_get("message")?,
        notified_to: row.try_get("notified_to")?,
        notified_external: row.try_get("notified_external")?,
        schedule: ScheduleSnapshot {
            work_hours: row
                .try_get::<Option<String>, _>("schedule_work_hours")?
                .unwrap_or_default(),
            lunch_break: row
                .try_get::<Option<String>, _>("schedule_lunch_break")?
                .unwrap_or_default(),
            is_manual_pause: row.try_get("schedule_is_manual_pause")?,
            tracking_active: row.try_get("schedule_tracking_active")?,
        },
    })
}
