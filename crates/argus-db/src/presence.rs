//! Presence repository, one row per employee.

use argus_models::{CameraId, EmployeeId, Presence, PresenceStatus};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::{DbError, DbResult};

/// Provides live-presence persistence.
pub struct PresenceRepository;

impl PresenceRepository {
    pub async fn get(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
    ) -> DbResult<Option<Presence>> {
        let row = sqlx::query(
            "SELECT employee_id, status, last_seen_ts, last_camera_id \
             FROM presence WHERE employee_id = ?",
        )
        .bind(employee_id)
        .fetch_optional(&mut *conn)
        .await?;
        row.as_ref().map(row_to_presence).transpose()
    }

    pub async fn list(conn: &mut SqliteConnection) -> DbResult<Vec<Presence>> {
        let rows = sqlx::query(
            "SELECT employee_id, status, last_seen_ts, last_camera_id \
             FROM presence ORDER BY employee_id",
        )
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(row_to_presence).collect()
    }

    /// Mark the employee available with a fresh sighting.
    pub async fn upsert_seen(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
        ts: DateTime<Utc>,
        camera_id: CameraId,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO presence (employee_id, status, last_seen_ts, last_camera_id) \
             VALUES (?, 'available', ?, ?) \
             ON CONFLICT(employee_id) DO UPDATE SET \
                status = 'available', \
                last_seen_ts = excluded.last_seen_ts, \
                last_camera_id = excluded.last_camera_id",
        )
        .bind(employee_id)
        .bind(ts)
        .bind(camera_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Flip to `off`. Returns whether a row actually changed status.
    pub async fn set_off(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE presence SET status = 'off' WHERE employee_id = ? AND status != 'off'",
        )
        .bind(employee_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_presence(row: &SqliteRow) -> DbResult<Presence> {
    let status: String = row.try_get("status")?;
    Ok(Presence {
        employee_id: row.try_get("employee_id")?,
        status: PresenceStatus::parse(&status)
            .ok_or_else(|| DbError::decode(format!("bad presence status {status:?}")))?,
        last_seen_ts: row.try_get("last_seen_ts")?,
        last_camera_id: row.try_get("last_camera_id")?,
    })
}
