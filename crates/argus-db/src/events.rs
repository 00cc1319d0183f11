//! Event repository. Append-only; retention is "today only".

use argus_models::{CameraId, EmployeeId, Event};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::DbResult;

/// Provides recognized-detection event storage.
pub struct EventRepository;

impl EventRepository {
    pub async fn insert(
        conn: &mut SqliteConnection,
        employee_id: Option<EmployeeId>,
        camera_id: CameraId,
        timestamp: DateTime<Utc>,
        similarity: Option<f64>,
        track_id: Option<i64>,
    ) -> DbResult<i64> {
        let result = sqlx::query(
            "INSERT INTO events (employee_id, camera_id, timestamp, similarity, track_id) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(employee_id)
        .bind(camera_id)
        .bind(timestamp)
        .bind(similarity)
        .bind(track_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Latest event for an employee within a window, newest first.
    pub async fn latest_for_employee(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
        since: DateTime<Utc>,
    ) -> DbResult<Option<Event>> {
        let row = sqlx::query(
            "SELECT id, employee_id, camera_id, timestamp, similarity, track_id \
             FROM events WHERE employee_id = ? AND timestamp >= ? \
             ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(employee_id)
        .bind(since)
        .fetch_optional(&mut *conn)
        .await?;
        row.as_ref().map(row_to_event).transpose()
    }

    pub async fn count(conn: &mut SqliteConnection) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM events")
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
        let result = sqlx::query("DELETE FROM events WHERE timestamp < ? OR timestamp >= ?")
            .bind(start)
            .bind(end)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::employees::EmployeeRepository;
    use argus_models::Employee;
    use chrono::{Duration, TimeZone};

    async fn seed(db: &Db) -> EmployeeId {
        let mut conn = db.pool().acquire().await.unwrap();
        EmployeeRepository::insert(
            &mut *conn,
            &Employee {
                id: 0,
                employee_code: "E-1".into(),
                name: "Employee".into(),
                department: None,
                position: None,
                phone_number: None,
                is_active: true,
                supervisor_id: None,
            },
        )
        .await
        .unwrap()
    }

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_purge_keeps_only_window() {
        let db = Db::connect_memory().await.unwrap();
        let emp = seed(&db).await;
        let mut conn = db.pool().acquire().await.unwrap();

        // yesterday, today, tomorrow
        for ts in [t(9) - Duration::days(1), t(9), t(9) + Duration::days(1)] {
            EventRepository::insert(&mut *conn, Some(emp), 1, ts, Some(0.9), None)
                .await
                .unwrap();
        }

        let start = t(0);
        let end = t(0) + Duration::days(1);
        let removed = EventRepository::purge_outside(&mut *conn, start, end)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(EventRepository::count(&mut *conn).await.unwrap(), 1);

        let kept = EventRepository::latest_for_employee(&mut *conn, emp, start)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.timestamp, t(9));
    }

    #[tokio::test]
    async fn test_unknown_face_event_has_no_employee() {
        let db = Db::connect_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        EventRepository::insert(&mut *conn, None, 2, t(10), None, Some(5))
            .await
            .unwrap();
        assert_eq!(EventRepository::count(&mut *conn).await.unwrap(), 1);
    }
}

fn row_to_event(row: &SqliteRow) -> DbResult<Event> {
    Ok(Event {
        id: row.try_get("id")?,
        employee_id: row.try_get("employee_id")?,
        camera_id: row.try_get("camera_id")?,
        timestamp: row.try_get("timestamp")?,
        similarity: row.try_get("similarity")?,
        track_id: row.try_get("track_id")?,
    })
}
