//! Attendance repository.
//!
//! One row per `(employee, date)`. Rows with `entry_type = MANUAL` are
//! pinned by an administrator: no automatic path changes their status,
//! entry type or timestamps.

use argus_models::{Attendance, AttendanceStatus, EmployeeId, EntryType};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::{DbError, DbResult};

/// Outcome of the end-of-day absent sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AbsentSweep {
    pub marked: u64,
    pub skipped_manual: u64,
}

/// Provides daily attendance upserts under the MANUAL guard.
pub struct AttendanceRepository;

impl AttendanceRepository {
    pub async fn get(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
        date: NaiveDate,
    ) -> DbResult<Option<Attendance>> {
        let row = sqlx::query(
            "SELECT id, employee_id, date, first_in_ts, last_out_ts, status, entry_type \
             FROM attendances WHERE employee_id = ? AND date = ?",
        )
        .bind(employee_id)
        .bind(date)
        .fetch_optional(&mut *conn)
        .await?;
        row.as_ref().map(row_to_attendance).transpose()
    }

    pub async fn list_for_date(
        conn: &mut SqliteConnection,
        date: NaiveDate,
    ) -> DbResult<Vec<Attendance>> {
        let rows = sqlx::query(
            "SELECT id, employee_id, date, first_in_ts, last_out_ts, status, entry_type \
             FROM attendances WHERE date = ? ORDER BY employee_id",
        )
        .bind(date)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(row_to_attendance).collect()
    }

    /// Whether the employee has any attendance row at all, ever.
    pub async fn has_any(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
    ) -> DbResult<bool> {
        let row = sqlx::query("SELECT 1 FROM attendances WHERE employee_id = ? LIMIT 1")
            .bind(employee_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    /// Apply a sighting to today's row.
    ///
    /// Creates `(first_in = ts, PRESENT, AUTO)` when missing; otherwise
    /// fills a null `first_in_ts` and refreshes `status = PRESENT,
    /// entry_type = AUTO`. MANUAL rows are left untouched.
    pub async fn apply_seen(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
        date: NaiveDate,
        ts: DateTime<Utc>,
    ) -> DbResult<()> {
        match Self::get(&mut *conn, employee_id, date).await? {
            None => {
                sqlx::query(
                    "INSERT INTO attendances \
                     (employee_id, date, first_in_ts, status, entry_type) \
                     VALUES (?, ?, ?, 'PRESENT', 'AUTO')",
                )
                .bind(employee_id)
                .bind(date)
                .bind(ts)
                .execute(&mut *conn)
                .await?;
            }
            Some(existing) if existing.entry_type != EntryType::Manual => {
                if existing.first_in_ts.is_none() {
                    sqlx::query("UPDATE attendances SET first_in_ts = ? WHERE id = ?")
                        .bind(ts)
                        .bind(existing.id)
                        .execute(&mut *conn)
                        .await?;
                }
                sqlx::query(
                    "UPDATE attendances SET status = 'PRESENT', entry_type = 'AUTO' \
                     WHERE id = ?",
                )
                .bind(existing.id)
                .execute(&mut *conn)
                .await?;
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Record the moment the employee left the area.
    ///
    /// Creates the row when missing. MANUAL rows are left untouched.
    pub async fn apply_last_out(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
        date: NaiveDate,
        ts: DateTime<Utc>,
    ) -> DbResult<()> {
        match Self::get(&mut *conn, employee_id, date).await? {
            None => {
                sqlx::query(
                    "INSERT INTO attendances \
                     (employee_id, date, last_out_ts, status, entry_type) \
                     VALUES (?, ?, ?, 'PRESENT', 'AUTO')",
                )
                .bind(employee_id)
                .bind(date)
                .bind(ts)
                .execute(&mut *conn)
                .await?;
            }
            Some(existing) if existing.entry_type != EntryType::Manual => {
                sqlx::query("UPDATE attendances SET last_out_ts = ? WHERE id = ?")
                    .bind(ts)
                    .bind(existing.id)
                    .execute(&mut *conn)
                    .await?;
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Ensure an `ABSENT` row with null timestamps, used when an inactive
    /// employee is recognized. MANUAL rows are left untouched.
    pub async fn ensure_absent(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
        date: NaiveDate,
    ) -> DbResult<()> {
        match Self::get(&mut *conn, employee_id, date).await? {
            None => {
                sqlx::query(
                    "INSERT INTO attendances (employee_id, date, status, entry_type) \
                     VALUES (?, ?, 'ABSENT', 'AUTO')",
                )
                .bind(employee_id)
                .bind(date)
                .execute(&mut *conn)
                .await?;
            }
            Some(existing) if existing.entry_type != EntryType::Manual => {
                sqlx::query(
                    "UPDATE attendances SET first_in_ts = NULL, last_out_ts = NULL, \
                     status = 'ABSENT' WHERE id = ?",
                )
                .bind(existing.id)
                .execute(&mut *conn)
                .await?;
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Admin override: pin the row as MANUAL with the given status.
    pub async fn set_manual(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> DbResult<Attendance> {
        sqlx::query(
            "INSERT INTO attendances (employee_id, date, status, entry_type) \
             VALUES (?, ?, ?, 'MANUAL') \
             ON CONFLICT(employee_id, date) DO UPDATE SET \
                status = excluded.status, entry_type = 'MANUAL'",
        )
        .bind(employee_id)
        .bind(date)
        .bind(status.as_str())
        .execute(&mut *conn)
        .await?;
        Self::get(conn, employee_id, date)
            .await?
            .ok_or_else(|| DbError::not_found(format!("attendance {employee_id}/{date}")))
    }

    /// Flip a MANUAL row back to AUTO without touching its status.
    pub async fn reset_to_auto(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
        date: NaiveDate,
    ) -> DbResult<Attendance> {
        let existing = Self::get(&mut *conn, employee_id, date)
            .await?
            .ok_or_else(|| DbError::not_found(format!("attendance {employee_id}/{date}")))?;
        sqlx::query("UPDATE attendances SET entry_type = 'AUTO' WHERE id = ?")
            .bind(existing.id)
            .execute(&mut *conn)
            .await?;
        Ok(Attendance {
            entry_type: EntryType::Auto,
            ..existing
        })
    }

    /// End-of-day sweep: every active employee without a row for `date`
    /// gets `(ABSENT, SYSTEM)`; rows that never saw a first-in are demoted
    /// to `(ABSENT, SYSTEM)` unless MANUAL.
    pub async fn mark_absent_missing(
        conn: &mut SqliteConnection,
        date: NaiveDate,
    ) -> DbResult<AbsentSweep> {
        let mut sweep = AbsentSweep::default();

        let inserted = sqlx::query(
            "INSERT INTO attendances (employee_id, date, status, entry_type) \
             SELECT e.id, ?, 'ABSENT', 'SYSTEM' FROM employees e \
             WHERE e.is_active = 1 \
               AND NOT EXISTS (SELECT 1 FROM attendances a \
                               WHERE a.employee_id = e.id AND a.date = ?)",
        )
        .bind(date)
        .bind(date)
        .execute(&mut *conn)
        .await?;
        sweep.marked += inserted.rows_affected();

        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM attendances \
             WHERE date = ? AND status != 'ABSENT' AND first_in_ts IS NULL \
               AND entry_type = 'MANUAL'",
        )
        .bind(date)
        .fetch_one(&mut *conn)
        .await?;
        sweep.skipped_manual = row.try_get::<i64, _>("n")? as u64;

        let demoted = sqlx::query(
            "UPDATE attendances SET status = 'ABSENT', entry_type = 'SYSTEM' \
             WHERE date = ? AND status != 'ABSENT' AND first_in_ts IS NULL \
               AND entry_type != 'MANUAL'",
        )
        .bind(date)
        .execute(&mut *conn)
        .await?;
        sweep.marked += demoted.rows_affected();

        Ok(sweep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::employees::EmployeeRepository;
    use argus_models::Employee;
    use chrono::TimeZone;

    async fn seed(db: &Db, code: &str, active: bool) -> EmployeeId {
        let mut conn = db.pool().acquire().await.unwrap();
        EmployeeRepository::insert(
            &mut *conn,
            &Employee {
                id: 0,
                employee_code: code.into(),
                name: format!("Employee {code}"),
                department: None,
                position: None,
                phone_number: None,
                is_active: active,
                supervisor_id: None,
            },
        )
        .await
        .unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_set_manual_then_reset_keeps_status() {
        let db = Db::connect_memory().await.unwrap();
        let emp = seed(&db, "m1", true).await;
        let mut conn = db.pool().acquire().await.unwrap();

        let att =
            AttendanceRepository::set_manual(&mut *conn, emp, day(), AttendanceStatus::Present)
                .await
                .unwrap();
        assert_eq!(att.entry_type, EntryType::Manual);
        assert_eq!(att.status, AttendanceStatus::Present);

        let att = AttendanceRepository::reset_to_auto(&mut *conn, emp, day())
            .await
            .unwrap();
        assert_eq!(att.entry_type, EntryType::Auto);
        // status untouched by the reset
        assert_eq!(att.status, AttendanceStatus::Present);
    }

    #[tokio::test]
    async fn test_set_manual_overwrites_existing_row() {
        let db = Db::connect_memory().await.unwrap();
        let emp = seed(&db, "m2", true).await;
        let mut conn = db.pool().acquire().await.unwrap();

        AttendanceRepository::apply_seen(&mut *conn, emp, day(), noon())
            .await
            .unwrap();
        let att =
            AttendanceRepository::set_manual(&mut *conn, emp, day(), AttendanceStatus::Absent)
                .await
                .unwrap();
        assert_eq!(att.status, AttendanceStatus::Absent);
        assert_eq!(att.entry_type, EntryType::Manual);
        // timestamps from the automatic path survive the pin
        assert_eq!(att.first_in_ts, Some(noon()));
    }

    #[tokio::test]
    async fn test_reset_missing_row_is_not_found() {
        let db = Db::connect_memory().await.unwrap();
        let emp = seed(&db, "m3", true).await;
        let mut conn = db.pool().acquire().await.unwrap();
        let err = AttendanceRepository::reset_to_auto(&mut *conn, emp, day()).await;
        assert!(matches!(err, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_absent_sweep_fills_missing_and_spares_manual() {
        let db = Db::connect_memory().await.unwrap();
        let missing = seed(&db, "s1", true).await;
        let present = seed(&db, "s2", true).await;
        let pinned = seed(&db, "s3", true).await;
        let inactive = seed(&db, "s4", false).await;
        let mut conn = db.pool().acquire().await.unwrap();

        AttendanceRepository::apply_seen(&mut *conn, present, day(), noon())
            .await
            .unwrap();
        AttendanceRepository::set_manual(&mut *conn, pinned, day(), AttendanceStatus::Present)
            .await
            .unwrap();

        let sweep = AttendanceRepository::mark_absent_missing(&mut *conn, day())
            .await
            .unwrap();
        assert_eq!(sweep.marked, 1);
        assert_eq!(sweep.skipped_manual, 1);

        let att = AttendanceRepository::get(&mut *conn, missing, day())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(att.status, AttendanceStatus::Absent);
        assert_eq!(att.entry_type, EntryType::System);

        // a seen employee keeps PRESENT
        let att = AttendanceRepository::get(&mut *conn, present, day())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(att.status, AttendanceStatus::Present);

        // the MANUAL row is untouched
        let att = AttendanceRepository::get(&mut *conn, pinned, day())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(att.status, AttendanceStatus::Present);
        assert_eq!(att.entry_type, EntryType::Manual);

        // inactive employees are not swept in
        assert!(AttendanceRepository::get(&mut *conn, inactive, day())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let db = Db::connect_memory().await.unwrap();
        seed(&db, "s1", true).await;
        let mut conn = db.pool().acquire().await.unwrap();

        let first = AttendanceRepository::mark_absent_missing(&mut *conn, day())
            .await
            .unwrap();
        assert_eq!(first.marked, 1);
        let second = AttendanceRepository::mark_absent_missing(&mut *conn, day())
            .await
            .unwrap();
        assert_eq!(second.marked, 0);
    }
}

fn row_to_attendance(row: &SqliteRow) -> DbResult<Attendance> {
    let status: String = row.try_get("status")?;
    let entry_type: String = row.try_get("entry_type")?;
    Ok(Attendance {
        id: row.try_get("id")?,
        employee_id: row.try_get("employee_id")?,
        date: row.try_get("date")?,
        first_in_ts: row.try_get("first_in_ts")?,
        last_out_ts: row.try_get("last_out_ts")?,
        status: AttendanceStatus::parse(&status)
            .ok_or_else(|| DbError::decode(format!("bad attendance status {status:?}")))?,
        entry_type: EntryType::parse(&entry_type)
            .ok_or_else(|| DbError::decode(format!("bad entry type {entry_type:?}")))?,
    })
}
