//! Idempotent schema bootstrap.

use sqlx::SqlitePool;

use crate::error::DbResult;

const CREATE_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS employees (
        id INTEGER PRIMARY KEY,
        employee_code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        department TEXT,
        position TEXT,
        phone_number TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        supervisor_id INTEGER REFERENCES employees(id)
    )",
    "CREATE TABLE IF NOT EXISTS face_templates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_id INTEGER NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
        embedding BLOB NOT NULL,
        pose_label TEXT,
        quality_score REAL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS ix_face_templates_employee
        ON face_templates(employee_id)",
    "CREATE TABLE IF NOT EXISTS cameras (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        area TEXT,
        source_url TEXT NOT NULL DEFAULT '',
        enabled INTEGER NOT NULL DEFAULT 1,
        stream_enabled INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_id INTEGER REFERENCES employees(id) ON DELETE CASCADE,
        camera_id INTEGER NOT NULL,
        timestamp TEXT NOT NULL,
        similarity REAL,
        track_id INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS ix_events_emp_ts ON events(employee_id, timestamp)",
    "CREATE INDEX IF NOT EXISTS ix_events_ts ON events(timestamp)",
    "CREATE TABLE IF NOT EXISTS presence (
        employee_id INTEGER PRIMARY KEY REFERENCES employees(id) ON DELETE CASCADE,
        status TEXT NOT NULL DEFAULT 'off',
        last_seen_ts TEXT,
        last_camera_id INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS attendances (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_id INTEGER NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
        date TEXT NOT NULL,
        first_in_ts TEXT,
        last_out_ts TEXT,
        status TEXT NOT NULL DEFAULT 'ABSENT',
        entry_type TEXT NOT NULL DEFAULT 'AUTO',
        UNIQUE(employee_id, date)
    )",
    "CREATE INDEX IF NOT EXISTS ix_attendance_emp_date ON attendances(employee_id, date)",
    "CREATE TABLE IF NOT EXISTS alert_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_id INTEGER NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
        camera_id INTEGER,
        timestamp TEXT NOT NULL,
        alert_type TEXT NOT NULL,
        message TEXT,
        notified_to TEXT,
        notified_external INTEGER NOT NULL DEFAULT 0,
        schedule_work_hours TEXT,
        schedule_lunch_break TEXT,
        schedule_is_manual_pause INTEGER NOT NULL DEFAULT 0,
        schedule_tracking_active INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS ix_alert_logs_ts ON alert_logs(timestamp)",
];

/// Create all tables and indexes if they do not exist.
pub async fn apply(pool: &SqlitePool) -> DbResult<()> {
    for stmt in CREATE_STATEMENTS {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
