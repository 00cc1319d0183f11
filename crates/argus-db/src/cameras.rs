//! Camera repository, kept in sync with `camera_configs/`.

use argus_models::{Camera, CameraId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::DbResult;

/// Provides camera master-data queries and config seeding.
pub struct CameraRepository;

impl CameraRepository {
    /// Insert or update a camera by id.
    pub async fn upsert(conn: &mut SqliteConnection, camera: &Camera) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO cameras (id, name, area, source_url, enabled, stream_enabled) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                name = excluded.name, \
                area = excluded.area, \
                source_url = excluded.source_url, \
                enabled = excluded.enabled, \
                stream_enabled = excluded.stream_enabled",
        )
        .bind(camera.id)
        .bind(&camera.name)
        .bind(&camera.area)
        .bind(&camera.source_url)
        .bind(camera.enabled)
        .bind(camera.stream_enabled)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn get(conn: &mut SqliteConnection, id: CameraId) -> DbResult<Option<Camera>> {
        let row = sqlx::query(
            "SELECT id, name, area, source_url, enabled, stream_enabled \
             FROM cameras WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        row.as_ref().map(row_to_camera).transpose()
    }

    pub async fn list(conn: &mut SqliteConnection) -> DbResult<Vec<Camera>> {
        let rows = sqlx::query(
            "SELECT id, name, area, source_url, enabled, stream_enabled \
             FROM cameras ORDER BY id",
        )
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(row_to_camera).collect()
    }
}

fn row_to_camera(row: &SqliteRow) -> DbResult<Camera> {
    Ok(Camera {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        area: row.try_get("area")?,
        source_url: row.try_get("source_url")?,
        enabled: row.try_get("enabled")?,
        stream_enabled: row.try_get("stream_enabled")?,
    })
}
