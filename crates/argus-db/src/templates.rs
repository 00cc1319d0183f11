//! Face template repository.
//!
//! Embeddings are stored as little-endian f32 bytes, matching the opaque
//! fixed-length vector the engine produces. Rows are immutable after
//! insert.

use argus_models::{EmployeeId, FaceTemplate};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::{DbError, DbResult};

/// Provides face-template storage for identification.
pub struct FaceTemplateRepository;

impl FaceTemplateRepository {
    pub async fn insert(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
        embedding: &[f32],
        pose_label: Option<&str>,
        quality_score: Option<f64>,
        created_at: DateTime<Utc>,
    ) -> DbResult<i64> {
        let result = sqlx::query(
            "INSERT INTO face_templates \
             (employee_id, embedding, pose_label, quality_score, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(employee_id)
        .bind(encode_embedding(embedding))
        .bind(pose_label)
        .bind(quality_score)
        .bind(created_at)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// All templates, for the embedding-store refresher.
    pub async fn load_all(conn: &mut SqliteConnection) -> DbResult<Vec<FaceTemplate>> {
        let rows = sqlx::query(
            "SELECT id, employee_id, embedding, pose_label, quality_score, created_at \
             FROM face_templates ORDER BY employee_id, id",
        )
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(row_to_template).collect()
    }

    pub async fn delete_for_employee(
        conn: &mut SqliteConnection,
        employee_id: EmployeeId,
    ) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM face_templates WHERE employee_id = ?")
            .bind(employee_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_template(row: &SqliteRow) -> DbResult<FaceTemplate> {
    let blob: Vec<u8> = row.try_get("embedding")?;
    Ok(FaceTemplate {
        id: row.try_get("id")?,
        employee_id: row.try_get("employee_id")?,
        embedding: decode_embedding(&blob)?,
        pose_label: row.try_get("pose_label")?,
        quality_score: row.try_get("quality_score")?,
        created_at: row.try_get("created_at")?,
    })
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn decode_embedding(bytes: &[u8]) -> DbResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(DbError::decode(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_codec() {
        let original = vec![0.25f32, -1.5, 3.75];
        let decoded = decode_embedding(&encode_embedding(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_rejects_truncated_blob() {
        assert!(decode_embedding(&[0u8; 6]).is_err());
    }
}
