//! # Audit Repository
//!
//! Read side of the append-only audit trail. Rows are written only by
//! [`crate::command::CommandTx::commit`].

use sqlx::{SqliteConnection, SqlitePool};
use tavola_core::{AuditLogEntry, EntityType};

use crate::error::DbResult;

const SELECT_AUDIT: &str = r#"
    SELECT id, entity_type, entity_id, action, payload, performed_by, performed_at
    FROM audit_logs
"#;

/// Repository for audit log reads.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    /// Creates a new AuditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// History of one entity, oldest first.
    pub async fn for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> DbResult<Vec<AuditLogEntry>> {
        let sql = format!(
            "{SELECT_AUDIT} WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY performed_at, rowid"
        );
        let entries = sqlx::query_as::<_, AuditLogEntry>(&sql)
            .bind(entity_type)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Most recent entries, newest first.
    pub async fn recent(&self, limit: u32) -> DbResult<Vec<AuditLogEntry>> {
        let sql = format!("{SELECT_AUDIT} ORDER BY performed_at DESC, rowid DESC LIMIT ?1");
        let entries = sqlx::query_as::<_, AuditLogEntry>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }
}

/// Inserts one audit row inside the caller's transaction.
pub(crate) async fn insert_entry(conn: &mut SqliteConnection, entry: &AuditLogEntry) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (
            id, entity_type, entity_id, action, payload, performed_by, performed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&entry.id)
    .bind(entry.entity_type)
    .bind(&entry.entity_id)
    .bind(entry.action)
    .bind(&entry.payload)
    .bind(&entry.performed_by)
    .bind(entry.performed_at)
    .execute(conn)
    .await?;

    Ok(())
}
