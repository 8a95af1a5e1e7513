//! # Command Envelope
//!
//! Every mutating command runs inside one [`CommandTx`].
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CommandTx                                       │
//! │                                                                         │
//! │  begin(staff_id)          validate staff id, BEGIN                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  conn() ──► writes        session / cart / KOT / bill rows             │
//! │  record(...)              audit entry queued, not yet written          │
//! │       │                                                                 │
//! │       ├── error / early return ──► drop ──► ROLLBACK (data + audit)    │
//! │       ▼                                                                 │
//! │  commit()                 INSERT queued audit rows, COMMIT             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Write paths never insert into `audit_logs` themselves; the envelope
//! writes the trail in the same transaction as the change it describes.

use std::sync::Arc;

use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tavola_core::validation::validate_staff_id;
use tavola_core::{AuditAction, AuditLogEntry, EntityType};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::ids::IdGenerator;
use crate::repository::audit;

/// An audit record waiting for the envelope to commit.
#[derive(Debug)]
struct PendingAudit {
    entity_type: EntityType,
    entity_id: String,
    action: AuditAction,
    payload: serde_json::Value,
}

/// A transaction bound to the acting staff member, with its audit trail.
pub struct CommandTx {
    tx: Transaction<'static, Sqlite>,
    ids: Arc<dyn IdGenerator>,
    staff_id: String,
    audit: Vec<PendingAudit>,
}

impl std::fmt::Debug for CommandTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTx")
            .field("staff_id", &self.staff_id)
            .field("pending_audit", &self.audit.len())
            .finish_non_exhaustive()
    }
}

impl CommandTx {
    /// Opens a transaction for `staff_id`.
    ///
    /// A blank staff id is rejected before anything touches the database.
    pub async fn begin(
        pool: &SqlitePool,
        ids: Arc<dyn IdGenerator>,
        staff_id: &str,
    ) -> DbResult<Self> {
        validate_staff_id(staff_id)?;

        let tx = pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(CommandTx {
            tx,
            ids,
            staff_id: staff_id.to_string(),
            audit: Vec::new(),
        })
    }

    /// The acting staff member.
    pub fn staff_id(&self) -> &str {
        &self.staff_id
    }

    /// A fresh row id from the injected generator.
    pub fn next_id(&self) -> String {
        self.ids.next_id()
    }

    /// The underlying connection, inside the open transaction.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    /// Queues an audit entry. Written on [`CommandTx::commit`].
    pub fn record(
        &mut self,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        action: AuditAction,
        payload: serde_json::Value,
    ) {
        self.audit.push(PendingAudit {
            entity_type,
            entity_id: entity_id.into(),
            action,
            payload,
        });
    }

    /// Writes the queued audit entries and commits.
    ///
    /// Returns the number of audit rows written.
    pub async fn commit(mut self) -> DbResult<usize> {
        let now = Utc::now();
        let pending = std::mem::take(&mut self.audit);
        let written = pending.len();

        for entry in pending {
            let row = AuditLogEntry {
                id: self.ids.next_id(),
                entity_type: entry.entity_type,
                entity_id: entry.entity_id,
                action: entry.action,
                payload: serde_json::to_string(&entry.payload)?,
                performed_by: self.staff_id.clone(),
                performed_at: now,
            };
            audit::insert_entry(&mut *self.tx, &row).await?;
        }

        self.tx
            .commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(staff_id = %self.staff_id, audit_rows = written, "Command committed");
        Ok(written)
    }
}
