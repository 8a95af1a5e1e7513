//! # Adjustment Repository
//!
//! Post-ticket corrections. A KOT line is never edited; its effective
//! quantity is `qty + Σ qty_change` over the adjustments recorded here.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tavola_core::validation::{validate_adjustment_delta, validate_reason, validate_required};
use tavola_core::{AuditAction, EntityType, KotAdjustment};
use tracing::{debug, info};

use crate::command::CommandTx;
use crate::error::{DbError, DbResult};
use crate::ids::IdGenerator;
use crate::repository::session::require_open_session;

/// Repository for KOT adjustments.
#[derive(Debug, Clone)]
pub struct AdjustmentRepository {
    pool: SqlitePool,
    ids: Arc<dyn IdGenerator>,
}

impl AdjustmentRepository {
    /// Creates a new AdjustmentRepository.
    pub fn new(pool: SqlitePool, ids: Arc<dyn IdGenerator>) -> Self {
        AdjustmentRepository { pool, ids }
    }

    /// Records a signed quantity correction against one KOT line.
    ///
    /// The delta is not bounded by the ticket quantity; a line driven to
    /// zero or below simply drops out of totals. One correction moves at
    /// most `MAX_ITEM_QUANTITY` units either way.
    ///
    /// ## Returns
    /// The adjustment id.
    pub async fn add_adjustment(
        &self,
        session_id: &str,
        kot_id: &str,
        product_id: &str,
        qty_change: i64,
        reason: &str,
        staff_id: &str,
    ) -> DbResult<String> {
        validate_reason(reason)?;
        validate_required("product_id", product_id)?;
        validate_adjustment_delta(qty_change)?;
        debug!(session_id = %session_id, kot_id = %kot_id, product_id = %product_id, qty_change, "Adding adjustment");

        let mut cmd = CommandTx::begin(&self.pool, self.ids.clone(), staff_id).await?;
        require_open_session(cmd.conn(), session_id).await?;

        let owner: Option<String> = sqlx::query_scalar("SELECT session_id FROM kots WHERE id = ?1")
            .bind(kot_id)
            .fetch_optional(cmd.conn())
            .await?;
        if owner.as_deref() != Some(session_id) {
            return Err(DbError::not_found("KOT", kot_id));
        }

        let id = cmd.next_id();
        let created_by = cmd.staff_id().to_string();
        let reason = reason.trim();

        sqlx::query(
            r#"
            INSERT INTO kot_adjustments (
                id, session_id, kot_id, product_id, qty_change, reason, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&id)
        .bind(session_id)
        .bind(kot_id)
        .bind(product_id)
        .bind(qty_change)
        .bind(reason)
        .bind(&created_by)
        .bind(Utc::now())
        .execute(cmd.conn())
        .await?;

        cmd.record(
            EntityType::Adjustment,
            id.as_str(),
            AuditAction::CancelItem,
            json!({
                "sessionId": session_id,
                "kotId": kot_id,
                "productId": product_id,
                "qtyChange": qty_change,
                "reason": reason,
            }),
        );
        cmd.commit().await?;

        info!(adjustment_id = %id, kot_id = %kot_id, qty_change, "Adjustment recorded");
        Ok(id)
    }

    /// Adjustments of a session, oldest first.
    pub async fn list_for_session(&self, session_id: &str) -> DbResult<Vec<KotAdjustment>> {
        let mut conn = self.pool.acquire().await?;
        for_session(&mut conn, session_id).await
    }
}

pub(crate) async fn for_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> DbResult<Vec<KotAdjustment>> {
    let adjustments = sqlx::query_as::<_, KotAdjustment>(
        r#"
        SELECT id, session_id, kot_id, product_id, qty_change, reason, created_by, created_at
        FROM kot_adjustments
        WHERE session_id = ?1
        ORDER BY created_at, rowid
        "#,
    )
    .bind(session_id)
    .fetch_all(conn)
    .await?;

    Ok(adjustments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tavola_core::{CoreError, ErrorKind, MenuItem, Money, OrderType};

    async fn ticketed() -> (Database, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sid = db
            .sessions()
            .create_session("T1", OrderType::DineIn, "staff-1")
            .await
            .unwrap();
        let item = MenuItem::new("P1", "Gulab Jamun", Money::from_cents(10_000));
        for _ in 0..3 {
            db.cart().add_to_cart(&sid, &item).await.unwrap();
        }
        let kot = db.kots().create_kot(&sid, "staff-1", None).await.unwrap().unwrap();
        (db, sid, kot)
    }

    #[tokio::test]
    async fn test_adjustment_recorded_and_audited() {
        let (db, sid, kot) = ticketed().await;

        let id = db
            .adjustments()
            .add_adjustment(&sid, &kot, "P1", -1, "dropped on floor", "staff-2")
            .await
            .unwrap();

        let list = db.adjustments().list_for_session(&sid).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].qty_change, -1);
        assert_eq!(list[0].created_by, "staff-2");

        let history = db.audit().for_entity(EntityType::Adjustment, &id).await.unwrap();
        assert_eq!(history[0].action, AuditAction::CancelItem);

        // The ticket line itself is untouched
        let items = db.kots().get_kot_items(&kot).await.unwrap();
        assert_eq!(items[0].qty, 3);
    }

    #[tokio::test]
    async fn test_reason_required() {
        let (db, sid, kot) = ticketed().await;
        let err = db
            .adjustments()
            .add_adjustment(&sid, &kot, "P1", -1, "  ", "staff-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Validation));
        assert!(db.adjustments().list_for_session(&sid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_over_cancel_is_accepted() {
        let (db, sid, kot) = ticketed().await;
        db.adjustments()
            .add_adjustment(&sid, &kot, "P1", -5, "whole order returned", "staff-1")
            .await
            .unwrap();
        assert_eq!(db.adjustments().list_for_session(&sid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_runaway_delta_rejected() {
        let (db, sid, kot) = ticketed().await;

        for delta in [i64::MAX, i64::MIN, 1_000] {
            let err = db
                .adjustments()
                .add_adjustment(&sid, &kot, "P1", delta, "typo", "staff-1")
                .await
                .unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::Validation));
        }

        assert!(db.adjustments().list_for_session(&sid).await.unwrap().is_empty());
        assert_eq!(db.billing().session_total(&sid).await.unwrap().cents(), 30_000);
    }

    #[tokio::test]
    async fn test_kot_must_belong_to_session() {
        let (db, _sid, kot) = ticketed().await;
        let other = db
            .sessions()
            .create_session("T2", OrderType::DineIn, "staff-1")
            .await
            .unwrap();

        let err = db
            .adjustments()
            .add_adjustment(&other, &kot, "P1", -1, "wrong table", "staff-1")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let err = db
            .adjustments()
            .add_adjustment("ghost", &kot, "P1", -1, "wrong table", "staff-1")
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::SessionNotFound(_))));
    }
}
